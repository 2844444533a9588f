//! Pool of constructed records for reuse.
//!
//! Reading a trace produces millions of short-lived records, most of which
//! carry heap allocations (operand vectors, content blobs). Instead of
//! freeing them, the owning handle returns each record to a per-descriptor
//! cache on drop; the factory then re-unpacks a recycled record in place,
//! reusing its buffers. Each reader owns its pool, so the lock is
//! uncontended; it only exists so handles stay sendable.

use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc,
        Mutex,
    },
};

use stf_records::{
    Descriptor,
    Record,
};

/// Bound on the number of constructed records retained per descriptor.
const MAX_CACHED_PER_DESCRIPTOR: usize = 3072;

#[derive(Default)]
struct PoolInner {
    caches: [Vec<Record>; Descriptor::COUNT],
    // Counters for the pool leak invariant; cheap enough to keep always.
    taken: u64,
    recycled: u64,
    freed: u64,
}

/// Pool of record instances for reuse. Cloning shares the pool.
#[derive(Default, Clone)]
pub struct RecordPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl RecordPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops a constructed record of the given kind, if one is cached.
    pub fn take(&self, desc: Descriptor) -> Option<Record> {
        let mut inner = self.inner.lock().expect("record pool poisoned");
        let record = inner.caches[desc.index()].pop();
        if record.is_some() {
            inner.taken += 1;
        }
        record
    }

    /// Wraps a record in a handle that recycles it on drop.
    pub fn wrap(&self, record: Record) -> PooledRecord {
        PooledRecord {
            pool: self.clone(),
            record: Some(record),
        }
    }

    fn recycle(&self, record: Record) {
        let mut inner = self.inner.lock().expect("record pool poisoned");
        let cache = &mut inner.caches[record.descriptor().index()];
        if cache.len() < MAX_CACHED_PER_DESCRIPTOR {
            cache.push(record);
            inner.recycled += 1;
        } else {
            inner.freed += 1;
        }
    }

    /// Number of records currently cached across all descriptors.
    pub fn cached(&self) -> usize {
        self.inner
            .lock()
            .expect("record pool poisoned")
            .caches
            .iter()
            .map(|cache| cache.len())
            .sum()
    }

    /// `(taken, recycled, freed)` counters since the pool was created.
    pub fn stats(&self) -> (u64, u64, u64) {
        let inner = self.inner.lock().expect("record pool poisoned");
        (inner.taken, inner.recycled, inner.freed)
    }
}

impl fmt::Debug for RecordPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordPool {{ cached: {} }}", self.cached())
    }
}

/// A record owned by a reader. Returns the record to its pool when
/// dropped.
pub struct PooledRecord {
    pool: RecordPool,
    record: Option<Record>,
}

impl PooledRecord {
    /// Takes the record out of the handle, skipping the recycle path.
    pub fn into_record(mut self) -> Record {
        self.record.take().expect("record recycled already")
    }

    /// Mutable access for the reader's post-construction fixups (PC
    /// assignment on opcode records).
    pub(crate) fn record_mut(&mut self) -> &mut Record {
        self.record.as_mut().expect("record recycled already")
    }
}

impl Deref for PooledRecord {
    type Target = Record;

    fn deref(&self) -> &Record {
        self.record.as_ref().expect("record recycled already")
    }
}

impl AsRef<Record> for PooledRecord {
    fn as_ref(&self) -> &Record {
        self
    }
}

impl Drop for PooledRecord {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.pool.recycle(record);
        }
    }
}

impl fmt::Debug for PooledRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledRecord")
            .field("record", &self.record)
            .finish()
    }
}

impl fmt::Display for PooledRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record {
            Some(record) => fmt::Display::fmt(record, f),
            None => write!(f, "<recycled>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stf_records::CommentRecord;

    #[test]
    fn drop_returns_to_cache() {
        let pool = RecordPool::new();
        assert_eq!(pool.cached(), 0);

        let handle = pool.wrap(Record::Comment(CommentRecord::new("hello")));
        drop(handle);
        assert_eq!(pool.cached(), 1);

        // The cached record comes back with its allocation intact.
        let recycled = pool.take(Descriptor::Comment).unwrap();
        match recycled {
            Record::Comment(rec) => assert_eq!(rec.comment, "hello"),
            other => panic!("wrong record kind: {other:?}"),
        }
        assert_eq!(pool.cached(), 0);
    }

    #[test]
    fn caches_are_per_descriptor() {
        let pool = RecordPool::new();
        drop(pool.wrap(Record::Comment(CommentRecord::new("a"))));
        assert!(pool.take(Descriptor::Event).is_none());
        assert!(pool.take(Descriptor::Comment).is_some());
    }

    #[test]
    fn into_record_bypasses_recycling() {
        let pool = RecordPool::new();
        let handle = pool.wrap(Record::Comment(CommentRecord::new("kept")));
        let record = handle.into_record();
        assert_eq!(pool.cached(), 0);
        drop(record);
        assert_eq!(pool.cached(), 0);
    }
}
