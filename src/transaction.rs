//! Transaction items and the transaction reader.

use std::path::Path;

use stf_records::{
    ClockId,
    ProtocolData,
    ProtocolId,
    Record,
    TransactionDependencyRecord,
};

use crate::{
    buffered::{
        BufferedItemReader,
        ItemBuilder,
        ItemCursor,
        TraceItem,
    },
    error::{
        Result,
        StfError,
    },
    reader::{
        ReaderOptions,
        RecordReader,
        TraceHeader,
    },
};

/// One protocol transaction plus the dependencies declared right after it.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
    index: u64,
    transaction_id: u64,
    cycle_delta: u64,
    clock_id: ClockId,
    metadata: u64,
    protocol_data: ProtocolData,
    payload: Vec<u8>,
    dependencies: Vec<TransactionDependencyRecord>,
}

impl Transaction {
    fn reset(&mut self) {
        self.index = 0;
        self.transaction_id = 0;
        self.cycle_delta = 0;
        self.clock_id = 0;
        self.metadata = 0;
        self.protocol_data = ProtocolData::default();
        self.payload.clear();
        self.dependencies.clear();
    }

    /// 1-based transaction index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Unique transaction ID.
    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    /// Cycles since the previous transaction on this clock.
    pub fn cycle_delta(&self) -> u64 {
        self.cycle_delta
    }

    /// Clock domain of the transaction.
    pub fn clock_id(&self) -> ClockId {
        self.clock_id
    }

    /// Generator-defined metadata.
    pub fn metadata(&self) -> u64 {
        self.metadata
    }

    /// Protocol of the payload.
    pub fn protocol_id(&self) -> ProtocolId {
        self.protocol_data.protocol_id()
    }

    /// Typed view of the protocol payload.
    pub fn protocol_data(&self) -> &ProtocolData {
        &self.protocol_data
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Dependencies declared immediately after the transaction, in order.
    pub fn dependencies(&self) -> &[TransactionDependencyRecord] {
        &self.dependencies
    }
}

impl TraceItem for Transaction {
    fn index(&self) -> u64 {
        self.index
    }

    fn set_index(&mut self, index: u64) {
        self.index = index;
    }
}

/// Assembles [`Transaction`] items: a transaction record plus any
/// dependency records immediately following it.
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    pending: Option<stf_records::TransactionRecord>,
    raw_num_read: u64,
}

impl ItemBuilder for TransactionBuilder {
    type Item = Transaction;

    fn read_next(&mut self, reader: &mut RecordReader, item: &mut Transaction) -> Result<bool> {
        item.reset();

        let opener = match self.pending.take() {
            Some(record) => record,
            None => loop {
                let Some(record) = reader.next_record()? else {
                    return Ok(false);
                };
                match &*record {
                    Record::Transaction(rec) => break rec.clone(),
                    // Comments are legal anywhere.
                    Record::Comment(_) => {}
                    _ => return Err(StfError::UnexpectedRecord(record.descriptor())),
                }
            },
        };

        item.transaction_id = opener.transaction_id;
        item.cycle_delta = opener.cycle_delta;
        item.clock_id = opener.clock_id;
        item.metadata = opener.metadata;
        item.protocol_data = opener.protocol_data;
        item.payload = opener.payload;

        loop {
            let Some(record) = reader.next_record()? else {
                break;
            };
            match &*record {
                Record::Transaction(rec) => {
                    self.pending = Some(rec.clone());
                    break;
                }
                Record::TransactionDependency(rec) => item.dependencies.push(*rec),
                Record::Comment(_) => {}
                _ => return Err(StfError::UnexpectedRecord(record.descriptor())),
            }
        }

        self.raw_num_read += 1;
        Ok(true)
    }

    fn raw_num_read(&self) -> u64 {
        self.raw_num_read
    }

    fn reset_after_seek(&mut self, raw: u64) {
        self.pending = None;
        self.raw_num_read = raw;
    }
}

/// Buffered reader over [`Transaction`] items.
pub struct TransactionReader {
    inner: BufferedItemReader<TransactionBuilder>,
    cursor: Option<ItemCursor>,
}

impl TransactionReader {
    /// Opens a transaction trace. When `expected_protocol` is set in the
    /// options, the trace's declared protocol must match.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let reader = RecordReader::open(path, options)?;
        Ok(Self {
            inner: BufferedItemReader::new(
                reader,
                TransactionBuilder::default(),
                options.buffer_size,
            ),
            cursor: None,
        })
    }

    /// Header state of the trace.
    pub fn header(&self) -> &TraceHeader {
        self.inner.record_reader().header()
    }

    /// A cursor at the oldest buffered transaction.
    pub fn begin(&mut self) -> Result<ItemCursor> {
        self.inner.begin()
    }

    /// Advances a cursor. Returns false at end of trace.
    pub fn advance(&mut self, cursor: &mut ItemCursor) -> Result<bool> {
        self.inner.advance(cursor)
    }

    /// The transaction under a cursor.
    pub fn item(&self, cursor: &ItemCursor) -> Result<Option<&Transaction>> {
        self.inner.item(cursor)
    }

    /// Seeks a cursor forward by `n` transactions.
    pub fn seek(&mut self, cursor: &mut ItemCursor, n: u64) -> Result<()> {
        self.inner.seek(cursor, n)
    }

    /// A cursor at the `n`-th transaction (1-based).
    pub fn seek_from_beginning(&mut self, n: u64) -> Result<ItemCursor> {
        self.inner.seek_from_beginning(n)
    }

    /// Streams the next transaction, driving an internal cursor.
    pub fn next_transaction(&mut self) -> Result<Option<&Transaction>> {
        match self.cursor {
            None => {
                self.cursor = Some(self.inner.begin()?);
            }
            Some(mut cursor) => {
                let advanced = self.inner.advance(&mut cursor)?;
                self.cursor = Some(cursor);
                if !advanced {
                    return Ok(None);
                }
            }
        }
        let cursor = self.cursor.expect("cursor just set");
        self.inner.item(&cursor)
    }

    /// Number of transactions visited.
    pub fn num_transactions_read(&self) -> u64 {
        self.inner.num_items_read()
    }

    /// Number of transaction records consumed by the underlying reader.
    pub fn num_marker_records(&self) -> u64 {
        self.inner.num_marker_records()
    }
}

impl std::fmt::Debug for TransactionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionReader")
            .field("inner", &self.inner)
            .finish()
    }
}
