//! Generic sliding-window reader over assembled items.
//!
//! Items are buffered in a power-of-two circular window. Cursors are
//! cheap copies; advancing the cursor that reaches the second-to-last
//! buffered item refills the back half of the window, so a consumer can
//! always rewind by up to half the window without losing data, and never
//! waits when dereferencing the last buffered item.

use crate::{
    error::{
        Result,
        StfError,
    },
    reader::RecordReader,
};

/// An aggregate assembled from records and handed to consumers.
pub trait TraceItem: Clone + Default {
    /// 1-based item index. Skipped items repeat the index of the last
    /// unskipped item, keeping the unskipped sequence dense.
    fn index(&self) -> u64;

    /// Sets the item index. Called by the window, not by consumers.
    fn set_index(&mut self, index: u64);

    /// Whether the reader marked this item as skipped.
    fn skipped(&self) -> bool {
        false
    }
}

/// Assembles one kind of item from the record stream.
pub trait ItemBuilder {
    /// The item this builder produces.
    type Item: TraceItem;

    /// Builds the next item in place. Returns `false` at end of trace.
    fn read_next(&mut self, reader: &mut RecordReader, item: &mut Self::Item)
        -> Result<bool>;

    /// Number of items built so far, counting skipped ones.
    fn raw_num_read(&self) -> u64;

    /// Resets the builder's position after a fast seek: `raw` items are
    /// considered consumed and any stashed record state is discarded.
    fn reset_after_seek(&mut self, raw: u64);

    /// Whether seeks must go the slow way (item by item). Builders whose
    /// items are not 1:1 with marker records, or that are currently
    /// skipping, return true.
    fn slow_seek(&self) -> bool {
        false
    }
}

/// Position of one item inside a [`BufferedItemReader`] window.
///
/// Copyable; keeping an old cursor around rewinds the iteration as long
/// as the item is still inside the window.
#[derive(Debug, Clone, Copy)]
pub struct ItemCursor {
    /// Ordinal of the item this cursor points at (1-based, counting
    /// skipped items).
    seq: u64,
    /// Slot in the circular buffer.
    loc: usize,
    /// Whether this cursor has run off the end of the trace.
    end: bool,
}

impl ItemCursor {
    /// Whether the cursor has reached the end of the trace.
    pub fn is_end(&self) -> bool {
        self.end
    }
}

impl PartialEq for ItemCursor {
    fn eq(&self, other: &Self) -> bool {
        (self.end && other.end) || (!self.end && !other.end && self.seq == other.seq)
    }
}

impl Eq for ItemCursor {}

/// Sliding-window reader driving an [`ItemBuilder`].
pub struct BufferedItemReader<B: ItemBuilder> {
    reader: RecordReader,
    builder: B,
    buf: Vec<B::Item>,
    mask: usize,
    head: usize,
    tail: usize,
    /// Number of valid items in the window.
    buffered: usize,
    /// Ordinal of the item at `tail`.
    tail_seq: u64,
    last_item_read: bool,
    initialized: bool,
    num_items_read: u64,
    num_skipped: u64,
}

impl<B: ItemBuilder> BufferedItemReader<B> {
    /// Wraps a record reader with a window of `buffer_size` items
    /// (rounded up to a power of two, minimum 4).
    pub fn new(reader: RecordReader, builder: B, buffer_size: usize) -> Self {
        let size = buffer_size.max(4).next_power_of_two();
        Self {
            reader,
            builder,
            buf: vec![B::Item::default(); size],
            mask: size - 1,
            head: 0,
            tail: 0,
            buffered: 0,
            tail_seq: 0,
            last_item_read: false,
            initialized: false,
            num_items_read: 0,
            num_skipped: 0,
        }
    }

    /// The underlying record reader.
    pub fn record_reader(&self) -> &RecordReader {
        &self.reader
    }

    /// The item builder.
    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Number of items visited through cursors, counting skipped items.
    pub fn num_items_read(&self) -> u64 {
        self.num_items_read
    }

    /// Number of marker records consumed by the underlying reader.
    pub fn num_marker_records(&self) -> u64 {
        self.reader.num_markers()
    }

    /// Reads one item into the slot at `pos`. Returns false at EOF.
    fn read_into(&mut self, pos: usize) -> Result<bool> {
        if !self.builder.read_next(&mut self.reader, &mut self.buf[pos])? {
            self.last_item_read = true;
            return Ok(false);
        }
        let item = &mut self.buf[pos];
        if item.skipped() {
            self.num_skipped += 1;
        }
        item.set_index(self.builder.raw_num_read() - self.num_skipped);
        Ok(true)
    }

    fn init_buffer(&mut self) -> Result<()> {
        self.initialized = true;
        let mut count = 0;
        while count < self.buf.len() {
            if !self.read_into(count)? {
                break;
            }
            count += 1;
        }
        self.head = 0;
        self.tail = count.saturating_sub(1);
        self.buffered = count;
        self.tail_seq = self.builder.raw_num_read();
        Ok(())
    }

    /// Refills the back half of the window past `tail`.
    fn fill_half(&mut self) -> Result<()> {
        let half = self.buf.len() / 2;
        let mut added = 0;
        let mut pos = self.tail;
        while added < half {
            pos = (pos + 1) & self.mask;
            if !self.read_into(pos)? {
                break;
            }
            added += 1;
        }
        if added > 0 {
            self.tail = (self.tail + added) & self.mask;
            self.head = (self.head + added) & self.mask;
            self.tail_seq += added as u64;
        }
        Ok(())
    }

    fn validate(&self, cursor: &ItemCursor) -> Result<()> {
        let oldest = self.tail_seq + 1 - self.buffered as u64;
        if cursor.seq < oldest || cursor.seq > self.tail_seq {
            return Err(StfError::StaleCursor);
        }
        Ok(())
    }

    /// A cursor at the oldest buffered item; on first use this fills the
    /// window from the start of the trace.
    pub fn begin(&mut self) -> Result<ItemCursor> {
        if !self.initialized {
            self.init_buffer()?;
        }
        if self.buffered == 0 {
            return Ok(ItemCursor {
                seq: 0,
                loc: 0,
                end: true,
            });
        }
        let cursor = ItemCursor {
            seq: self.tail_seq + 1 - self.buffered as u64,
            loc: self.head,
            end: false,
        };
        self.num_items_read = self.num_items_read.max(cursor.seq);
        Ok(cursor)
    }

    /// An end cursor.
    pub fn end(&self) -> ItemCursor {
        ItemCursor {
            seq: 0,
            loc: 0,
            end: true,
        }
    }

    /// Advances the cursor by one item. Returns false (and marks the
    /// cursor as end) when the trace is exhausted.
    pub fn advance(&mut self, cursor: &mut ItemCursor) -> Result<bool> {
        if cursor.end {
            return Ok(false);
        }
        self.validate(cursor)?;

        // Refill when dereferencing the second-to-last buffered item so
        // the consumer never stalls on the last one.
        if !self.last_item_read && cursor.loc == (self.tail + self.mask) & self.mask {
            self.fill_half()?;
        }
        if cursor.loc == self.tail {
            cursor.end = true;
            return Ok(false);
        }

        cursor.seq += 1;
        cursor.loc = (cursor.loc + 1) & self.mask;
        self.num_items_read = self.num_items_read.max(cursor.seq);
        Ok(true)
    }

    /// The item under the cursor, or `None` for an end cursor. Fails if
    /// the cursor has fallen out of the window.
    pub fn item(&self, cursor: &ItemCursor) -> Result<Option<&B::Item>> {
        if cursor.end {
            return Ok(None);
        }
        self.validate(cursor)?;
        Ok(Some(&self.buf[cursor.loc]))
    }

    /// Whether the cursor still points at a buffered item.
    pub fn is_valid(&self, cursor: &ItemCursor) -> bool {
        !cursor.end && self.validate(cursor).is_ok()
    }

    /// Whether the cursor points at the last item of the trace.
    pub fn is_last_item(&self, cursor: &ItemCursor) -> Result<bool> {
        if cursor.end {
            return Ok(false);
        }
        self.validate(cursor)?;
        Ok(self.last_item_read && cursor.loc == self.tail)
    }

    /// Seeks the cursor forward by `n` items.
    ///
    /// When the target lies beyond the window and the builder allows it,
    /// whole chunks are skipped through the record reader; otherwise the
    /// seek advances item by item.
    pub fn seek(&mut self, cursor: &mut ItemCursor, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if cursor.end {
            return Err(StfError::SeekPastEnd);
        }
        self.validate(cursor)?;

        let buffered_ahead = self.tail_seq - cursor.seq + 1;
        if self.builder.slow_seek() || n <= buffered_ahead {
            for _ in 0..n {
                if !self.advance(cursor)? {
                    return Err(StfError::SeekPastEnd);
                }
            }
            return Ok(());
        }

        // Items are 1:1 with markers on this path. The item under
        // construction already consumed its opening marker, hence the
        // extra one.
        let skip = n - buffered_ahead - 1;
        self.reader.seek_markers(skip)?;
        self.builder.reset_after_seek(self.reader.num_markers());

        self.head = 0;
        self.tail = 0;
        self.buffered = 0;
        self.last_item_read = false;
        self.init_buffer()?;
        if self.buffered == 0 {
            return Err(StfError::SeekPastEnd);
        }
        *cursor = ItemCursor {
            seq: self.tail_seq + 1 - self.buffered as u64,
            loc: self.head,
            end: false,
        };
        self.num_items_read = self.num_items_read.max(cursor.seq);
        Ok(())
    }

    /// Returns a cursor positioned at the `n`-th item (1-based). Intended
    /// for seeking before any iteration has started.
    pub fn seek_from_beginning(&mut self, n: u64) -> Result<ItemCursor> {
        let mut cursor = self.begin()?;
        if n > 1 {
            self.seek(&mut cursor, n - 1)?;
        }
        Ok(cursor)
    }
}

impl<B: ItemBuilder> std::fmt::Debug for BufferedItemReader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedItemReader")
            .field("buffered", &self.buffered)
            .field("tail_seq", &self.tail_seq)
            .field("last_item_read", &self.last_item_read)
            .finish()
    }
}
