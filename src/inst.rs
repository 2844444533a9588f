//! Instruction items and the instruction reader.

use std::path::Path;

use stf_records::{
    EventRecord,
    InstMemAccessRecord,
    InstMemContentRecord,
    InstMicroOpRecord,
    InstRegRecord,
    OperandType,
    Record,
};
use stf_types::ExecutionMode;

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

/// A memory operation: the access descriptor plus its content blob, when
/// the trace carries one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryAccess {
    /// Access descriptor
    pub access: InstMemAccessRecord,
    /// Data moved by the access
    pub content: Option<InstMemContentRecord>,
}

/// One instruction assembled from the records between two opcode records.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    index: u64,
    skipped: bool,
    pc: u64,
    opcode: u32,
    opcode_size: u8,
    operands: Vec<InstRegRecord>,
    mem_accesses: Vec<MemoryAccess>,
    events: Vec<EventRecord>,
    event_targets: Vec<u64>,
    microops: Vec<InstMicroOpRecord>,
    taken: bool,
    target_pc: u64,
}

impl Instruction {
    fn reset(&mut self) {
        self.index = 0;
        self.skipped = false;
        self.pc = 0;
        self.opcode = 0;
        self.opcode_size = 0;
        self.operands.clear();
        self.mem_accesses.clear();
        self.events.clear();
        self.event_targets.clear();
        self.microops.clear();
        self.taken = false;
        self.target_pc = 0;
    }

    /// 1-based instruction index. Skipped items repeat the index of
    /// the last unskipped instruction.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Whether the reader marked this instruction as skipped.
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    /// PC of the instruction.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Raw opcode. 16-bit opcodes occupy the low half.
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    /// Opcode size in bytes (2 or 4).
    pub fn opcode_size(&self) -> u8 {
        self.opcode_size
    }

    /// All register operands, in record order.
    pub fn operands(&self) -> &[InstRegRecord] {
        &self.operands
    }

    /// Source operands.
    pub fn source_operands(&self) -> impl Iterator<Item = &InstRegRecord> {
        self.operands
            .iter()
            .filter(|op| op.operand_type == OperandType::Source)
    }

    /// Destination operands.
    pub fn dest_operands(&self) -> impl Iterator<Item = &InstRegRecord> {
        self.operands
            .iter()
            .filter(|op| op.operand_type == OperandType::Dest)
    }

    /// Memory operations performed by the instruction.
    pub fn mem_accesses(&self) -> &[MemoryAccess] {
        &self.mem_accesses
    }

    /// Events attached to the instruction.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Targets of event redirects attached to the instruction.
    pub fn event_targets(&self) -> &[u64] {
        &self.event_targets
    }

    /// Micro-ops of the instruction, when the trace carries them.
    pub fn microops(&self) -> &[InstMicroOpRecord] {
        &self.microops
    }

    /// Whether the instruction is a taken branch.
    pub fn is_taken_branch(&self) -> bool {
        self.taken
    }

    /// Branch target, for taken branches.
    pub fn target_pc(&self) -> Option<u64> {
        self.taken.then_some(self.target_pc)
    }

    /// Whether any attached event is a fault or interrupt.
    pub fn has_fault(&self) -> bool {
        self.events
            .iter()
            .any(|event| event.event.is_fault() || event.event.is_interrupt())
    }
}

impl TraceItem for Instruction {
    fn index(&self) -> u64 {
        self.index
    }

    fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    fn skipped(&self) -> bool {
        self.skipped
    }
}

/// User-mode skipping state shared by the instruction and branch readers.
///
/// Leaving user mode marks the current and following items skipped;
/// returning to user mode unmarks items starting with the one after the
/// return.
#[derive(Debug, Clone, Default)]
pub(crate) struct SkipTracker {
    only_user_mode: bool,
    skipping: bool,
    disable_on_next: bool,
}

impl SkipTracker {
    pub(crate) fn new(only_user_mode: bool) -> Self {
        Self {
            only_user_mode,
            skipping: false,
            disable_on_next: false,
        }
    }

    /// Called before each item is assembled.
    pub(crate) fn update_before_item(&mut self) {
        if self.disable_on_next {
            self.skipping = false;
            self.disable_on_next = false;
        }
    }

    /// Called for every mode-change event.
    pub(crate) fn on_mode_change(&mut self, to_user: bool) {
        if self.only_user_mode {
            if to_user {
                self.disable_on_next = true;
            } else {
                self.skipping = true;
            }
        }
    }

    pub(crate) fn skipping(&self) -> bool {
        self.skipping
    }

    pub(crate) fn enabled(&self) -> bool {
        self.only_user_mode
    }
}

/// A pending opcode record: the opener of the next item.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Opcode {
    pub(crate) opcode: u32,
    pub(crate) size: u8,
    pub(crate) pc: u64,
}

impl Opcode {
    pub(crate) fn from_record(record: &Record) -> Option<Self> {
        match record {
            Record::InstOpcode16(rec) => Some(Self {
                opcode: rec.opcode as u32,
                size: 2,
                pc: rec.pc,
            }),
            Record::InstOpcode32(rec) => Some(Self {
                opcode: rec.opcode,
                size: 4,
                pc: rec.pc,
            }),
            _ => None,
        }
    }
}

/// Assembles [`Instruction`] items.
///
/// An opcode record opens an instruction; the records that follow attach
/// to it; the next opcode record closes it and is stashed as the opener
/// of the next item. The closing opcode's PC is validated against the
/// last taken branch's target.
#[derive(Debug, Default)]
pub struct InstructionBuilder {
    pending: Option<Opcode>,
    raw_num_read: u64,
    skip: SkipTracker,
    last_taken_target: Option<u64>,
}

impl InstructionBuilder {
    fn new(only_user_mode: bool) -> Self {
        Self {
            pending: None,
            raw_num_read: 0,
            skip: SkipTracker::new(only_user_mode),
            last_taken_target: None,
        }
    }

    /// Consumes records until the next opcode record. Returns `None` at
    /// end of trace. Records before the first opcode (a freshly seeked
    /// stream position) are discarded; they belong to an item the caller
    /// skipped over.
    fn next_opener(&mut self, reader: &mut RecordReader) -> Result<Option<Opcode>> {
        if let Some(opener) = self.pending.take() {
            return Ok(Some(opener));
        }
        loop {
            let Some(record) = reader.next_record()? else {
                return Ok(None);
            };
            if let Some(opener) = Opcode::from_record(&record) {
                return Ok(Some(opener));
            }
        }
    }

    fn check_next_pc(&mut self, opener: &Opcode) -> Result<()> {
        if let Some(expected) = self.last_taken_target.take() {
            if opener.pc != expected {
                return Err(StfError::NextPcMismatch {
                    expected,
                    found: opener.pc,
                });
            }
        }
        Ok(())
    }
}

impl ItemBuilder for InstructionBuilder {
    type Item = Instruction;

    fn read_next(&mut self, reader: &mut RecordReader, item: &mut Instruction) -> Result<bool> {
        item.reset();
        self.skip.update_before_item();

        let Some(opener) = self.next_opener(reader)? else {
            return Ok(false);
        };
        self.check_next_pc(&opener)?;
        item.pc = opener.pc;
        item.opcode = opener.opcode;
        item.opcode_size = opener.size;

        // A FORCE_PC stitch makes the next instruction's PC unrelated to
        // this item's branch target.
        let mut stitched = false;

        loop {
            let Some(record) = reader.next_record()? else {
                break;
            };
            match &*record {
                Record::InstOpcode16(_) | Record::InstOpcode32(_) => {
                    self.pending = Opcode::from_record(&record);
                    break;
                }
                Record::InstReg(rec) => item.operands.push(rec.clone()),
                Record::InstMemAccess(rec) => item.mem_accesses.push(MemoryAccess {
                    access: *rec,
                    content: None,
                }),
                Record::InstMemContent(rec) => {
                    match item.mem_accesses.last_mut() {
                        Some(access) if access.content.is_none() => {
                            access.content = Some(rec.clone())
                        }
                        _ => item.mem_accesses.push(MemoryAccess {
                            access: Default::default(),
                            content: Some(rec.clone()),
                        }),
                    }
                }
                Record::InstPcTarget(rec) => {
                    item.taken = true;
                    item.target_pc = rec.addr;
                }
                Record::Event(rec) => {
                    if let Some(mode) = rec.mode() {
                        self.skip.on_mode_change(mode == ExecutionMode::User);
                    }
                    item.events.push(rec.clone());
                }
                Record::EventPcTarget(rec) => item.event_targets.push(rec.addr),
                Record::InstMicroOp(rec) => item.microops.push(*rec),
                Record::ForcePc(_) => stitched = true,
                // Walks, bus traffic, ready flags, and comments are legal
                // between instructions but are not part of the item.
                Record::PageTableWalk(_)
                | Record::BusMasterAccess(_)
                | Record::BusMasterContent(_)
                | Record::InstReadyReg(_)
                | Record::Comment(_) => {}
                Record::Transaction(_) | Record::TransactionDependency(_) => {
                    return Err(StfError::UnexpectedRecord(record.descriptor()))
                }
                _ => return Err(StfError::UnexpectedRecord(record.descriptor())),
            }
        }

        self.raw_num_read += 1;
        item.skipped = self.skip.skipping();
        if item.taken && !stitched {
            self.last_taken_target = Some(item.target_pc);
        }
        Ok(true)
    }

    fn raw_num_read(&self) -> u64 {
        self.raw_num_read
    }

    fn reset_after_seek(&mut self, raw: u64) {
        self.pending = None;
        self.raw_num_read = raw;
        self.last_taken_target = None;
    }

    fn slow_seek(&self) -> bool {
        self.skip.enabled()
    }
}

/// Buffered reader over [`Instruction`] items.
pub struct InstReader {
    inner: BufferedItemReader<InstructionBuilder>,
    cursor: Option<ItemCursor>,
}

impl InstReader {
    /// Opens an instruction trace.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let reader = RecordReader::open(path, options)?;
        let builder = InstructionBuilder::new(options.only_user_mode);
        Ok(Self {
            inner: BufferedItemReader::new(reader, builder, options.buffer_size),
            cursor: None,
        })
    }

    /// Header state of the trace.
    pub fn header(&self) -> &TraceHeader {
        self.inner.record_reader().header()
    }

    /// A cursor at the oldest buffered instruction.
    pub fn begin(&mut self) -> Result<ItemCursor> {
        self.inner.begin()
    }

    /// Advances a cursor. Returns false at end of trace.
    pub fn advance(&mut self, cursor: &mut ItemCursor) -> Result<bool> {
        self.inner.advance(cursor)
    }

    /// The instruction under a cursor.
    pub fn item(&self, cursor: &ItemCursor) -> Result<Option<&Instruction>> {
        self.inner.item(cursor)
    }

    /// Whether the cursor still points inside the window.
    pub fn is_valid(&self, cursor: &ItemCursor) -> bool {
        self.inner.is_valid(cursor)
    }

    /// Seeks a cursor forward by `n` instructions.
    pub fn seek(&mut self, cursor: &mut ItemCursor, n: u64) -> Result<()> {
        self.inner.seek(cursor, n)
    }

    /// A cursor at the `n`-th instruction (1-based).
    pub fn seek_from_beginning(&mut self, n: u64) -> Result<ItemCursor> {
        self.inner.seek_from_beginning(n)
    }

    /// Streams the next instruction, driving an internal cursor.
    pub fn next_instruction(&mut self) -> Result<Option<&Instruction>> {
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

    /// Number of instructions visited, counting skipped ones.
    pub fn num_insts_read(&self) -> u64 {
        self.inner.num_items_read()
    }

    /// Number of opcode records consumed by the underlying reader.
    pub fn num_marker_records(&self) -> u64 {
        self.inner.num_marker_records()
    }
}

impl std::fmt::Debug for InstReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstReader")
            .field("inner", &self.inner)
            .finish()
    }
}
