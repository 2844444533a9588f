//! Branch items and the branch reader.

use std::path::Path;

use stf_records::{
    OperandType,
    Record,
    RegType,
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
    inst::{
        Opcode,
        SkipTracker,
    },
    reader::{
        ReaderOptions,
        RecordReader,
        TraceHeader,
    },
};

pub mod decoder;

use decoder::BranchInfo;

/// A register operand of a branch: number and traced value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BranchOperand {
    /// Register number
    pub reg: u16,
    /// Traced value
    pub value: u64,
}

/// One branch instruction, decoded and combined with its trace records.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Branch {
    index: u64,
    skipped: bool,
    pc: u64,
    target_pc: u64,
    opcode: u32,
    opcode_size: u8,
    taken: bool,
    conditional: bool,
    call: bool,
    ret: bool,
    indirect: bool,
    rs1: Option<BranchOperand>,
    rs2: Option<BranchOperand>,
    rd: Option<BranchOperand>,
}

impl Branch {
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// 1-based branch index. Skipped items repeat the index of the
    /// last unskipped branch.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Whether the reader marked this branch as skipped.
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    /// PC of the branch.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Target PC: the decoder's for non-indirect branches, the trace's for
    /// indirect ones.
    pub fn target_pc(&self) -> u64 {
        self.target_pc
    }

    /// Raw opcode.
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    /// Opcode size in bytes (2 or 4).
    pub fn opcode_size(&self) -> u8 {
        self.opcode_size
    }

    /// Whether the branch was taken.
    pub fn is_taken(&self) -> bool {
        self.taken
    }

    /// Whether the branch is conditional.
    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    /// Whether the branch is a call.
    pub fn is_call(&self) -> bool {
        self.call
    }

    /// Whether the branch is a return.
    pub fn is_return(&self) -> bool {
        self.ret
    }

    /// Whether the branch target comes from a register.
    pub fn is_indirect(&self) -> bool {
        self.indirect
    }

    /// First integer source operand, when the trace records it.
    pub fn rs1(&self) -> Option<BranchOperand> {
        self.rs1
    }

    /// Second integer source operand, when the trace records it.
    pub fn rs2(&self) -> Option<BranchOperand> {
        self.rs2
    }

    /// Integer destination operand, when the trace records it.
    pub fn rd(&self) -> Option<BranchOperand> {
        self.rd
    }
}

impl TraceItem for Branch {
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

/// Assembles [`Branch`] items: a restricted instruction reader that
/// discards non-branch instructions after decoding their opcode.
#[derive(Debug)]
pub struct BranchBuilder {
    iem: stf_types::Iem,
    pending: Option<Opcode>,
    raw_num_read: u64,
    skip: SkipTracker,
    last_taken_target: Option<u64>,
}

impl BranchBuilder {
    fn new(iem: stf_types::Iem, only_user_mode: bool) -> Self {
        Self {
            iem,
            pending: None,
            raw_num_read: 0,
            skip: SkipTracker::new(only_user_mode),
            last_taken_target: None,
        }
    }

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

    /// Consumes the records of one decoded branch, collecting its
    /// operands. Records that cannot belong to a branch are semantic
    /// errors.
    fn fill_branch(
        &mut self,
        reader: &mut RecordReader,
        item: &mut Branch,
        info: &BranchInfo,
        opener: &Opcode,
    ) -> Result<()> {
        item.pc = opener.pc;
        item.opcode = opener.opcode;
        item.opcode_size = opener.size;
        item.conditional = info.conditional;
        item.call = info.call;
        item.ret = info.ret;
        item.indirect = info.indirect;
        item.target_pc = info.target;

        let mut trace_target = None;
        // A FORCE_PC stitch makes the next instruction's PC unrelated to
        // this branch's target.
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
                Record::InstReg(rec) => {
                    if rec.operand_type == OperandType::State {
                        continue;
                    }
                    // Branches only touch the integer register file.
                    if rec.reg_type != RegType::Integer {
                        return Err(StfError::NotABranch(item.pc));
                    }
                    let operand = BranchOperand {
                        reg: rec.reg,
                        value: rec.scalar_data(),
                    };
                    match rec.operand_type {
                        OperandType::Source => {
                            if item.rs1.is_none() {
                                item.rs1 = Some(operand);
                            } else if item.rs2.is_none() {
                                item.rs2 = Some(operand);
                            } else {
                                return Err(StfError::NotABranch(item.pc));
                            }
                        }
                        OperandType::Dest => {
                            if item.rd.is_none() {
                                item.rd = Some(operand);
                            } else {
                                return Err(StfError::NotABranch(item.pc));
                            }
                        }
                        OperandType::State => unreachable!(),
                    }
                }
                Record::InstMemAccess(_) => {
                    return Err(StfError::NotABranch(item.pc));
                }
                Record::InstPcTarget(rec) => {
                    item.taken = true;
                    trace_target = Some(rec.addr);
                }
                Record::Event(rec) => {
                    if let Some(mode) = rec.mode() {
                        self.skip.on_mode_change(mode == ExecutionMode::User);
                    }
                }
                Record::ForcePc(_) => stitched = true,
                Record::Transaction(_) | Record::TransactionDependency(_) => {
                    return Err(StfError::UnexpectedRecord(record.descriptor()))
                }
                _ => {}
            }
        }

        if item.indirect {
            // Indirect targets only exist in the trace.
            let Some(target) = trace_target else {
                return Err(StfError::IndirectWithoutTarget(item.pc));
            };
            item.target_pc = target;
        } else if let Some(target) = trace_target {
            if target != item.target_pc {
                return Err(StfError::BranchTargetMismatch {
                    pc: item.pc,
                    decoded: item.target_pc,
                    trace: target,
                });
            }
        }

        if item.taken && !stitched {
            self.last_taken_target = Some(item.target_pc);
        }
        Ok(())
    }

    /// Consumes and discards the records of a non-branch instruction.
    /// A PC target here means the trace marked a non-branch taken.
    fn discard_instruction(&mut self, reader: &mut RecordReader, pc: u64) -> Result<()> {
        loop {
            let Some(record) = reader.next_record()? else {
                return Ok(());
            };
            match &*record {
                Record::InstOpcode16(_) | Record::InstOpcode32(_) => {
                    self.pending = Opcode::from_record(&record);
                    return Ok(());
                }
                Record::InstPcTarget(_) => {
                    return Err(StfError::NotABranch(pc));
                }
                Record::Event(rec) => {
                    if let Some(mode) = rec.mode() {
                        self.skip.on_mode_change(mode == ExecutionMode::User);
                    }
                }
                _ => {}
            }
        }
    }
}

impl ItemBuilder for BranchBuilder {
    type Item = Branch;

    fn read_next(&mut self, reader: &mut RecordReader, item: &mut Branch) -> Result<bool> {
        loop {
            self.skip.update_before_item();

            let Some(opener) = self.next_opener(reader)? else {
                return Ok(false);
            };
            self.check_next_pc(&opener)?;

            match decoder::decode(self.iem, opener.pc, opener.opcode, opener.size) {
                Some(info) => {
                    item.reset();
                    self.fill_branch(reader, item, &info, &opener)?;
                    self.raw_num_read += 1;
                    item.skipped = self.skip.skipping();
                    return Ok(true);
                }
                None => {
                    self.discard_instruction(reader, opener.pc)?;
                }
            }
        }
    }

    fn raw_num_read(&self) -> u64 {
        self.raw_num_read
    }

    fn reset_after_seek(&mut self, raw: u64) {
        self.pending = None;
        self.raw_num_read = raw;
        self.last_taken_target = None;
    }

    /// Branches are not 1:1 with marker records, so chunk skipping can
    /// never be used.
    fn slow_seek(&self) -> bool {
        true
    }
}

/// Buffered reader over [`Branch`] items.
pub struct BranchReader {
    inner: BufferedItemReader<BranchBuilder>,
    cursor: Option<ItemCursor>,
}

impl BranchReader {
    /// Opens an instruction trace and iterates its branches.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let reader = RecordReader::open(path, options)?;
        let builder =
            BranchBuilder::new(reader.header().iem_or_default(), options.only_user_mode);
        Ok(Self {
            inner: BufferedItemReader::new(reader, builder, options.buffer_size),
            cursor: None,
        })
    }

    /// Header state of the trace.
    pub fn header(&self) -> &TraceHeader {
        self.inner.record_reader().header()
    }

    /// A cursor at the oldest buffered branch.
    pub fn begin(&mut self) -> Result<ItemCursor> {
        self.inner.begin()
    }

    /// Advances a cursor. Returns false at end of trace.
    pub fn advance(&mut self, cursor: &mut ItemCursor) -> Result<bool> {
        self.inner.advance(cursor)
    }

    /// The branch under a cursor.
    pub fn item(&self, cursor: &ItemCursor) -> Result<Option<&Branch>> {
        self.inner.item(cursor)
    }

    /// Seeks a cursor forward by `n` branches.
    pub fn seek(&mut self, cursor: &mut ItemCursor, n: u64) -> Result<()> {
        self.inner.seek(cursor, n)
    }

    /// Streams the next branch, driving an internal cursor.
    pub fn next_branch(&mut self) -> Result<Option<&Branch>> {
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

    /// Number of branches visited, counting skipped ones.
    pub fn num_branches_read(&self) -> u64 {
        self.inner.num_items_read()
    }

    /// Number of opcode records consumed by the underlying reader.
    pub fn num_marker_records(&self) -> u64 {
        self.inner.num_marker_records()
    }
}

impl std::fmt::Debug for BranchReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchReader")
            .field("inner", &self.inner)
            .finish()
    }
}
