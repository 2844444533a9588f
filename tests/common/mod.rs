//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::Path;

use stf::prelude::*;
use stf::stf_records::{
    EventRecord,
    InstOpcode16Record,
    InstOpcode32Record,
    InstPcTargetRecord,
    InstRegRecord,
    OperandType,
    PageTableWalkRecord,
    RegType,
    WalkEntry,
    CSR_SATP,
};

/// ADDI x0, x0, 0
pub const NOP: u32 = 0x0000_0013;

pub fn opcode32(opcode: u32) -> Record {
    Record::InstOpcode32(InstOpcode32Record { opcode, pc: 0 })
}

pub fn opcode16(opcode: u16) -> Record {
    Record::InstOpcode16(InstOpcode16Record { opcode, pc: 0 })
}

pub fn nop() -> Record {
    opcode32(NOP)
}

pub fn pc_target(addr: u64) -> Record {
    Record::InstPcTarget(InstPcTargetRecord { addr })
}

pub fn mode_change(mode: ExecutionMode) -> Record {
    Record::Event(EventRecord::mode_change(mode))
}

pub fn satp_state_write(value: u64) -> Record {
    Record::InstReg(InstRegRecord::scalar(
        OperandType::State,
        RegType::Csr,
        CSR_SATP,
        value,
    ))
}

pub fn int_operand(operand_type: OperandType, reg: u16, value: u64) -> Record {
    Record::InstReg(InstRegRecord::scalar(
        operand_type,
        RegType::Integer,
        reg,
        value,
    ))
}

pub fn walk(first_access_index: u64, entries: &[(u64, u64)]) -> Record {
    Record::PageTableWalk(PageTableWalkRecord {
        first_access_index,
        entries: entries
            .iter()
            .map(|(pa, pte)| WalkEntry { pa: *pa, pte: *pte })
            .collect(),
    })
}

/// A leaf PTE (readable + executable) mapping to `pa`.
pub fn leaf_pte(pa: u64) -> u64 {
    ((pa >> 12) << 10) | 0xf
}

/// A non-leaf PTE pointing at the next-level table at `pa`.
pub fn table_pte(pa: u64) -> u64 {
    ((pa >> 12) << 10) | 0x1
}

/// An SV39 SATP value with the given root table base.
pub fn sv39_satp(base: u64) -> u64 {
    (8u64 << 60) | (base >> 12)
}

/// A writer with an instruction-trace header: RV64, the given initial PC,
/// header already finalized.
pub fn inst_writer(path: &Path, initial_pc: u64, options: &WriterOptions) -> TraceWriter {
    let mut writer = TraceWriter::create(path, options).unwrap();
    writer.set_version(1, 0).unwrap();
    writer.set_iem(Iem::Rv64).unwrap();
    writer.set_initial_pc(initial_pc).unwrap();
    writer.finalize_header().unwrap();
    writer
}

/// Writes a run of 4-byte opcodes.
pub fn write_opcodes(writer: &mut TraceWriter, opcode: u32, count: usize) {
    for _ in 0..count {
        writer.write_record(&opcode32(opcode)).unwrap();
    }
}
