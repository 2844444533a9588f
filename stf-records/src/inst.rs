//! Instruction-stream records: opcodes, operands, memory accesses, events,
//! and page-table walks.

use core::fmt;
use std::io;

use stf_types::{
    vector_lanes,
    BusMasterType,
    EventKind,
    ExecutionMode,
    MemAccessType,
};

use crate::io::{
    TraceRead,
    TraceWrite,
};

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Architectural CSR number of the SATP register.
pub const CSR_SATP: u16 = 0x180;

/// Role of a register operand.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperandType {
    /// Value read by the instruction
    #[default]
    Source = 0,
    /// Value written by the instruction
    Dest = 1,
    /// Machine state sampled before the instruction executes
    State = 2,
}

impl OperandType {
    /// Converts a wire value into an `OperandType`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Source),
            1 => Some(Self::Dest),
            2 => Some(Self::State),
            _ => None,
        }
    }
}

/// Register file a register operand belongs to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RegType {
    /// Integer register file
    #[default]
    Integer = 0,
    /// Floating-point register file
    Float = 1,
    /// Vector register file
    Vector = 2,
    /// Control and status registers
    Csr = 3,
}

impl RegType {
    /// Converts a wire value into a `RegType`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Integer),
            1 => Some(Self::Float),
            2 => Some(Self::Vector),
            3 => Some(Self::Csr),
            _ => None,
        }
    }
}

/// Content of a register operand: a scalar word or a vector of lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegData {
    /// A scalar register value
    Scalar(u64),
    /// Vector register lanes, low lane first. The lane count is fixed by
    /// the trace's VLEN_CONFIG, not stored per record.
    Vector(Vec<u64>),
}

impl Default for RegData {
    fn default() -> Self {
        Self::Scalar(0)
    }
}

impl RegData {
    /// The scalar value, or the low lane of a vector.
    pub fn scalar(&self) -> u64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Vector(lanes) => lanes.first().copied().unwrap_or(0),
        }
    }
}

/// Register operand of an instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstRegRecord {
    /// Operand role
    pub operand_type: OperandType,
    /// Register file
    pub reg_type: RegType,
    /// Register number. CSRs use the architectural CSR address space.
    pub reg: u16,
    /// Operand content
    pub data: RegData,
}

impl InstRegRecord {
    /// Builds a scalar operand record.
    pub fn scalar(operand_type: OperandType, reg_type: RegType, reg: u16, value: u64) -> Self {
        Self {
            operand_type,
            reg_type,
            reg,
            data: RegData::Scalar(value),
        }
    }

    /// Whether this operand reads or writes the SATP CSR.
    pub fn is_satp(&self) -> bool {
        self.reg_type == RegType::Csr && self.reg == CSR_SATP
    }

    /// The scalar content of the operand.
    pub fn scalar_data(&self) -> u64 {
        self.data.scalar()
    }

    /// Serializes the record payload.
    ///
    /// Vector operands must match the writer's configured vlen; the lane
    /// count is reconstructed from it on read.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.operand_type as u8)?;
        writer.write_u8(self.reg_type as u8)?;
        writer.write_u16(self.reg)?;
        match &self.data {
            RegData::Scalar(value) => writer.write_u64(*value),
            RegData::Vector(lanes) => {
                if self.reg_type != RegType::Vector {
                    return Err(invalid("vector data on a non-vector register"));
                }
                if lanes.len() != vector_lanes(writer.vlen()) {
                    return Err(invalid("vector operand does not match the configured vlen"));
                }
                for lane in lanes {
                    writer.write_u64(*lane)?;
                }
                Ok(())
            }
        }
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.operand_type = OperandType::from_u8(reader.read_u8()?)
            .ok_or_else(|| invalid("invalid operand type"))?;
        self.reg_type =
            RegType::from_u8(reader.read_u8()?).ok_or_else(|| invalid("invalid register type"))?;
        self.reg = reader.read_u16()?;
        if self.reg_type == RegType::Vector {
            let vlen = reader.vlen();
            if vlen == 0 {
                return Err(invalid("vector operand in a trace without VLEN_CONFIG"));
            }
            if !matches!(self.data, RegData::Vector(_)) {
                self.data = RegData::Vector(Vec::new());
            }
            if let RegData::Vector(lanes) = &mut self.data {
                reader.read_words(vector_lanes(vlen), lanes)?;
            }
        } else {
            self.data = RegData::Scalar(reader.read_u64()?);
        }
        Ok(())
    }
}

impl fmt::Display for InstRegRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} r{} = {:#x}",
            self.operand_type,
            self.reg_type,
            self.reg,
            self.scalar_data()
        )
    }
}

/// Marks a register operand as ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstReadyRegRecord {
    /// Register number
    pub reg: u16,
}

impl InstReadyRegRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u16(self.reg)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.reg = reader.read_u16()?;
        Ok(())
    }
}

impl fmt::Display for InstReadyRegRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.reg)
    }
}

/// Target PC produced by a taken branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstPcTargetRecord {
    /// Target address
    pub addr: u64,
}

impl InstPcTargetRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.addr)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.addr = reader.read_u64()?;
        Ok(())
    }
}

impl fmt::Display for InstPcTargetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr)
    }
}

/// A 2-byte (compressed) instruction.
///
/// The PC is not part of the wire format; the reader reconstructs it from
/// the preceding stream state and stores it here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstOpcode16Record {
    /// Instruction opcode
    pub opcode: u16,
    /// PC assigned by the reader
    pub pc: u64,
}

impl InstOpcode16Record {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u16(self.opcode)
    }

    /// Deserializes the record payload. The PC is reset; the reader fills
    /// it in afterwards.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.opcode = reader.read_u16()?;
        self.pc = 0;
        Ok(())
    }
}

impl fmt::Display for InstOpcode16Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {:#06x}", self.pc, self.opcode)
    }
}

/// A 4-byte instruction. See [`InstOpcode16Record`] for PC handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstOpcode32Record {
    /// Instruction opcode
    pub opcode: u32,
    /// PC assigned by the reader
    pub pc: u64,
}

impl InstOpcode32Record {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u32(self.opcode)
    }

    /// Deserializes the record payload. The PC is reset; the reader fills
    /// it in afterwards.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.opcode = reader.read_u32()?;
        self.pc = 0;
        Ok(())
    }
}

impl fmt::Display for InstOpcode32Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {:#010x}", self.pc, self.opcode)
    }
}

/// Memory access descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstMemAccessRecord {
    /// Virtual address of the access
    pub va: u64,
    /// Access size in bytes
    pub size: u16,
    /// Access attributes
    pub attr: u16,
    /// Load or store
    pub access_type: MemAccessType,
}

impl Default for InstMemAccessRecord {
    fn default() -> Self {
        Self {
            va: 0,
            size: 0,
            attr: 0,
            access_type: MemAccessType::Read,
        }
    }
}

impl InstMemAccessRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.va)?;
        writer.write_u16(self.size)?;
        writer.write_u16(self.attr)?;
        writer.write_u8(self.access_type as u8)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.va = reader.read_u64()?;
        self.size = reader.read_u16()?;
        self.attr = reader.read_u16()?;
        self.access_type = MemAccessType::from_u8(reader.read_u8()?)
            .ok_or_else(|| invalid("invalid memory access type"))?;
        Ok(())
    }
}

impl fmt::Display for InstMemAccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:#x} size {}",
            self.access_type, self.va, self.size
        )
    }
}

/// Data moved by the preceding memory access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstMemContentRecord {
    /// Raw content bytes
    pub data: Vec<u8>,
}

impl InstMemContentRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_bytes_u16(&self.data)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        reader.read_bytes_u16(&mut self.data)
    }
}

impl fmt::Display for InstMemContentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.data.len())
    }
}

/// Access attributes of a bus-master transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusMasterAccessRecord {
    /// Address of the transfer
    pub va: u64,
    /// Transfer size in bytes
    pub size: u16,
    /// Transfer attributes
    pub attr: u16,
    /// Originating bus master
    pub src: BusMasterType,
    /// Read or write
    pub access_type: MemAccessType,
}

impl Default for BusMasterAccessRecord {
    fn default() -> Self {
        Self {
            va: 0,
            size: 0,
            attr: 0,
            src: BusMasterType::Core,
            access_type: MemAccessType::Read,
        }
    }
}

impl BusMasterAccessRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.va)?;
        writer.write_u16(self.size)?;
        writer.write_u16(self.attr)?;
        writer.write_u8(self.src as u8)?;
        writer.write_u8(self.access_type as u8)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.va = reader.read_u64()?;
        self.size = reader.read_u16()?;
        self.attr = reader.read_u16()?;
        self.src =
            BusMasterType::from_u8(reader.read_u8()?).ok_or_else(|| invalid("invalid bus master"))?;
        self.access_type = MemAccessType::from_u8(reader.read_u8()?)
            .ok_or_else(|| invalid("invalid memory access type"))?;
        Ok(())
    }
}

impl fmt::Display for BusMasterAccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} {:#x} size {}",
            self.src, self.access_type, self.va, self.size
        )
    }
}

/// Data moved by the preceding bus-master access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusMasterContentRecord {
    /// Raw content bytes
    pub data: Vec<u8>,
}

impl BusMasterContentRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_bytes_u16(&self.data)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        reader.read_bytes_u16(&mut self.data)
    }
}

impl fmt::Display for BusMasterContentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.data.len())
    }
}

/// Fault, interrupt, syscall, or mode-change event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventRecord {
    /// Event code
    pub event: EventKind,
    /// Event payload. For mode changes the first word carries the new
    /// execution mode.
    pub data: Vec<u64>,
}

impl Default for EventRecord {
    fn default() -> Self {
        Self {
            event: EventKind::Breakpoint,
            data: Vec::new(),
        }
    }
}

impl EventRecord {
    /// Builds a mode-change event.
    pub fn mode_change(mode: ExecutionMode) -> Self {
        Self {
            event: EventKind::ModeChange,
            data: vec![mode as u64],
        }
    }

    /// Whether this event reports a privilege mode change.
    pub fn is_mode_change(&self) -> bool {
        self.event.is_mode_change()
    }

    /// The new execution mode of a mode-change event.
    pub fn mode(&self) -> Option<ExecutionMode> {
        if !self.is_mode_change() {
            return None;
        }
        self.data
            .first()
            .and_then(|word| u8::try_from(*word).ok())
            .and_then(ExecutionMode::from_u8)
    }

    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u32(self.event as u32)?;
        writer.write_words_u8(&self.data)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.event =
            EventKind::from_u32(reader.read_u32()?).ok_or_else(|| invalid("invalid event"))?;
        reader.read_words_u8(&mut self.data)
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:x?}", self.event, self.data)
    }
}

/// Target PC of an event redirect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventPcTargetRecord {
    /// Target address
    pub addr: u64,
}

impl EventPcTargetRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.addr)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.addr = reader.read_u64()?;
        Ok(())
    }
}

impl fmt::Display for EventPcTargetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr)
    }
}

/// A micro-op of a cracked instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstMicroOpRecord {
    /// Set on the last micro-op of the instruction
    pub eot: bool,
    /// Micro-op encoding
    pub microop: u32,
}

impl InstMicroOpRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.eot as u8)?;
        writer.write_u32(self.microop)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.eot = reader.read_u8()? != 0;
        self.microop = reader.read_u32()?;
        Ok(())
    }
}

impl fmt::Display for InstMicroOpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} eot={}", self.microop, self.eot)
    }
}

/// One `(PA, PTE)` pair observed by a page-table walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalkEntry {
    /// Physical address the PTE was read from
    pub pa: u64,
    /// Raw PTE value
    pub pte: u64,
}

/// A full page-table walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageTableWalkRecord {
    /// Index of the first instruction that observes this walk
    pub first_access_index: u64,
    /// The `(PA, PTE)` pairs visited, root first
    pub entries: Vec<WalkEntry>,
}

impl PageTableWalkRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.first_access_index)?;
        let count = u16::try_from(self.entries.len())
            .map_err(|_| invalid("page table walk too long"))?;
        writer.write_u16(count)?;
        for entry in &self.entries {
            writer.write_u64(entry.pa)?;
            writer.write_u64(entry.pte)?;
        }
        Ok(())
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.first_access_index = reader.read_u64()?;
        let count = reader.read_u16()? as usize;
        self.entries.clear();
        self.entries.reserve(count);
        for _ in 0..count {
            self.entries.push(WalkEntry {
                pa: reader.read_u64()?,
                pte: reader.read_u64()?,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PageTableWalkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "walk @ {} [", self.first_access_index)?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:#x}={:#x}", entry.pa, entry.pte)?;
        }
        write!(f, "]")
    }
}
