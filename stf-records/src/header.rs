//! Header records: everything that may appear between the identifier and
//! the END_HEADER marker.

use core::fmt;
use std::io;

use stf_types::{
    Iem,
    Isa,
    TraceFeatures,
    Vlen,
};

use crate::{
    io::{
        TraceRead,
        TraceWrite,
    },
    protocols::ProtocolId,
};

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Clock domain identifier in a transaction trace.
pub type ClockId = u8;

/// Clock ID value reserved as invalid.
pub const INVALID_CLOCK_ID: ClockId = 0;

/// Marks the start of an STF file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentifierRecord;

impl IdentifierRecord {
    /// Magic byte sequence every trace begins with.
    pub const MAGIC: [u8; 3] = *b"STF";

    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_all(&Self::MAGIC)
    }

    /// Deserializes the record payload, validating the magic.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(invalid("not an STF file"));
        }
        Ok(())
    }
}

impl fmt::Display for IdentifierRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STF")
    }
}

/// Trace format version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionRecord {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
}

impl VersionRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u32(self.major)?;
        writer.write_u32(self.minor)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.major = reader.read_u32()?;
        self.minor = reader.read_u32()?;
        Ok(())
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Free-form comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommentRecord {
    /// Comment text
    pub comment: String,
}

impl CommentRecord {
    /// Builds a comment record.
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
        }
    }

    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_string(&self.comment)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        reader.read_string(&mut self.comment)
    }
}

impl fmt::Display for CommentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.comment)
    }
}

/// ISA family of the traced core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsaRecord {
    /// ISA family
    pub isa: Isa,
}

impl Default for IsaRecord {
    fn default() -> Self {
        Self { isa: Isa::Riscv }
    }
}

impl IsaRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.isa as u8)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.isa = Isa::from_u8(reader.read_u8()?).ok_or_else(|| invalid("invalid ISA"))?;
        Ok(())
    }
}

impl fmt::Display for IsaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.isa)
    }
}

/// Instruction encoding mode of the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstIemRecord {
    /// Encoding mode
    pub iem: Iem,
}

impl Default for InstIemRecord {
    fn default() -> Self {
        Self { iem: Iem::Rv64 }
    }
}

impl InstIemRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.iem as u8)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.iem = Iem::from_u8(reader.read_u8()?).ok_or_else(|| invalid("invalid IEM"))?;
        Ok(())
    }
}

impl fmt::Display for InstIemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iem)
    }
}

/// Identifies the tool that generated the trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceInfoRecord {
    /// Generator name
    pub generator: String,
    /// Generator major version
    pub major_version: u32,
    /// Generator minor version
    pub minor_version: u32,
    /// Free-form generator comment
    pub comment: String,
}

impl TraceInfoRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_string(&self.generator)?;
        writer.write_u32(self.major_version)?;
        writer.write_u32(self.minor_version)?;
        writer.write_string(&self.comment)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        reader.read_string(&mut self.generator)?;
        self.major_version = reader.read_u32()?;
        self.minor_version = reader.read_u32()?;
        reader.read_string(&mut self.comment)
    }
}

impl fmt::Display for TraceInfoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}",
            self.generator, self.major_version, self.minor_version
        )
    }
}

/// Feature bitset of the trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceInfoFeatureRecord {
    /// Features present in the trace
    pub features: TraceFeatures,
}

impl TraceInfoFeatureRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.features.bits())
    }

    /// Deserializes the record payload.
    ///
    /// Unknown feature bits are preserved so newer traces still open.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.features = TraceFeatures::from_bits_retain(reader.read_u64()?);
        Ok(())
    }
}

impl fmt::Display for TraceInfoFeatureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.features.bits())
    }
}

/// Process, thread, and address-space IDs of the traced workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessIdExtRecord {
    /// Thread group ID
    pub tgid: u32,
    /// Thread ID
    pub tid: u32,
    /// Address space ID
    pub asid: u32,
}

impl ProcessIdExtRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u32(self.tgid)?;
        writer.write_u32(self.tid)?;
        writer.write_u32(self.asid)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.tgid = reader.read_u32()?;
        self.tid = reader.read_u32()?;
        self.asid = reader.read_u32()?;
        Ok(())
    }
}

impl fmt::Display for ProcessIdExtRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tgid {} tid {} asid {}", self.tgid, self.tid, self.asid)
    }
}

/// Overrides the PC of the next instruction. Carries the initial PC when it
/// appears in the header, and stitches discontinuous traces mid-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ForcePcRecord {
    /// The forced PC
    pub pc: u64,
}

impl ForcePcRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.pc)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.pc = reader.read_u64()?;
        Ok(())
    }
}

impl fmt::Display for ForcePcRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.pc)
    }
}

/// Configures the vector register width used to encode vector operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VlenConfigRecord {
    /// Vector register width in bits
    pub vlen: Vlen,
}

impl VlenConfigRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u32(self.vlen)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.vlen = reader.read_u32()?;
        Ok(())
    }
}

impl fmt::Display for VlenConfigRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vlen {}", self.vlen)
    }
}

/// Declares the protocol of a transaction trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolIdRecord {
    /// Protocol carried by the trace's transactions
    pub protocol_id: ProtocolId,
}

impl Default for ProtocolIdRecord {
    fn default() -> Self {
        Self {
            protocol_id: ProtocolId::TileLink,
        }
    }
}

impl ProtocolIdRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.protocol_id as u8)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.protocol_id = ProtocolId::from_u8(reader.read_u8()?)
            .ok_or_else(|| invalid("invalid protocol ID"))?;
        Ok(())
    }
}

impl fmt::Display for ProtocolIdRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol_id)
    }
}

/// Names a clock domain of a transaction trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockIdRecord {
    /// Clock ID. 0 is reserved as invalid.
    pub clock_id: ClockId,
    /// Clock name
    pub name: String,
}

impl ClockIdRecord {
    /// Builds a clock registration record.
    pub fn new(clock_id: ClockId, name: impl Into<String>) -> Self {
        Self {
            clock_id,
            name: name.into(),
        }
    }

    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.clock_id)?;
        writer.write_string(&self.name)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.clock_id = reader.read_u8()?;
        reader.read_string(&mut self.name)
    }
}

impl fmt::Display for ClockIdRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.clock_id, self.name)
    }
}

/// Terminates the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndHeaderRecord;

impl EndHeaderRecord {
    /// Serializes the record payload.
    pub fn pack(&self, _writer: &mut dyn TraceWrite) -> io::Result<()> {
        Ok(())
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, _reader: &mut dyn TraceRead) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for EndHeaderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "END_HEADER")
    }
}
