//! Record descriptors.
//!
//! Every record carries an 8-bit descriptor on the wire. The wire values
//! (`EncodedDescriptor`) live in a sparse numeric space reserved for
//! compatibility; the library works with a dense internal form
//! (`Descriptor`) that can index per-record-kind arrays directly.

use core::fmt;
use std::io;

/// Descriptor values as they appear on the wire.
///
/// The numeric assignments are frozen; new record types must take values
/// out of the reserved gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EncodedDescriptor {
    /// Start of an STF file
    Identifier = 1,
    /// Trace format version
    Version = 2,
    /// Free-form comment
    Comment = 3,
    /// ISA family
    Isa = 4,
    /// Instruction encoding mode
    InstIem = 5,
    /// Trace generator info
    TraceInfo = 6,
    /// Trace feature bitset
    TraceInfoFeature = 7,
    /// Process/thread/ASID of the traced workload
    ProcessIdExt = 8,
    /// Initial PC and trace stitching
    ForcePc = 9,
    /// Vector register width
    VlenConfig = 10,
    /// Protocol encoded in a transaction trace
    ProtocolId = 11,
    /// Clock domain of a transaction trace
    ClockId = 12,
    /// End of the header
    EndHeader = 19,
    /// PC target generated by an instruction
    InstPcTarget = 31,
    /// Operand register number and content
    InstReg = 40,
    /// Marks an operand as ready
    InstReadyReg = 41,
    /// Page table walk
    PageTableWalk = 50,
    /// Memory access generated by an instruction
    InstMemAccess = 60,
    /// Load/store data
    InstMemContent = 61,
    /// Bus master access attributes
    BusMasterAccess = 62,
    /// Bus master read/write data
    BusMasterContent = 63,
    /// Event
    Event = 100,
    /// PC target generated by an event
    EventPcTarget = 101,
    /// Micro-op
    InstMicroOp = 230,
    /// 4-byte instruction
    InstOpcode32 = 240,
    /// 2-byte instruction
    InstOpcode16 = 241,
    /// Interconnect transaction
    Transaction = 250,
    /// Dependency between transactions
    TransactionDependency = 251,
}

/// The dense internal descriptor form.
///
/// Discriminants are contiguous so that [`Descriptor::COUNT`]-sized arrays
/// (pool caches, the factory table, filter bitsets) can be indexed by
/// [`Descriptor::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Descriptor {
    Identifier = 0,
    Version,
    Comment,
    Isa,
    InstIem,
    TraceInfo,
    TraceInfoFeature,
    ProcessIdExt,
    ForcePc,
    VlenConfig,
    ProtocolId,
    ClockId,
    EndHeader,
    InstPcTarget,
    InstReg,
    InstReadyReg,
    PageTableWalk,
    InstMemAccess,
    InstMemContent,
    BusMasterAccess,
    BusMasterContent,
    Event,
    EventPcTarget,
    InstMicroOp,
    InstOpcode32,
    InstOpcode16,
    Transaction,
    TransactionDependency,
}

impl Descriptor {
    /// Number of descriptor kinds. Sizes every per-kind array.
    pub const COUNT: usize = 28;

    /// Dense array index for this descriptor.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The wire form of this descriptor.
    pub const fn encoded(self) -> EncodedDescriptor {
        match self {
            Self::Identifier => EncodedDescriptor::Identifier,
            Self::Version => EncodedDescriptor::Version,
            Self::Comment => EncodedDescriptor::Comment,
            Self::Isa => EncodedDescriptor::Isa,
            Self::InstIem => EncodedDescriptor::InstIem,
            Self::TraceInfo => EncodedDescriptor::TraceInfo,
            Self::TraceInfoFeature => EncodedDescriptor::TraceInfoFeature,
            Self::ProcessIdExt => EncodedDescriptor::ProcessIdExt,
            Self::ForcePc => EncodedDescriptor::ForcePc,
            Self::VlenConfig => EncodedDescriptor::VlenConfig,
            Self::ProtocolId => EncodedDescriptor::ProtocolId,
            Self::ClockId => EncodedDescriptor::ClockId,
            Self::EndHeader => EncodedDescriptor::EndHeader,
            Self::InstPcTarget => EncodedDescriptor::InstPcTarget,
            Self::InstReg => EncodedDescriptor::InstReg,
            Self::InstReadyReg => EncodedDescriptor::InstReadyReg,
            Self::PageTableWalk => EncodedDescriptor::PageTableWalk,
            Self::InstMemAccess => EncodedDescriptor::InstMemAccess,
            Self::InstMemContent => EncodedDescriptor::InstMemContent,
            Self::BusMasterAccess => EncodedDescriptor::BusMasterAccess,
            Self::BusMasterContent => EncodedDescriptor::BusMasterContent,
            Self::Event => EncodedDescriptor::Event,
            Self::EventPcTarget => EncodedDescriptor::EventPcTarget,
            Self::InstMicroOp => EncodedDescriptor::InstMicroOp,
            Self::InstOpcode32 => EncodedDescriptor::InstOpcode32,
            Self::InstOpcode16 => EncodedDescriptor::InstOpcode16,
            Self::Transaction => EncodedDescriptor::Transaction,
            Self::TransactionDependency => EncodedDescriptor::TransactionDependency,
        }
    }

    /// Whether records of this kind are counted as seek markers.
    ///
    /// Opcode records mark instruction traces, transaction records mark
    /// transaction traces.
    pub const fn is_marker(self) -> bool {
        matches!(
            self,
            Self::InstOpcode16 | Self::InstOpcode32 | Self::Transaction
        )
    }

    /// Whether this is one of the two instruction opcode descriptors.
    pub const fn is_opcode(self) -> bool {
        matches!(self, Self::InstOpcode16 | Self::InstOpcode32)
    }

    /// Whether records of this kind may only appear in the header.
    pub const fn is_header_only(self) -> bool {
        matches!(
            self,
            Self::Identifier
                | Self::Version
                | Self::Isa
                | Self::InstIem
                | Self::TraceInfo
                | Self::TraceInfoFeature
                | Self::ProcessIdExt
                | Self::VlenConfig
                | Self::ProtocolId
                | Self::ClockId
                | Self::EndHeader
        )
    }

    /// The record name as it appears in formatted dumps.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Identifier => "IDENTIFIER",
            Self::Version => "VERSION",
            Self::Comment => "COMMENT",
            Self::Isa => "ISA",
            Self::InstIem => "INST_IEM",
            Self::TraceInfo => "TRACE_INFO",
            Self::TraceInfoFeature => "TRACE_INFO_FEATURE",
            Self::ProcessIdExt => "PROCESS_ID_EXT",
            Self::ForcePc => "FORCE_PC",
            Self::VlenConfig => "VLEN_CONFIG",
            Self::ProtocolId => "PROTOCOL_ID",
            Self::ClockId => "CLOCK_ID",
            Self::EndHeader => "END_HEADER",
            Self::InstPcTarget => "INST_PC_TARGET",
            Self::InstReg => "INST_REG",
            Self::InstReadyReg => "INST_READY_REG",
            Self::PageTableWalk => "PAGE_TABLE_WALK",
            Self::InstMemAccess => "INST_MEM_ACCESS",
            Self::InstMemContent => "INST_MEM_CONTENT",
            Self::BusMasterAccess => "BUS_MASTER_ACCESS",
            Self::BusMasterContent => "BUS_MASTER_CONTENT",
            Self::Event => "EVENT",
            Self::EventPcTarget => "EVENT_PC_TARGET",
            Self::InstMicroOp => "INST_MICROOP",
            Self::InstOpcode32 => "INST_OPCODE32",
            Self::InstOpcode16 => "INST_OPCODE16",
            Self::Transaction => "TRANSACTION",
            Self::TransactionDependency => "TRANSACTION_DEPENDENCY",
        }
    }
}

impl EncodedDescriptor {
    /// The dense internal form of this descriptor.
    pub const fn internal(self) -> Descriptor {
        match self {
            Self::Identifier => Descriptor::Identifier,
            Self::Version => Descriptor::Version,
            Self::Comment => Descriptor::Comment,
            Self::Isa => Descriptor::Isa,
            Self::InstIem => Descriptor::InstIem,
            Self::TraceInfo => Descriptor::TraceInfo,
            Self::TraceInfoFeature => Descriptor::TraceInfoFeature,
            Self::ProcessIdExt => Descriptor::ProcessIdExt,
            Self::ForcePc => Descriptor::ForcePc,
            Self::VlenConfig => Descriptor::VlenConfig,
            Self::ProtocolId => Descriptor::ProtocolId,
            Self::ClockId => Descriptor::ClockId,
            Self::EndHeader => Descriptor::EndHeader,
            Self::InstPcTarget => Descriptor::InstPcTarget,
            Self::InstReg => Descriptor::InstReg,
            Self::InstReadyReg => Descriptor::InstReadyReg,
            Self::PageTableWalk => Descriptor::PageTableWalk,
            Self::InstMemAccess => Descriptor::InstMemAccess,
            Self::InstMemContent => Descriptor::InstMemContent,
            Self::BusMasterAccess => Descriptor::BusMasterAccess,
            Self::BusMasterContent => Descriptor::BusMasterContent,
            Self::Event => Descriptor::Event,
            Self::EventPcTarget => Descriptor::EventPcTarget,
            Self::InstMicroOp => Descriptor::InstMicroOp,
            Self::InstOpcode32 => Descriptor::InstOpcode32,
            Self::InstOpcode16 => Descriptor::InstOpcode16,
            Self::Transaction => Descriptor::Transaction,
            Self::TransactionDependency => Descriptor::TransactionDependency,
        }
    }
}

impl TryFrom<u8> for EncodedDescriptor {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let desc = match value {
            1 => Self::Identifier,
            2 => Self::Version,
            3 => Self::Comment,
            4 => Self::Isa,
            5 => Self::InstIem,
            6 => Self::TraceInfo,
            7 => Self::TraceInfoFeature,
            8 => Self::ProcessIdExt,
            9 => Self::ForcePc,
            10 => Self::VlenConfig,
            11 => Self::ProtocolId,
            12 => Self::ClockId,
            19 => Self::EndHeader,
            31 => Self::InstPcTarget,
            40 => Self::InstReg,
            41 => Self::InstReadyReg,
            50 => Self::PageTableWalk,
            60 => Self::InstMemAccess,
            61 => Self::InstMemContent,
            62 => Self::BusMasterAccess,
            63 => Self::BusMasterContent,
            100 => Self::Event,
            101 => Self::EventPcTarget,
            230 => Self::InstMicroOp,
            240 => Self::InstOpcode32,
            241 => Self::InstOpcode16,
            250 => Self::Transaction,
            251 => Self::TransactionDependency,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid record descriptor {value:#04x}"),
                ))
            }
        };
        Ok(desc)
    }
}

impl From<Descriptor> for EncodedDescriptor {
    fn from(desc: Descriptor) -> Self {
        desc.encoded()
    }
}

impl From<EncodedDescriptor> for Descriptor {
    fn from(desc: EncodedDescriptor) -> Self {
        desc.internal()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for EncodedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.internal().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn encoded_round_trip() {
        for enc in EncodedDescriptor::iter() {
            assert_eq!(EncodedDescriptor::try_from(enc as u8).unwrap(), enc);
            assert_eq!(enc.internal().encoded(), enc);
        }
    }

    #[test]
    fn internal_is_dense() {
        let mut expected = 0usize;
        for desc in Descriptor::iter() {
            assert_eq!(desc.index(), expected);
            expected += 1;
        }
        assert_eq!(expected, Descriptor::COUNT);
    }

    #[test]
    fn reserved_values_rejected() {
        for value in [0u8, 13, 20, 30, 42, 99, 102, 229, 242, 252, 255] {
            assert!(EncodedDescriptor::try_from(value).is_err());
        }
    }

    #[test]
    fn marker_descriptors() {
        assert!(Descriptor::InstOpcode16.is_marker());
        assert!(Descriptor::InstOpcode32.is_marker());
        assert!(Descriptor::Transaction.is_marker());
        assert!(!Descriptor::TransactionDependency.is_marker());
        assert!(!Descriptor::InstReg.is_marker());
    }
}
