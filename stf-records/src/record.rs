//! The tagged record sum.

use core::fmt;
use std::io;

use crate::{
    descriptor::Descriptor,
    header::*,
    inst::*,
    io::{
        TraceRead,
        TraceWrite,
    },
    transaction::*,
};

/// One STF record: a descriptor plus its payload fields.
///
/// Every variant wraps the concrete record struct for one descriptor.
/// Serialization of the payload is delegated to the variant; the leading
/// descriptor byte is written by the stream layer, which needs it to
/// dispatch construction in the first place.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Record {
    Identifier(IdentifierRecord),
    Version(VersionRecord),
    Comment(CommentRecord),
    Isa(IsaRecord),
    InstIem(InstIemRecord),
    TraceInfo(TraceInfoRecord),
    TraceInfoFeature(TraceInfoFeatureRecord),
    ProcessIdExt(ProcessIdExtRecord),
    ForcePc(ForcePcRecord),
    VlenConfig(VlenConfigRecord),
    ProtocolId(ProtocolIdRecord),
    ClockId(ClockIdRecord),
    EndHeader(EndHeaderRecord),
    InstPcTarget(InstPcTargetRecord),
    InstReg(InstRegRecord),
    InstReadyReg(InstReadyRegRecord),
    PageTableWalk(PageTableWalkRecord),
    InstMemAccess(InstMemAccessRecord),
    InstMemContent(InstMemContentRecord),
    BusMasterAccess(BusMasterAccessRecord),
    BusMasterContent(BusMasterContentRecord),
    Event(EventRecord),
    EventPcTarget(EventPcTargetRecord),
    InstMicroOp(InstMicroOpRecord),
    InstOpcode32(InstOpcode32Record),
    InstOpcode16(InstOpcode16Record),
    Transaction(TransactionRecord),
    TransactionDependency(TransactionDependencyRecord),
}

impl Record {
    /// The dense descriptor of this record.
    pub const fn descriptor(&self) -> Descriptor {
        match self {
            Self::Identifier(_) => Descriptor::Identifier,
            Self::Version(_) => Descriptor::Version,
            Self::Comment(_) => Descriptor::Comment,
            Self::Isa(_) => Descriptor::Isa,
            Self::InstIem(_) => Descriptor::InstIem,
            Self::TraceInfo(_) => Descriptor::TraceInfo,
            Self::TraceInfoFeature(_) => Descriptor::TraceInfoFeature,
            Self::ProcessIdExt(_) => Descriptor::ProcessIdExt,
            Self::ForcePc(_) => Descriptor::ForcePc,
            Self::VlenConfig(_) => Descriptor::VlenConfig,
            Self::ProtocolId(_) => Descriptor::ProtocolId,
            Self::ClockId(_) => Descriptor::ClockId,
            Self::EndHeader(_) => Descriptor::EndHeader,
            Self::InstPcTarget(_) => Descriptor::InstPcTarget,
            Self::InstReg(_) => Descriptor::InstReg,
            Self::InstReadyReg(_) => Descriptor::InstReadyReg,
            Self::PageTableWalk(_) => Descriptor::PageTableWalk,
            Self::InstMemAccess(_) => Descriptor::InstMemAccess,
            Self::InstMemContent(_) => Descriptor::InstMemContent,
            Self::BusMasterAccess(_) => Descriptor::BusMasterAccess,
            Self::BusMasterContent(_) => Descriptor::BusMasterContent,
            Self::Event(_) => Descriptor::Event,
            Self::EventPcTarget(_) => Descriptor::EventPcTarget,
            Self::InstMicroOp(_) => Descriptor::InstMicroOp,
            Self::InstOpcode32(_) => Descriptor::InstOpcode32,
            Self::InstOpcode16(_) => Descriptor::InstOpcode16,
            Self::Transaction(_) => Descriptor::Transaction,
            Self::TransactionDependency(_) => Descriptor::TransactionDependency,
        }
    }

    /// A default-constructed record of the given kind, ready to be
    /// unpacked into.
    pub fn empty(desc: Descriptor) -> Self {
        match desc {
            Descriptor::Identifier => Self::Identifier(Default::default()),
            Descriptor::Version => Self::Version(Default::default()),
            Descriptor::Comment => Self::Comment(Default::default()),
            Descriptor::Isa => Self::Isa(Default::default()),
            Descriptor::InstIem => Self::InstIem(Default::default()),
            Descriptor::TraceInfo => Self::TraceInfo(Default::default()),
            Descriptor::TraceInfoFeature => Self::TraceInfoFeature(Default::default()),
            Descriptor::ProcessIdExt => Self::ProcessIdExt(Default::default()),
            Descriptor::ForcePc => Self::ForcePc(Default::default()),
            Descriptor::VlenConfig => Self::VlenConfig(Default::default()),
            Descriptor::ProtocolId => Self::ProtocolId(Default::default()),
            Descriptor::ClockId => Self::ClockId(Default::default()),
            Descriptor::EndHeader => Self::EndHeader(Default::default()),
            Descriptor::InstPcTarget => Self::InstPcTarget(Default::default()),
            Descriptor::InstReg => Self::InstReg(Default::default()),
            Descriptor::InstReadyReg => Self::InstReadyReg(Default::default()),
            Descriptor::PageTableWalk => Self::PageTableWalk(Default::default()),
            Descriptor::InstMemAccess => Self::InstMemAccess(Default::default()),
            Descriptor::InstMemContent => Self::InstMemContent(Default::default()),
            Descriptor::BusMasterAccess => Self::BusMasterAccess(Default::default()),
            Descriptor::BusMasterContent => Self::BusMasterContent(Default::default()),
            Descriptor::Event => Self::Event(Default::default()),
            Descriptor::EventPcTarget => Self::EventPcTarget(Default::default()),
            Descriptor::InstMicroOp => Self::InstMicroOp(Default::default()),
            Descriptor::InstOpcode32 => Self::InstOpcode32(Default::default()),
            Descriptor::InstOpcode16 => Self::InstOpcode16(Default::default()),
            Descriptor::Transaction => Self::Transaction(Default::default()),
            Descriptor::TransactionDependency => {
                Self::TransactionDependency(Default::default())
            }
        }
    }

    /// Serializes the record payload (without the descriptor byte).
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        match self {
            Self::Identifier(rec) => rec.pack(writer),
            Self::Version(rec) => rec.pack(writer),
            Self::Comment(rec) => rec.pack(writer),
            Self::Isa(rec) => rec.pack(writer),
            Self::InstIem(rec) => rec.pack(writer),
            Self::TraceInfo(rec) => rec.pack(writer),
            Self::TraceInfoFeature(rec) => rec.pack(writer),
            Self::ProcessIdExt(rec) => rec.pack(writer),
            Self::ForcePc(rec) => rec.pack(writer),
            Self::VlenConfig(rec) => rec.pack(writer),
            Self::ProtocolId(rec) => rec.pack(writer),
            Self::ClockId(rec) => rec.pack(writer),
            Self::EndHeader(rec) => rec.pack(writer),
            Self::InstPcTarget(rec) => rec.pack(writer),
            Self::InstReg(rec) => rec.pack(writer),
            Self::InstReadyReg(rec) => rec.pack(writer),
            Self::PageTableWalk(rec) => rec.pack(writer),
            Self::InstMemAccess(rec) => rec.pack(writer),
            Self::InstMemContent(rec) => rec.pack(writer),
            Self::BusMasterAccess(rec) => rec.pack(writer),
            Self::BusMasterContent(rec) => rec.pack(writer),
            Self::Event(rec) => rec.pack(writer),
            Self::EventPcTarget(rec) => rec.pack(writer),
            Self::InstMicroOp(rec) => rec.pack(writer),
            Self::InstOpcode32(rec) => rec.pack(writer),
            Self::InstOpcode16(rec) => rec.pack(writer),
            Self::Transaction(rec) => rec.pack(writer),
            Self::TransactionDependency(rec) => rec.pack(writer),
        }
    }

    /// Deserializes the record payload in place, reusing the variant's
    /// allocations. The caller has already consumed the descriptor byte
    /// and picked a matching variant.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        match self {
            Self::Identifier(rec) => rec.unpack(reader),
            Self::Version(rec) => rec.unpack(reader),
            Self::Comment(rec) => rec.unpack(reader),
            Self::Isa(rec) => rec.unpack(reader),
            Self::InstIem(rec) => rec.unpack(reader),
            Self::TraceInfo(rec) => rec.unpack(reader),
            Self::TraceInfoFeature(rec) => rec.unpack(reader),
            Self::ProcessIdExt(rec) => rec.unpack(reader),
            Self::ForcePc(rec) => rec.unpack(reader),
            Self::VlenConfig(rec) => rec.unpack(reader),
            Self::ProtocolId(rec) => rec.unpack(reader),
            Self::ClockId(rec) => rec.unpack(reader),
            Self::EndHeader(rec) => rec.unpack(reader),
            Self::InstPcTarget(rec) => rec.unpack(reader),
            Self::InstReg(rec) => rec.unpack(reader),
            Self::InstReadyReg(rec) => rec.unpack(reader),
            Self::PageTableWalk(rec) => rec.unpack(reader),
            Self::InstMemAccess(rec) => rec.unpack(reader),
            Self::InstMemContent(rec) => rec.unpack(reader),
            Self::BusMasterAccess(rec) => rec.unpack(reader),
            Self::BusMasterContent(rec) => rec.unpack(reader),
            Self::Event(rec) => rec.unpack(reader),
            Self::EventPcTarget(rec) => rec.unpack(reader),
            Self::InstMicroOp(rec) => rec.unpack(reader),
            Self::InstOpcode32(rec) => rec.unpack(reader),
            Self::InstOpcode16(rec) => rec.unpack(reader),
            Self::Transaction(rec) => rec.unpack(reader),
            Self::TransactionDependency(rec) => rec.unpack(reader),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.descriptor())?;
        match self {
            Self::Identifier(rec) => fmt::Display::fmt(rec, f),
            Self::Version(rec) => fmt::Display::fmt(rec, f),
            Self::Comment(rec) => fmt::Display::fmt(rec, f),
            Self::Isa(rec) => fmt::Display::fmt(rec, f),
            Self::InstIem(rec) => fmt::Display::fmt(rec, f),
            Self::TraceInfo(rec) => fmt::Display::fmt(rec, f),
            Self::TraceInfoFeature(rec) => fmt::Display::fmt(rec, f),
            Self::ProcessIdExt(rec) => fmt::Display::fmt(rec, f),
            Self::ForcePc(rec) => fmt::Display::fmt(rec, f),
            Self::VlenConfig(rec) => fmt::Display::fmt(rec, f),
            Self::ProtocolId(rec) => fmt::Display::fmt(rec, f),
            Self::ClockId(rec) => fmt::Display::fmt(rec, f),
            Self::EndHeader(rec) => fmt::Display::fmt(rec, f),
            Self::InstPcTarget(rec) => fmt::Display::fmt(rec, f),
            Self::InstReg(rec) => fmt::Display::fmt(rec, f),
            Self::InstReadyReg(rec) => fmt::Display::fmt(rec, f),
            Self::PageTableWalk(rec) => fmt::Display::fmt(rec, f),
            Self::InstMemAccess(rec) => fmt::Display::fmt(rec, f),
            Self::InstMemContent(rec) => fmt::Display::fmt(rec, f),
            Self::BusMasterAccess(rec) => fmt::Display::fmt(rec, f),
            Self::BusMasterContent(rec) => fmt::Display::fmt(rec, f),
            Self::Event(rec) => fmt::Display::fmt(rec, f),
            Self::EventPcTarget(rec) => fmt::Display::fmt(rec, f),
            Self::InstMicroOp(rec) => fmt::Display::fmt(rec, f),
            Self::InstOpcode32(rec) => fmt::Display::fmt(rec, f),
            Self::InstOpcode16(rec) => fmt::Display::fmt(rec, f),
            Self::Transaction(rec) => fmt::Display::fmt(rec, f),
            Self::TransactionDependency(rec) => fmt::Display::fmt(rec, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        io::{
            ByteReader,
            ByteWriter,
        },
        protocols::{
            tilelink::{
                Channel,
                ChannelA,
                DataFields,
            },
            ProtocolData,
            ProtocolId,
        },
    };
    use stf_types::{
        EventKind,
        ExecutionMode,
        TraceFeatures,
    };
    use strum::IntoEnumIterator;

    fn round_trip(record: &Record) -> Record {
        let mut writer = ByteWriter::new(Vec::new());
        writer.set_vlen(128);
        record.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = ByteReader::new(bytes.as_slice());
        reader.set_vlen(128);
        reader.set_protocol_id(ProtocolId::TileLink);
        let mut out = Record::empty(record.descriptor());
        out.unpack(&mut reader).unwrap();
        out
    }

    #[test]
    fn empty_matches_descriptor() {
        for desc in Descriptor::iter() {
            assert_eq!(Record::empty(desc).descriptor(), desc);
        }
    }

    #[test]
    fn header_records_round_trip() {
        let records = [
            Record::Identifier(IdentifierRecord),
            Record::Version(VersionRecord { major: 1, minor: 4 }),
            Record::Comment(CommentRecord::new("trace of a sort benchmark")),
            Record::TraceInfo(TraceInfoRecord {
                generator: "qemu".into(),
                major_version: 8,
                minor_version: 2,
                comment: String::new(),
            }),
            Record::TraceInfoFeature(TraceInfoFeatureRecord {
                features: TraceFeatures::CONTAIN_EVENT | TraceFeatures::CONTAIN_PTE,
            }),
            Record::ProcessIdExt(ProcessIdExtRecord {
                tgid: 100,
                tid: 101,
                asid: 7,
            }),
            Record::ForcePc(ForcePcRecord { pc: 0x8000_0000 }),
            Record::VlenConfig(VlenConfigRecord { vlen: 128 }),
            Record::ClockId(ClockIdRecord::new(1, "core_clk")),
            Record::EndHeader(EndHeaderRecord),
        ];
        for record in &records {
            assert_eq!(&round_trip(record), record);
        }
    }

    #[test]
    fn instruction_records_round_trip() {
        let records = [
            Record::InstOpcode16(InstOpcode16Record {
                opcode: 0x4501,
                pc: 0,
            }),
            Record::InstOpcode32(InstOpcode32Record {
                opcode: 0xdead_beef,
                pc: 0,
            }),
            Record::InstPcTarget(InstPcTargetRecord { addr: 0x1008 }),
            Record::InstReg(InstRegRecord::scalar(
                OperandType::Source,
                RegType::Integer,
                5,
                0x1234,
            )),
            Record::InstReg(InstRegRecord {
                operand_type: OperandType::Dest,
                reg_type: RegType::Vector,
                reg: 2,
                data: RegData::Vector(vec![0x1111, 0x2222]),
            }),
            Record::InstMemAccess(InstMemAccessRecord {
                va: 0x9000_0000,
                size: 8,
                attr: 0,
                access_type: stf_types::MemAccessType::Write,
            }),
            Record::InstMemContent(InstMemContentRecord {
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            }),
            Record::Event(EventRecord::mode_change(ExecutionMode::User)),
            Record::Event(EventRecord {
                event: EventKind::UserEcall,
                data: vec![64, 1],
            }),
            Record::EventPcTarget(EventPcTargetRecord { addr: 0x2000 }),
            Record::InstMicroOp(InstMicroOpRecord {
                eot: true,
                microop: 0x13,
            }),
            Record::PageTableWalk(PageTableWalkRecord {
                first_access_index: 5,
                entries: vec![
                    WalkEntry {
                        pa: 0x10000,
                        pte: (0x40000 >> 2) | 0xf,
                    },
                    WalkEntry {
                        pa: 0x10008,
                        pte: 0x1,
                    },
                ],
            }),
        ];
        for record in &records {
            assert_eq!(&round_trip(record), record);
        }
    }

    #[test]
    fn transaction_records_round_trip() {
        let records = [
            Record::Transaction(TransactionRecord {
                transaction_id: 42,
                cycle_delta: 7,
                clock_id: 1,
                metadata: 0,
                protocol_data: ProtocolData::TileLink(Channel::A(ChannelA {
                    fields: DataFields {
                        code: 0,
                        param: 0,
                        size: 6,
                        source: 7,
                        data: vec![0xde, 0xad],
                    },
                    address: 0xabcd_0000,
                    mask: vec![0xff],
                })),
                payload: vec![9, 8, 7],
            }),
            Record::TransactionDependency(TransactionDependencyRecord {
                dependency_id: 41,
                cycle_delta: 2,
                clock_id: 1,
            }),
        ];
        for record in &records {
            assert_eq!(&round_trip(record), record);
        }
    }

    #[test]
    fn identifier_rejects_bad_magic() {
        let mut reader = ByteReader::new(&b"ELF"[..]);
        let mut record = Record::empty(Descriptor::Identifier);
        assert!(record.unpack(&mut reader).is_err());
    }
}
