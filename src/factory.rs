//! Descriptor-indexed record construction.
//!
//! The factory is a dense table of constructor functions, one per
//! descriptor. Construction first asks the pool for a recycled record of
//! the same kind and re-unpacks it in place; only on a cache miss does it
//! build a fresh record through the table.

use stf_records::{
    io::TraceRead,
    Descriptor,
    EncodedDescriptor,
    Record,
};

use crate::{
    error::{
        Result,
        StfError,
    },
    pool::{
        PooledRecord,
        RecordPool,
    },
};

type Constructor = fn(&mut dyn TraceRead) -> std::io::Result<Record>;

fn construct_new(desc: Descriptor) -> Constructor {
    // One monomorphic constructor per kind keeps the table a plain array
    // of function pointers.
    fn make(desc: Descriptor, reader: &mut dyn TraceRead) -> std::io::Result<Record> {
        let mut record = Record::empty(desc);
        record.unpack(reader)?;
        Ok(record)
    }

    macro_rules! constructors {
        ($($variant:ident),+ $(,)?) => {{
            $(
                #[allow(non_snake_case)]
                fn $variant(reader: &mut dyn TraceRead) -> std::io::Result<Record> {
                    make(Descriptor::$variant, reader)
                }
            )+
            match desc {
                $(Descriptor::$variant => $variant as Constructor,)+
            }
        }};
    }

    constructors!(
        Identifier,
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
    )
}

/// The constructor table, indexed by dense descriptor.
pub struct RecordFactory {
    callbacks: [Option<Constructor>; Descriptor::COUNT],
}

impl Default for RecordFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordFactory {
    /// Builds the table with every known record kind registered.
    pub fn new() -> Self {
        let mut callbacks = [None; Descriptor::COUNT];
        use strum::IntoEnumIterator;
        for desc in Descriptor::iter() {
            callbacks[desc.index()] = Some(construct_new(desc));
        }
        Self { callbacks }
    }

    /// Constructs the record for an encoded descriptor byte, pulling a
    /// recycled instance from `pool` when one is available.
    pub fn construct(
        &self,
        encoded: u8,
        reader: &mut dyn TraceRead,
        pool: &RecordPool,
    ) -> Result<PooledRecord> {
        let desc = EncodedDescriptor::try_from(encoded)
            .map_err(|_| StfError::InvalidDescriptor(encoded))?
            .internal();

        if let Some(mut record) = pool.take(desc) {
            record
                .unpack(reader)
                .map_err(StfError::from_record_io)?;
            return Ok(pool.wrap(record));
        }

        let callback = self.callbacks[desc.index()]
            .ok_or(StfError::UnregisteredDescriptor(desc))?;
        let record = callback(reader).map_err(StfError::from_record_io)?;
        Ok(pool.wrap(record))
    }
}

impl std::fmt::Debug for RecordFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self.callbacks.iter().filter(|cb| cb.is_some()).count();
        write!(f, "RecordFactory {{ registered: {registered} }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stf_records::{
        io::{
            ByteReader,
            ByteWriter,
            TraceWrite,
        },
        ForcePcRecord,
    };

    #[test]
    fn constructs_by_encoded_descriptor() {
        let record = Record::ForcePc(ForcePcRecord { pc: 0x1000 });
        let mut writer = ByteWriter::new(Vec::new());
        record.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let factory = RecordFactory::new();
        let pool = RecordPool::new();
        let mut reader = ByteReader::new(bytes.as_slice());
        let built = factory
            .construct(EncodedDescriptor::ForcePc as u8, &mut reader, &pool)
            .unwrap();
        assert_eq!(*built, record);
    }

    #[test]
    fn invalid_descriptor_is_rejected() {
        let factory = RecordFactory::new();
        let pool = RecordPool::new();
        let mut reader = ByteReader::new(&[][..]);
        assert!(matches!(
            factory.construct(0x2a, &mut reader, &pool),
            Err(StfError::InvalidDescriptor(0x2a))
        ));
    }

    #[test]
    fn recycled_records_are_reused() {
        let factory = RecordFactory::new();
        let pool = RecordPool::new();

        let mut writer = ByteWriter::new(Vec::new());
        writer.write_u64(0x1000).unwrap();
        writer.write_u64(0x2000).unwrap();
        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(bytes.as_slice());

        let first = factory
            .construct(EncodedDescriptor::ForcePc as u8, &mut reader, &pool)
            .unwrap();
        drop(first);
        assert_eq!(pool.cached(), 1);

        let second = factory
            .construct(EncodedDescriptor::ForcePc as u8, &mut reader, &pool)
            .unwrap();
        // The cached instance was consumed and re-unpacked.
        assert_eq!(pool.cached(), 0);
        match &*second {
            Record::ForcePc(rec) => assert_eq!(rec.pc, 0x2000),
            other => panic!("wrong record kind: {other:?}"),
        }
        let (taken, ..) = pool.stats();
        assert_eq!(taken, 1);
    }
}
