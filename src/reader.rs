//! The base record reader: header parsing, PC tracking, marker counting,
//! and the filtered record stream.

use std::{
    io::{
        self,
        Read,
    },
    path::Path,
};

use stf_records::{
    io::TraceRead,
    Descriptor,
    EncodedDescriptor,
    ProcessIdExtRecord,
    ProtocolId,
    Record,
    TraceInfoRecord,
};
use stf_types::{
    Iem,
    Isa,
    TraceFeatures,
    Vlen,
};
use tracing::debug;

use crate::{
    chunk::TraceSource,
    clock,
    error::{
        Result,
        StfError,
    },
    factory::RecordFactory,
    filter::RecordFilter,
    pool::{
        PooledRecord,
        RecordPool,
    },
};

/// Options controlling how a reader opens a trace.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Mark items outside user mode as skipped.
    pub only_user_mode: bool,
    /// Sliding window size of the buffered readers. Rounded up to a power
    /// of two.
    pub buffer_size: usize,
    /// Disable the background decompression thread.
    pub force_single_threaded: bool,
    /// Fail at open unless the trace declares this protocol.
    pub expected_protocol: Option<ProtocolId>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            only_user_mode: false,
            buffer_size: 1024,
            force_single_threaded: false,
            expected_protocol: None,
        }
    }
}

/// Header state captured when a trace is opened.
#[derive(Debug, Clone, Default)]
pub struct TraceHeader {
    /// Trace format version
    pub version: (u32, u32),
    /// Header comments, in order of appearance
    pub comments: Vec<String>,
    /// Trace generator info records
    pub trace_info: Vec<TraceInfoRecord>,
    /// Feature bitset
    pub features: TraceFeatures,
    /// ISA family, if declared
    pub isa: Option<Isa>,
    /// Instruction encoding mode, if declared
    pub iem: Option<Iem>,
    /// Initial PC from the header FORCE_PC record
    pub initial_pc: u64,
    /// Traced process IDs, if declared
    pub process_id: Option<ProcessIdExtRecord>,
    /// Vector register width, if declared
    pub vlen: Option<Vlen>,
    /// Protocol of a transaction trace, if declared
    pub protocol_id: Option<ProtocolId>,
}

impl TraceHeader {
    /// Instruction encoding mode, defaulting to RV64 for traces that never
    /// declare one.
    pub fn iem_or_default(&self) -> Iem {
        self.iem.unwrap_or(Iem::Rv64)
    }
}

/// Stream wrapper that carries the per-trace unpack state records need.
struct RecordStream {
    source: TraceSource,
    vlen: Vlen,
    protocol_id: Option<ProtocolId>,
}

impl Read for RecordStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl TraceRead for RecordStream {
    fn vlen(&self) -> Vlen {
        self.vlen
    }

    fn protocol_id(&self) -> Option<ProtocolId> {
        self.protocol_id
    }
}

/// Streams records out of one trace file.
///
/// Owns the byte source, the record pool, and the descriptor filter.
/// Tracks the PC of the instruction stream and counts marker records so
/// higher layers can seek.
pub struct RecordReader {
    stream: RecordStream,
    factory: RecordFactory,
    pool: RecordPool,
    filter: RecordFilter,
    header: TraceHeader,
    next_pc: u64,
    markers: u64,
}

impl RecordReader {
    /// Opens a trace and parses its header.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let source = TraceSource::open(path.as_ref(), options.force_single_threaded)?;
        let mut reader = Self {
            stream: RecordStream {
                source,
                vlen: 0,
                protocol_id: None,
            },
            factory: RecordFactory::new(),
            pool: RecordPool::new(),
            filter: RecordFilter::new(),
            header: TraceHeader::default(),
            next_pc: 0,
            markers: 0,
        };
        reader.parse_header()?;

        if let Some(expected) = options.expected_protocol {
            match reader.header.protocol_id {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(StfError::ProtocolMismatch { expected, actual })
                }
                None => return Err(StfError::MissingProtocolId),
            }
        }

        debug!(
            version = ?reader.header.version,
            iem = ?reader.header.iem,
            initial_pc = reader.header.initial_pc,
            features = ?reader.header.features,
            "trace opened"
        );
        Ok(reader)
    }

    /// Header state captured at open.
    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// The reader's descriptor filter.
    pub fn filter_mut(&mut self) -> &mut RecordFilter {
        &mut self.filter
    }

    /// The reader's record pool.
    pub fn pool(&self) -> &RecordPool {
        &self.pool
    }

    /// Number of marker records (opcodes or transactions) read so far.
    pub fn num_markers(&self) -> u64 {
        self.markers
    }

    /// Reads one descriptor byte. `None` is the clean end-of-trace
    /// condition; anything else cut short is an error.
    fn read_descriptor_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Applies the stream-state side effects a record carries, including
    /// PC assignment to opcode records.
    fn apply_side_effects(&mut self, record: &mut Record) {
        match record {
            Record::InstOpcode16(rec) => {
                rec.pc = self.next_pc;
                self.next_pc = rec.pc.wrapping_add(2);
                self.markers += 1;
            }
            Record::InstOpcode32(rec) => {
                rec.pc = self.next_pc;
                self.next_pc = rec.pc.wrapping_add(4);
                self.markers += 1;
            }
            Record::Transaction(_) => {
                self.markers += 1;
            }
            Record::InstPcTarget(rec) => {
                self.next_pc = rec.addr;
            }
            Record::EventPcTarget(rec) => {
                self.next_pc = rec.addr;
            }
            Record::ForcePc(rec) => {
                self.next_pc = rec.pc;
            }
            Record::VlenConfig(rec) => {
                self.stream.vlen = rec.vlen;
            }
            _ => {}
        }
    }

    /// Reads the next unfiltered record. `None` at end of trace.
    pub fn next_record(&mut self) -> Result<Option<PooledRecord>> {
        loop {
            let Some(encoded) = self.read_descriptor_byte()? else {
                return Ok(None);
            };
            let mut record =
                self.factory
                    .construct(encoded, &mut self.stream, &self.pool)?;
            self.apply_side_effects(record.record_mut());

            if self.filter.is_filtered(record.descriptor()) {
                // Dropping the handle recycles the record.
                continue;
            }
            return Ok(Some(record));
        }
    }

    /// Reads one record during header parse, where EOF is always fatal.
    fn next_header_record(&mut self) -> Result<PooledRecord> {
        let Some(encoded) = self.read_descriptor_byte()? else {
            return Err(StfError::IncompleteHeader);
        };
        let mut record = self
            .factory
            .construct(encoded, &mut self.stream, &self.pool)
            .map_err(|err| match err {
                StfError::UnexpectedEof => StfError::IncompleteHeader,
                other => other,
            })?;
        self.apply_side_effects(record.record_mut());
        Ok(record)
    }

    fn parse_header(&mut self) -> Result<()> {
        // The first byte of the logical stream must be the identifier
        // record; anything else is not an STF trace.
        match self.read_descriptor_byte()? {
            Some(byte) if byte == EncodedDescriptor::Identifier as u8 => {}
            _ => return Err(StfError::InvalidMagic),
        }
        {
            let mut identifier = Record::empty(Descriptor::Identifier);
            identifier
                .unpack(&mut self.stream)
                .map_err(|_| StfError::InvalidMagic)?;
        }

        let version = self.next_header_record()?;
        match &*version {
            Record::Version(rec) => self.header.version = (rec.major, rec.minor),
            _ => return Err(StfError::UnexpectedHeaderRecord(version.descriptor())),
        }
        drop(version);

        let mut seen_force_pc = false;
        let mut seen_features = false;
        loop {
            let record = self.next_header_record()?;
            match &*record {
                Record::EndHeader(_) => break,
                Record::Comment(rec) => self.header.comments.push(rec.comment.clone()),
                Record::TraceInfo(rec) => self.header.trace_info.push(rec.clone()),
                Record::TraceInfoFeature(rec) => {
                    // An all-zero feature bitset is a valid wire value, so
                    // presence has to be tracked separately.
                    if seen_features {
                        return Err(StfError::DuplicateHeaderRecord(
                            Descriptor::TraceInfoFeature,
                        ));
                    }
                    seen_features = true;
                    self.header.features = rec.features;
                }
                Record::Isa(rec) => {
                    Self::set_once(&mut self.header.isa, rec.isa, Descriptor::Isa)?
                }
                Record::InstIem(rec) => {
                    Self::set_once(&mut self.header.iem, rec.iem, Descriptor::InstIem)?
                }
                Record::ForcePc(rec) => {
                    if seen_force_pc {
                        return Err(StfError::DuplicateHeaderRecord(Descriptor::ForcePc));
                    }
                    seen_force_pc = true;
                    self.header.initial_pc = rec.pc;
                }
                Record::VlenConfig(rec) => {
                    Self::set_once(
                        &mut self.header.vlen,
                        rec.vlen,
                        Descriptor::VlenConfig,
                    )?;
                    // The stream itself was already updated by the side
                    // effect so vector operands can be unpacked.
                }
                Record::ProcessIdExt(rec) => Self::set_once(
                    &mut self.header.process_id,
                    *rec,
                    Descriptor::ProcessIdExt,
                )?,
                Record::ProtocolId(rec) => {
                    Self::set_once(
                        &mut self.header.protocol_id,
                        rec.protocol_id,
                        Descriptor::ProtocolId,
                    )?;
                    self.stream.protocol_id = Some(rec.protocol_id);
                }
                Record::ClockId(rec) => {
                    clock::register_clock(rec.clock_id, &rec.name)?;
                }
                Record::Identifier(_) | Record::Version(_) => {
                    return Err(StfError::DuplicateHeaderRecord(record.descriptor()))
                }
                _ => return Err(StfError::UnexpectedHeaderRecord(record.descriptor())),
            }
        }

        self.next_pc = self.header.initial_pc;
        Ok(())
    }

    fn set_once<T: Copy>(slot: &mut Option<T>, value: T, desc: Descriptor) -> Result<()> {
        if slot.is_some() {
            return Err(StfError::DuplicateHeaderRecord(desc));
        }
        *slot = Some(value);
        Ok(())
    }

    /// Advances until the marker counter has increased by `n`.
    ///
    /// Uses the chunk index to skip whole chunks when the container allows
    /// it (re-seeding the marker count and PC from the chunk header) and
    /// reads and discards the rest of the way.
    pub fn seek_markers(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let target = self.markers + n;

        if let Some(start) = self
            .stream
            .source
            .chunk_seek(target, self.markers)?
        {
            debug!(
                from = self.markers,
                to = start.start_marker,
                "fast-forwarded by chunk"
            );
            self.markers = start.start_marker;
            self.next_pc = start.start_pc;
        }

        while self.markers < target {
            if self.next_record()?.is_none() {
                return Err(StfError::SeekPastEnd);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("markers", &self.markers)
            .field("next_pc", &self.next_pc)
            .field("header", &self.header)
            .finish()
    }
}
