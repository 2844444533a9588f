//! Trace writer: header construction, record sink, chunk rotation.

use std::{
    io::{
        self,
        Write,
    },
    path::Path,
};

use stf_records::{
    io::TraceWrite,
    ClockIdRecord,
    CommentRecord,
    EndHeaderRecord,
    ForcePcRecord,
    IdentifierRecord,
    InstIemRecord,
    IsaRecord,
    ProcessIdExtRecord,
    ProtocolId,
    ProtocolIdRecord,
    Record,
    TraceInfoFeatureRecord,
    TraceInfoRecord,
    VersionRecord,
    VlenConfigRecord,
};
use stf_types::{
    Iem,
    Isa,
    TraceFeatures,
    Vlen,
};
use tracing::debug;

use crate::{
    chunk::{
        TraceSink,
        DEFAULT_CHUNK_MARKERS,
    },
    clock,
    error::{
        Result,
        StfError,
    },
};

/// Options controlling how a writer produces a trace.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Produce a chunked-compressed container instead of a plain stream.
    pub compress: bool,
    /// Marker records per chunk.
    pub chunk_markers: u64,
    /// zlib compression level (0-9).
    pub compression_level: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compress: true,
            chunk_markers: DEFAULT_CHUNK_MARKERS,
            compression_level: 6,
        }
    }
}

struct WriteStream {
    sink: TraceSink,
    vlen: Vlen,
}

impl Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl TraceWrite for WriteStream {
    fn vlen(&self) -> Vlen {
        self.vlen
    }
}

/// Writes one trace file.
///
/// Header fields are collected through the setters, written by
/// [`flush_header`](TraceWriter::flush_header), and sealed by
/// [`finalize_header`](TraceWriter::finalize_header); only then may body
/// records follow. Closing the writer flushes the last chunk and the
/// chunk index.
pub struct TraceWriter {
    stream: WriteStream,
    chunk_markers: u64,
    header_flushed: bool,
    header_finalized: bool,
    closed: bool,

    version: (u32, u32),
    comments: Vec<String>,
    trace_info: Vec<TraceInfoRecord>,
    features: TraceFeatures,
    isa: Option<Isa>,
    iem: Option<Iem>,
    initial_pc: Option<u64>,
    process_id: Option<ProcessIdExtRecord>,
    vlen: Option<Vlen>,
    protocol_id: Option<ProtocolId>,
    clocks: Vec<ClockIdRecord>,

    markers: u64,
    next_pc: u64,
}

impl TraceWriter {
    /// Creates a trace file.
    pub fn create(path: impl AsRef<Path>, options: &WriterOptions) -> Result<Self> {
        let sink = if options.compress {
            TraceSink::create_chunked(
                path.as_ref(),
                options.chunk_markers,
                options.compression_level,
            )?
        } else {
            TraceSink::create_plain(path.as_ref())?
        };
        Ok(Self {
            stream: WriteStream { sink, vlen: 0 },
            chunk_markers: options.chunk_markers,
            header_flushed: false,
            header_finalized: false,
            closed: false,
            version: (1, 0),
            comments: Vec::new(),
            trace_info: Vec::new(),
            features: TraceFeatures::empty(),
            isa: None,
            iem: None,
            initial_pc: None,
            process_id: None,
            vlen: None,
            protocol_id: None,
            clocks: Vec::new(),
            markers: 0,
            next_pc: 0,
        })
    }

    fn header_mutable(&self) -> Result<()> {
        if self.header_flushed {
            return Err(StfError::HeaderFinalized);
        }
        Ok(())
    }

    /// Sets the trace format version.
    pub fn set_version(&mut self, major: u32, minor: u32) -> Result<()> {
        self.header_mutable()?;
        self.version = (major, minor);
        Ok(())
    }

    /// Adds a header comment.
    pub fn add_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        self.header_mutable()?;
        self.comments.push(comment.into());
        Ok(())
    }

    /// Adds a trace generator info record.
    pub fn add_trace_info(&mut self, info: TraceInfoRecord) -> Result<()> {
        self.header_mutable()?;
        self.trace_info.push(info);
        Ok(())
    }

    /// Sets the trace feature bitset.
    pub fn set_features(&mut self, features: TraceFeatures) -> Result<()> {
        self.header_mutable()?;
        self.features = features;
        Ok(())
    }

    /// Sets the ISA family.
    pub fn set_isa(&mut self, isa: Isa) -> Result<()> {
        self.header_mutable()?;
        self.isa = Some(isa);
        Ok(())
    }

    /// Sets the instruction encoding mode.
    pub fn set_iem(&mut self, iem: Iem) -> Result<()> {
        self.header_mutable()?;
        self.iem = Some(iem);
        Ok(())
    }

    /// Sets the initial PC, emitted as a header FORCE_PC record.
    pub fn set_initial_pc(&mut self, pc: u64) -> Result<()> {
        self.header_mutable()?;
        self.initial_pc = Some(pc);
        Ok(())
    }

    /// Sets the traced process IDs.
    pub fn set_process_id(&mut self, record: ProcessIdExtRecord) -> Result<()> {
        self.header_mutable()?;
        self.process_id = Some(record);
        Ok(())
    }

    /// Sets the vector register width.
    pub fn set_vlen(&mut self, vlen: Vlen) -> Result<()> {
        self.header_mutable()?;
        self.vlen = Some(vlen);
        Ok(())
    }

    /// Declares the protocol of a transaction trace.
    pub fn set_protocol_id(&mut self, protocol_id: ProtocolId) -> Result<()> {
        self.header_mutable()?;
        self.protocol_id = Some(protocol_id);
        Ok(())
    }

    /// Adds a clock domain, registering it process-wide as well.
    pub fn add_clock(&mut self, clock_id: stf_records::ClockId, name: &str) -> Result<()> {
        self.header_mutable()?;
        clock::register_clock(clock_id, name)?;
        self.clocks.push(ClockIdRecord::new(clock_id, name));
        Ok(())
    }

    fn emit(&mut self, record: &Record) -> Result<()> {
        self.stream
            .write_u8(record.descriptor().encoded() as u8)?;
        record.pack(&mut self.stream)?;
        Ok(())
    }

    /// Writes the collected header records. Header setters are rejected
    /// afterwards.
    pub fn flush_header(&mut self) -> Result<()> {
        if self.header_flushed {
            return Err(StfError::HeaderFinalized);
        }
        self.header_flushed = true;

        self.emit(&Record::Identifier(IdentifierRecord))?;
        self.emit(&Record::Version(VersionRecord {
            major: self.version.0,
            minor: self.version.1,
        }))?;
        for comment in std::mem::take(&mut self.comments) {
            self.emit(&Record::Comment(CommentRecord::new(comment)))?;
        }
        if let Some(isa) = self.isa {
            self.emit(&Record::Isa(IsaRecord { isa }))?;
        }
        if let Some(iem) = self.iem {
            self.emit(&Record::InstIem(InstIemRecord { iem }))?;
        }
        for info in std::mem::take(&mut self.trace_info) {
            self.emit(&Record::TraceInfo(info))?;
        }
        if !self.features.is_empty() {
            self.emit(&Record::TraceInfoFeature(TraceInfoFeatureRecord {
                features: self.features,
            }))?;
        }
        if let Some(record) = self.process_id {
            self.emit(&Record::ProcessIdExt(record))?;
        }
        if let Some(pc) = self.initial_pc {
            self.emit(&Record::ForcePc(ForcePcRecord { pc }))?;
            self.next_pc = pc;
        }
        if let Some(vlen) = self.vlen {
            self.emit(&Record::VlenConfig(VlenConfigRecord { vlen }))?;
            self.stream.vlen = vlen;
        }
        if let Some(protocol_id) = self.protocol_id {
            self.emit(&Record::ProtocolId(ProtocolIdRecord { protocol_id }))?;
        }
        for clock in std::mem::take(&mut self.clocks) {
            self.emit(&Record::ClockId(clock))?;
        }
        Ok(())
    }

    /// Terminates the header with END_HEADER. Flushes it first if needed.
    pub fn finalize_header(&mut self) -> Result<()> {
        if self.header_finalized {
            return Err(StfError::HeaderFinalized);
        }
        if !self.header_flushed {
            self.flush_header()?;
        }
        self.emit(&Record::EndHeader(EndHeaderRecord))?;
        self.header_finalized = true;
        debug!("header finalized");
        Ok(())
    }

    /// Writes one body record.
    ///
    /// Marker records rotate the chunk when the configured marker count is
    /// reached, so chunk boundaries always fall between items.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        if !self.header_finalized {
            return Err(StfError::HeaderNotFinalized);
        }
        let desc = record.descriptor();
        if desc.is_header_only() {
            return Err(StfError::UnexpectedRecord(desc));
        }

        if desc.is_marker()
            && self.markers > 0
            && self.markers % self.chunk_markers == 0
        {
            self.stream.sink.rotate_chunk(self.markers, self.next_pc)?;
        }

        self.emit(record)?;

        match record {
            Record::InstOpcode16(_) => {
                self.next_pc = self.next_pc.wrapping_add(2);
                self.markers += 1;
            }
            Record::InstOpcode32(_) => {
                self.next_pc = self.next_pc.wrapping_add(4);
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
            _ => {}
        }
        Ok(())
    }

    /// Number of marker records written so far.
    pub fn num_markers(&self) -> u64 {
        self.markers
    }

    /// Flushes the last chunk and the chunk index, consuming the writer.
    pub fn close(mut self) -> Result<()> {
        self.close_impl()
    }

    fn close_impl(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.sink.finish()
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        let _ = self.close_impl();
    }
}

impl std::fmt::Debug for TraceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceWriter")
            .field("markers", &self.markers)
            .field("header_finalized", &self.header_finalized)
            .finish()
    }
}
