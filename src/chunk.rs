//! The chunked-compressed trace container.
//!
//! A compressed trace wraps the logical record stream in fixed-marker-count
//! chunks, each deflated independently:
//!
//! ```text
//! magic "STFC" | index_offset u64 | chunk_markers u64
//! per chunk: compressed_len u64 | uncompressed_len u64 |
//!            start_marker u64 | start_pc u64 | zlib payload
//! footer: entry_count u64, then per chunk:
//!         file_offset u64 | start_marker u64 | start_pc u64 |
//!         uncompressed_len u64
//! ```
//!
//! `index_offset` is zero while the trace is being written and patched at
//! close; a trace cut short before the footer is still readable
//! sequentially. Chunk boundaries fall on marker boundaries, so
//! `seek(n_markers)` can jump to the chunk containing the n-th marker and
//! re-seed the reader's marker count and PC from the chunk header.
//!
//! Plain traces are the bare record stream; the reader sniffs the magic.

use std::{
    fs::File,
    io::{
        self,
        BufReader,
        BufWriter,
        Read,
        Seek,
        SeekFrom,
        Write,
    },
    path::Path,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread,
};

use crossbeam_channel::{
    bounded,
    Receiver,
};
use flate2::{
    read::ZlibDecoder,
    write::ZlibEncoder,
    Compression,
};
use tracing::debug;

use crate::error::Result;

/// Magic of the chunked container.
pub const CHUNK_MAGIC: [u8; 4] = *b"STFC";

/// Default number of marker records per chunk.
pub const DEFAULT_CHUNK_MARKERS: u64 = 10_000;

/// Size of the container header preceding the first chunk.
const CONTAINER_HEADER_LEN: u64 = 4 + 8 + 8;

/// Size of a per-chunk frame header.
const FRAME_HEADER_LEN: u64 = 4 * 8;

/// Depth of the decompressed-chunk ring between the background inflater
/// and the reader.
const CHUNK_RING_CAPACITY: usize = 4;

/// One entry of the chunk index footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIndexEntry {
    /// Offset of the chunk's frame header in the file
    pub file_offset: u64,
    /// Marker count at the start of the chunk
    pub start_marker: u64,
    /// Stream PC at the start of the chunk
    pub start_pc: u64,
    /// Decompressed chunk size
    pub uncompressed_len: u64,
}

/// Stream state re-seeded after a chunk seek.
#[derive(Debug, Clone, Copy)]
pub struct ChunkStart {
    /// Marker count at the start of the chunk
    pub start_marker: u64,
    /// Stream PC at the start of the chunk
    pub start_pc: u64,
}

fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn inflate(compressed: &[u8], uncompressed_len: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_len);
    ZlibDecoder::new(compressed).read_to_end(&mut out)?;
    if out.len() != uncompressed_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "chunk decompressed to an unexpected size",
        ));
    }
    Ok(out)
}

/// Reads one chunk frame at the current file position. Returns `None` at
/// the end of the chunk sequence.
fn read_frame(file: &mut File, end_of_chunks: Option<u64>) -> io::Result<Option<Vec<u8>>> {
    if let Some(end) = end_of_chunks {
        if file.stream_position()? >= end {
            return Ok(None);
        }
    }

    let compressed_len = match read_u64(file) {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    };
    let uncompressed_len = read_u64(file)?;
    let _start_marker = read_u64(file)?;
    let _start_pc = read_u64(file)?;

    let mut compressed = vec![0u8; compressed_len as usize];
    file.read_exact(&mut compressed)?;
    inflate(&compressed, uncompressed_len as usize).map(Some)
}

enum ChunkFeed {
    /// Inflate chunks on demand on the reader's thread.
    Sync {
        file: File,
        end_of_chunks: Option<u64>,
    },
    /// A background thread inflates ahead into a bounded ring.
    Background {
        ring: Receiver<io::Result<Vec<u8>>>,
        stop: Arc<AtomicBool>,
        worker: Option<thread::JoinHandle<()>>,
    },
}

/// Decompressing reader over a chunked container.
pub struct ChunkedSource {
    feed: ChunkFeed,
    index: Option<Vec<ChunkIndexEntry>>,
    chunk_markers: u64,
    current: Vec<u8>,
    pos: usize,
}

impl ChunkedSource {
    fn open(mut file: File, force_single_threaded: bool) -> Result<Self> {
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        debug_assert_eq!(magic, CHUNK_MAGIC);

        let index_offset = read_u64(&mut file)?;
        let chunk_markers = read_u64(&mut file)?;

        let index = if index_offset != 0 {
            let entries = Self::load_index(&mut file, index_offset)?;
            file.seek(SeekFrom::Start(CONTAINER_HEADER_LEN))?;
            Some(entries)
        } else {
            None
        };
        let end_of_chunks = (index_offset != 0).then_some(index_offset);

        let feed = if force_single_threaded {
            ChunkFeed::Sync {
                file,
                end_of_chunks,
            }
        } else {
            Self::spawn_inflater(file, end_of_chunks)
        };

        Ok(Self {
            feed,
            index,
            chunk_markers,
            current: Vec::new(),
            pos: 0,
        })
    }

    fn load_index(file: &mut File, index_offset: u64) -> Result<Vec<ChunkIndexEntry>> {
        file.seek(SeekFrom::Start(index_offset))?;
        let count = read_u64(file)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(ChunkIndexEntry {
                file_offset: read_u64(file)?,
                start_marker: read_u64(file)?,
                start_pc: read_u64(file)?,
                uncompressed_len: read_u64(file)?,
            });
        }
        Ok(entries)
    }

    fn spawn_inflater(mut file: File, end_of_chunks: Option<u64>) -> ChunkFeed {
        let (tx, ring) = bounded(CHUNK_RING_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let worker = thread::spawn(move || {
            debug!("chunk inflater started");
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                match read_frame(&mut file, end_of_chunks) {
                    Ok(Some(chunk)) => {
                        // Chunks are enqueued in file order; the bounded
                        // ring blocks us when the reader falls behind.
                        if tx.send(Ok(chunk)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            }
            debug!("chunk inflater finished");
        });

        ChunkFeed::Background {
            ring,
            stop,
            worker: Some(worker),
        }
    }

    /// Pulls the next decompressed chunk into `self.current`. Returns
    /// false at end of stream.
    fn next_chunk(&mut self) -> io::Result<bool> {
        let chunk = match &mut self.feed {
            ChunkFeed::Sync {
                file,
                end_of_chunks,
            } => read_frame(file, *end_of_chunks)?,
            ChunkFeed::Background { ring, .. } => match ring.recv() {
                Ok(chunk) => Some(chunk?),
                Err(_) => None,
            },
        };

        match chunk {
            Some(chunk) => {
                self.current = chunk;
                self.pos = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Jumps to the chunk containing the given marker, if the index allows
    /// it. Only chunks strictly ahead of `min_marker` are used, so the
    /// stream never rewinds behind records the reader already consumed.
    /// Only available in single-threaded mode; the caller falls back to a
    /// linear scan otherwise.
    fn chunk_seek(
        &mut self,
        target_marker: u64,
        min_marker: u64,
    ) -> Result<Option<ChunkStart>> {
        let ChunkFeed::Sync { file, .. } = &mut self.feed else {
            return Ok(None);
        };
        let Some(index) = &self.index else {
            return Ok(None);
        };

        let entry = match index
            .iter()
            .rev()
            .find(|entry| entry.start_marker <= target_marker)
        {
            Some(entry) if entry.start_marker > min_marker => *entry,
            _ => return Ok(None),
        };

        file.seek(SeekFrom::Start(entry.file_offset))?;
        self.current.clear();
        self.pos = 0;
        debug!(
            start_marker = entry.start_marker,
            "seeking via chunk index"
        );
        Ok(Some(ChunkStart {
            start_marker: entry.start_marker,
            start_pc: entry.start_pc,
        }))
    }

    /// Markers per chunk, as recorded in the container header.
    pub fn chunk_markers(&self) -> u64 {
        self.chunk_markers
    }
}

impl Read for ChunkedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.current.len() {
            if !self.next_chunk()? {
                return Ok(0);
            }
        }
        let available = &self.current[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for ChunkedSource {
    fn drop(&mut self) {
        if let ChunkFeed::Background {
            ring,
            stop,
            worker,
        } = &mut self.feed
        {
            stop.store(true, Ordering::Relaxed);
            // Unblock a sender stuck on the full ring.
            while ring.try_recv().is_ok() {}
            if let Some(worker) = worker.take() {
                let _ = worker.join();
            }
        }
    }
}

/// Byte source for a trace: plain record stream or chunked container.
pub enum TraceSource {
    /// An uncompressed record stream
    Plain(BufReader<File>),
    /// A chunked-compressed container
    Chunked(ChunkedSource),
}

impl TraceSource {
    /// Opens a trace file, sniffing the container magic.
    pub fn open(path: &Path, force_single_threaded: bool) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 4];
        let is_chunked = match file.read_exact(&mut magic) {
            Ok(()) => magic == CHUNK_MAGIC,
            // Tiny files cannot be chunked; let the record layer report
            // the real problem.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => false,
            Err(err) => return Err(err.into()),
        };
        file.seek(SeekFrom::Start(0))?;

        if is_chunked {
            Ok(Self::Chunked(ChunkedSource::open(
                file,
                force_single_threaded,
            )?))
        } else {
            Ok(Self::Plain(BufReader::new(file)))
        }
    }

    /// Jumps to the chunk containing `target_marker` when the container
    /// supports it and the chunk lies strictly ahead of `min_marker`.
    pub fn chunk_seek(
        &mut self,
        target_marker: u64,
        min_marker: u64,
    ) -> Result<Option<ChunkStart>> {
        match self {
            Self::Plain(_) => Ok(None),
            Self::Chunked(source) => source.chunk_seek(target_marker, min_marker),
        }
    }
}

impl Read for TraceSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(reader) => reader.read(buf),
            Self::Chunked(source) => source.read(buf),
        }
    }
}

/// Compressing writer side of the container.
pub struct ChunkedSink {
    file: File,
    chunk: Vec<u8>,
    entries: Vec<ChunkIndexEntry>,
    level: Compression,
    current_start_marker: u64,
    current_start_pc: u64,
    next_offset: u64,
}

impl ChunkedSink {
    fn create(mut file: File, chunk_markers: u64, level: Compression) -> Result<Self> {
        file.write_all(&CHUNK_MAGIC)?;
        file.write_all(&0u64.to_le_bytes())?; // index offset, patched at close
        file.write_all(&chunk_markers.to_le_bytes())?;
        Ok(Self {
            file,
            chunk: Vec::new(),
            entries: Vec::new(),
            level,
            current_start_marker: 0,
            current_start_pc: 0,
            next_offset: CONTAINER_HEADER_LEN,
        })
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(&self.chunk)?;
        let compressed = encoder.finish()?;

        self.file.write_all(&(compressed.len() as u64).to_le_bytes())?;
        self.file.write_all(&(self.chunk.len() as u64).to_le_bytes())?;
        self.file.write_all(&self.current_start_marker.to_le_bytes())?;
        self.file.write_all(&self.current_start_pc.to_le_bytes())?;
        self.file.write_all(&compressed)?;

        self.entries.push(ChunkIndexEntry {
            file_offset: self.next_offset,
            start_marker: self.current_start_marker,
            start_pc: self.current_start_pc,
            uncompressed_len: self.chunk.len() as u64,
        });
        self.next_offset += FRAME_HEADER_LEN + compressed.len() as u64;
        self.chunk.clear();
        Ok(())
    }

    /// Closes the current chunk and opens the next one, which starts at
    /// the given marker count and PC.
    fn rotate(&mut self, start_marker: u64, start_pc: u64) -> Result<()> {
        self.flush_chunk()?;
        self.current_start_marker = start_marker;
        self.current_start_pc = start_pc;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush_chunk()?;

        let index_offset = self.next_offset;
        self.file.write_all(&(self.entries.len() as u64).to_le_bytes())?;
        for entry in &self.entries {
            self.file.write_all(&entry.file_offset.to_le_bytes())?;
            self.file.write_all(&entry.start_marker.to_le_bytes())?;
            self.file.write_all(&entry.start_pc.to_le_bytes())?;
            self.file.write_all(&entry.uncompressed_len.to_le_bytes())?;
        }

        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&index_offset.to_le_bytes())?;
        self.file.flush()?;
        debug!(chunks = self.entries.len(), "chunk index written");
        Ok(())
    }
}

impl Write for ChunkedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.chunk.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Byte sink for a trace: plain record stream or chunked container.
pub enum TraceSink {
    /// An uncompressed record stream
    Plain(BufWriter<File>),
    /// A chunked-compressed container
    Chunked(ChunkedSink),
}

impl TraceSink {
    /// Creates a plain (uncompressed) trace file.
    pub fn create_plain(path: &Path) -> Result<Self> {
        Ok(Self::Plain(BufWriter::new(File::create(path)?)))
    }

    /// Creates a chunked-compressed trace file.
    pub fn create_chunked(
        path: &Path,
        chunk_markers: u64,
        compression_level: u32,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::Chunked(ChunkedSink::create(
            file,
            chunk_markers,
            Compression::new(compression_level),
        )?))
    }

    /// Rotates to a new chunk starting at the given marker count and PC.
    /// No-op for plain traces.
    pub fn rotate_chunk(&mut self, start_marker: u64, start_pc: u64) -> Result<()> {
        match self {
            Self::Plain(_) => Ok(()),
            Self::Chunked(sink) => sink.rotate(start_marker, start_pc),
        }
    }

    /// Flushes everything and writes the chunk index.
    pub fn finish(&mut self) -> Result<()> {
        match self {
            Self::Plain(writer) => {
                writer.flush()?;
                Ok(())
            }
            Self::Chunked(sink) => sink.finish(),
        }
    }
}

impl Write for TraceSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Chunked(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Chunked(sink) => sink.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_chunked(path: &Path, chunks: &[&[u8]]) {
        let mut sink = match TraceSink::create_chunked(path, 4, 6).unwrap() {
            TraceSink::Chunked(sink) => sink,
            _ => unreachable!(),
        };
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                sink.rotate(i as u64 * 4, 0x1000 * i as u64).unwrap();
            }
            sink.write_all(chunk).unwrap();
        }
        sink.finish().unwrap();
    }

    #[test]
    fn chunked_round_trip_single_threaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.zstf");
        write_chunked(&path, &[b"hello ", b"chunked ", b"world"]);

        let mut source = TraceSource::open(&path, true).unwrap();
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello chunked world");
    }

    #[test]
    fn chunked_round_trip_background() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.zstf");
        write_chunked(&path, &[b"alpha", b"beta", b"gamma", b"delta", b"epsilon"]);

        let mut source = TraceSource::open(&path, false).unwrap();
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"alphabetagammadeltaepsilon");
    }

    #[test]
    fn chunk_seek_lands_on_marker_boundary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.zstf");
        write_chunked(&path, &[b"chunk0", b"chunk1", b"chunk2"]);

        let mut source = TraceSource::open(&path, true).unwrap();
        let start = source.chunk_seek(9, 0).unwrap().unwrap();
        assert_eq!(start.start_marker, 8);
        assert_eq!(start.start_pc, 0x2000);

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"chunk2");

        // A target already behind the reader must not rewind the stream.
        let mut source = TraceSource::open(&path, true).unwrap();
        assert!(source.chunk_seek(9, 8).unwrap().is_none());
    }

    #[test]
    fn plain_files_pass_through() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.stf");
        std::fs::write(&path, b"raw records").unwrap();

        let mut source = TraceSource::open(&path, true).unwrap();
        assert!(source.chunk_seek(10, 0).unwrap().is_none());
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"raw records");
    }

    #[test]
    fn background_source_shuts_down_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.zstf");
        let big: Vec<u8> = (0..64 * 1024).map(|i| i as u8).collect();
        write_chunked(&path, &[&big, &big, &big, &big, &big, &big, &big, &big]);

        // Drop without draining; the inflater must not deadlock on the
        // full ring.
        let mut source = TraceSource::open(&path, false).unwrap();
        let mut first = [0u8; 16];
        source.read_exact(&mut first).unwrap();
        drop(source);
    }
}
