//! Stream traits used by record pack/unpack.
//!
//! All multi-byte values are little-endian with no padding. Byte vectors
//! are serialized with an explicit length prefix whose width is a
//! per-field constant; strings use a u32 prefix. The traits are
//! object-safe so the record factory can dispatch over `&mut dyn
//! TraceRead`.

use std::io;

use stf_types::Vlen;

use crate::protocols::ProtocolId;

/// Produces an `UnexpectedEof` error for a short read.
pub fn eof() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "the stream ended in the middle of a record",
    )
}

/// Source of record bytes.
///
/// Besides the primitive accessors, a `TraceRead` carries the pieces of
/// stream state that records need while unpacking: the configured vector
/// width (for vector operands) and the trace protocol (for transaction
/// payloads).
pub trait TraceRead: io::Read {
    /// Vector register width configured by the header, or 0 when the trace
    /// carries no vector operands.
    fn vlen(&self) -> Vlen;

    /// Protocol declared by the header of a transaction trace.
    fn protocol_id(&self) -> Option<ProtocolId>;

    /// Reads one byte.
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian u16.
    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian u32.
    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian u64.
    fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads `len` raw bytes into `out`, replacing its contents.
    fn read_raw_bytes(&mut self, len: usize, out: &mut Vec<u8>) -> io::Result<()> {
        out.clear();
        out.resize(len, 0);
        self.read_exact(out)
    }

    /// Reads a u8-prefixed byte vector.
    fn read_bytes_u8(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let len = self.read_u8()? as usize;
        self.read_raw_bytes(len, out)
    }

    /// Reads a u16-prefixed byte vector.
    fn read_bytes_u16(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let len = self.read_u16()? as usize;
        self.read_raw_bytes(len, out)
    }

    /// Reads a u32-prefixed byte vector.
    fn read_bytes_u32(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let len = self.read_u32()? as usize;
        self.read_raw_bytes(len, out)
    }

    /// Reads a u64-prefixed byte vector.
    fn read_bytes_u64(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let len = usize::try_from(self.read_u64()?)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "vector too large"))?;
        self.read_raw_bytes(len, out)
    }

    /// Reads `count` little-endian u64 words into `out`, replacing its
    /// contents.
    fn read_words(&mut self, count: usize, out: &mut Vec<u64>) -> io::Result<()> {
        out.clear();
        out.reserve(count);
        for _ in 0..count {
            out.push(self.read_u64()?);
        }
        Ok(())
    }

    /// Reads a u8-prefixed vector of u64 words.
    fn read_words_u8(&mut self, out: &mut Vec<u64>) -> io::Result<()> {
        let count = self.read_u8()? as usize;
        self.read_words(count, out)
    }

    /// Reads a u32-prefixed UTF-8 string.
    fn read_string(&mut self, out: &mut String) -> io::Result<()> {
        let mut bytes = core::mem::take(out).into_bytes();
        self.read_bytes_u32(&mut bytes)?;
        *out = String::from_utf8(bytes).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "string is not valid UTF-8")
        })?;
        Ok(())
    }
}

/// Sink for record bytes. Mirrors [`TraceRead`].
pub trait TraceWrite: io::Write {
    /// Vector register width configured on the writer, or 0.
    fn vlen(&self) -> Vlen;

    /// Writes one byte.
    fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write_all(&[value])
    }

    /// Writes a little-endian u16.
    fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian u32.
    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian u64.
    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a u8-prefixed byte vector.
    fn write_bytes_u8(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = u8::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "vector too large"))?;
        self.write_u8(len)?;
        self.write_all(bytes)
    }

    /// Writes a u16-prefixed byte vector.
    fn write_bytes_u16(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "vector too large"))?;
        self.write_u16(len)?;
        self.write_all(bytes)
    }

    /// Writes a u32-prefixed byte vector.
    fn write_bytes_u32(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "vector too large"))?;
        self.write_u32(len)?;
        self.write_all(bytes)
    }

    /// Writes a u64-prefixed byte vector.
    fn write_bytes_u64(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_u64(bytes.len() as u64)?;
        self.write_all(bytes)
    }

    /// Writes a u8-prefixed vector of u64 words.
    fn write_words_u8(&mut self, words: &[u64]) -> io::Result<()> {
        let count = u8::try_from(words.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "vector too large"))?;
        self.write_u8(count)?;
        for word in words {
            self.write_u64(*word)?;
        }
        Ok(())
    }

    /// Writes a u32-prefixed UTF-8 string.
    fn write_string(&mut self, value: &str) -> io::Result<()> {
        self.write_bytes_u32(value.as_bytes())
    }
}

/// [`TraceRead`] over any [`io::Read`].
///
/// Wrapping a `&[u8]` slice gives the zero-copy view used to unpack
/// records straight out of a decompressed chunk buffer.
#[derive(Debug)]
pub struct ByteReader<R> {
    inner: R,
    vlen: Vlen,
    protocol_id: Option<ProtocolId>,
}

impl<R: io::Read> ByteReader<R> {
    /// Wraps `inner` with no vector width and no protocol.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            vlen: 0,
            protocol_id: None,
        }
    }

    /// Sets the vector register width reported to records.
    pub fn set_vlen(&mut self, vlen: Vlen) {
        self.vlen = vlen;
    }

    /// Sets the protocol reported to transaction records.
    pub fn set_protocol_id(&mut self, protocol_id: ProtocolId) {
        self.protocol_id = Some(protocol_id);
    }

    /// Consumes the wrapper and returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read> io::Read for ByteReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::Read> TraceRead for ByteReader<R> {
    fn vlen(&self) -> Vlen {
        self.vlen
    }

    fn protocol_id(&self) -> Option<ProtocolId> {
        self.protocol_id
    }
}

/// [`TraceWrite`] over any [`io::Write`].
#[derive(Debug)]
pub struct ByteWriter<W> {
    inner: W,
    vlen: Vlen,
}

impl<W: io::Write> ByteWriter<W> {
    /// Wraps `inner` with no vector width.
    pub fn new(inner: W) -> Self {
        Self { inner, vlen: 0 }
    }

    /// Sets the vector register width reported to records.
    pub fn set_vlen(&mut self, vlen: Vlen) {
        self.vlen = vlen;
    }

    /// Consumes the wrapper and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> io::Write for ByteWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: io::Write> TraceWrite for ByteWriter<W> {
    fn vlen(&self) -> Vlen {
        self.vlen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut writer = ByteWriter::new(Vec::new());
        writer.write_u8(0xab).unwrap();
        writer.write_u16(0x1234).unwrap();
        writer.write_u32(0xdead_beef).unwrap();
        writer.write_u64(0x0123_4567_89ab_cdef).unwrap();
        let bytes = writer.into_inner();

        let mut reader = ByteReader::new(bytes.as_slice());
        assert_eq!(reader.read_u8().unwrap(), 0xab);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_u64().unwrap(), 0x0123_4567_89ab_cdef);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn prefixed_vectors() {
        let mut writer = ByteWriter::new(Vec::new());
        writer.write_bytes_u16(&[0xde, 0xad]).unwrap();
        writer.write_words_u8(&[1, 2, 3]).unwrap();
        writer.write_string("hello").unwrap();
        let bytes = writer.into_inner();

        let mut reader = ByteReader::new(bytes.as_slice());
        let mut data = Vec::new();
        reader.read_bytes_u16(&mut data).unwrap();
        assert_eq!(data, vec![0xde, 0xad]);
        let mut words = Vec::new();
        reader.read_words_u8(&mut words).unwrap();
        assert_eq!(words, vec![1, 2, 3]);
        let mut text = String::new();
        reader.read_string(&mut text).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn truncated_vector_is_an_error() {
        let mut writer = ByteWriter::new(Vec::new());
        writer.write_bytes_u16(&[1, 2, 3, 4]).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(4);

        let mut reader = ByteReader::new(bytes.as_slice());
        let mut data = Vec::new();
        let err = reader.read_bytes_u16(&mut data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
