//! TileLink channel payloads.
//!
//! The five channel kinds share a common set of data fields; A and B add
//! an address and a byte mask, C adds only an address, D adds a sink, and
//! E is a bare sink. Pack order is: data fields, then address, then mask;
//! D packs data fields then sink; E packs the sink alone.

use core::fmt;
use std::io;

use crate::io::{
    TraceRead,
    TraceWrite,
};

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// TileLink channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ChannelType {
    /// Request channel A
    A = 0,
    /// Request channel B
    B = 1,
    /// Response channel C
    C = 2,
    /// Response channel D
    D = 3,
    /// Acknowledge channel E
    E = 4,
}

impl ChannelType {
    /// Converts a wire value into a `ChannelType`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            3 => Some(Self::D),
            4 => Some(Self::E),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "CHANNEL_A"),
            Self::B => write!(f, "CHANNEL_B"),
            Self::C => write!(f, "CHANNEL_C"),
            Self::D => write!(f, "CHANNEL_D"),
            Self::E => write!(f, "CHANNEL_E"),
        }
    }
}

/// Fields shared by the data-carrying channels (A, B, C, D).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataFields {
    /// Message opcode
    pub code: u8,
    /// Message parameter
    pub param: u8,
    /// log2 of the transfer size
    pub size: u8,
    /// Source agent ID
    pub source: u64,
    /// Transfer data bytes
    pub data: Vec<u8>,
}

impl DataFields {
    fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.code)?;
        writer.write_u8(self.param)?;
        writer.write_u8(self.size)?;
        writer.write_u64(self.source)?;
        writer.write_bytes_u16(&self.data)
    }

    fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.code = reader.read_u8()?;
        self.param = reader.read_u8()?;
        self.size = reader.read_u8()?;
        self.source = reader.read_u64()?;
        reader.read_bytes_u16(&mut self.data)
    }
}

impl fmt::Display for DataFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code {:#x} param {:#x} size {} source {:#x} data {:02x?}",
            self.code, self.param, self.size, self.source, self.data
        )
    }
}

/// Channel A: request with address and mask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelA {
    /// Shared data fields
    pub fields: DataFields,
    /// Target address
    pub address: u64,
    /// Byte lane mask
    pub mask: Vec<u8>,
}

/// Channel B: request with address and mask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelB {
    /// Shared data fields
    pub fields: DataFields,
    /// Target address
    pub address: u64,
    /// Byte lane mask
    pub mask: Vec<u8>,
}

/// Channel C: response with address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelC {
    /// Shared data fields
    pub fields: DataFields,
    /// Target address
    pub address: u64,
}

/// Channel D: response with sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelD {
    /// Shared data fields
    pub fields: DataFields,
    /// Sink agent ID
    pub sink: u64,
}

/// Channel E: bare acknowledge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelE {
    /// Sink agent ID
    pub sink: u64,
}

/// A TileLink channel message, tagged by [`ChannelType`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// Channel A message
    A(ChannelA),
    /// Channel B message
    B(ChannelB),
    /// Channel C message
    C(ChannelC),
    /// Channel D message
    D(ChannelD),
    /// Channel E message
    E(ChannelE),
}

impl Default for Channel {
    fn default() -> Self {
        Self::E(ChannelE::default())
    }
}

impl Channel {
    /// The kind of this channel message.
    pub const fn channel_type(&self) -> ChannelType {
        match self {
            Self::A(_) => ChannelType::A,
            Self::B(_) => ChannelType::B,
            Self::C(_) => ChannelType::C,
            Self::D(_) => ChannelType::D,
            Self::E(_) => ChannelType::E,
        }
    }

    /// An empty message of the given kind, ready to be unpacked into.
    pub fn empty(channel_type: ChannelType) -> Self {
        match channel_type {
            ChannelType::A => Self::A(ChannelA::default()),
            ChannelType::B => Self::B(ChannelB::default()),
            ChannelType::C => Self::C(ChannelC::default()),
            ChannelType::D => Self::D(ChannelD::default()),
            ChannelType::E => Self::E(ChannelE::default()),
        }
    }

    /// Serializes the channel type byte followed by the channel fields.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u8(self.channel_type() as u8)?;
        match self {
            Self::A(ch) => {
                ch.fields.pack(writer)?;
                writer.write_u64(ch.address)?;
                writer.write_bytes_u16(&ch.mask)
            }
            Self::B(ch) => {
                ch.fields.pack(writer)?;
                writer.write_u64(ch.address)?;
                writer.write_bytes_u16(&ch.mask)
            }
            Self::C(ch) => {
                ch.fields.pack(writer)?;
                writer.write_u64(ch.address)
            }
            Self::D(ch) => {
                ch.fields.pack(writer)?;
                writer.write_u64(ch.sink)
            }
            Self::E(ch) => writer.write_u64(ch.sink),
        }
    }

    /// Deserializes a channel message, reusing the existing variant's
    /// buffers when the kind matches.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        let channel_type = ChannelType::from_u8(reader.read_u8()?)
            .ok_or_else(|| invalid("invalid TileLink channel type"))?;
        if self.channel_type() != channel_type {
            *self = Self::empty(channel_type);
        }
        match self {
            Self::A(ch) => {
                ch.fields.unpack(reader)?;
                ch.address = reader.read_u64()?;
                reader.read_bytes_u16(&mut ch.mask)
            }
            Self::B(ch) => {
                ch.fields.unpack(reader)?;
                ch.address = reader.read_u64()?;
                reader.read_bytes_u16(&mut ch.mask)
            }
            Self::C(ch) => {
                ch.fields.unpack(reader)?;
                ch.address = reader.read_u64()?;
                Ok(())
            }
            Self::D(ch) => {
                ch.fields.unpack(reader)?;
                ch.sink = reader.read_u64()?;
                Ok(())
            }
            Self::E(ch) => {
                ch.sink = reader.read_u64()?;
                Ok(())
            }
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.channel_type())?;
        match self {
            Self::A(ch) => write!(
                f,
                "{} address {:#x} mask {:02x?}",
                ch.fields, ch.address, ch.mask
            ),
            Self::B(ch) => write!(
                f,
                "{} address {:#x} mask {:02x?}",
                ch.fields, ch.address, ch.mask
            ),
            Self::C(ch) => write!(f, "{} address {:#x}", ch.fields, ch.address),
            Self::D(ch) => write!(f, "{} sink {:#x}", ch.fields, ch.sink),
            Self::E(ch) => write!(f, "sink {:#x}", ch.sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{
        ByteReader,
        ByteWriter,
    };
    use crate::protocols::ProtocolId;

    fn round_trip(channel: Channel) -> Channel {
        let mut writer = ByteWriter::new(Vec::new());
        channel.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = ByteReader::new(bytes.as_slice());
        reader.set_protocol_id(ProtocolId::TileLink);
        let mut out = Channel::default();
        out.unpack(&mut reader).unwrap();
        out
    }

    #[test]
    fn channel_a_round_trip() {
        let channel = Channel::A(ChannelA {
            fields: DataFields {
                code: 0,
                param: 0,
                size: 6,
                source: 7,
                data: vec![0xde, 0xad, 0xbe, 0xef],
            },
            address: 0xabcd_0000,
            mask: vec![0xff],
        });
        assert_eq!(round_trip(channel.clone()), channel);
    }

    #[test]
    fn channel_d_round_trip() {
        let channel = Channel::D(ChannelD {
            fields: DataFields {
                code: 1,
                param: 2,
                size: 3,
                source: 4,
                data: vec![1, 2, 3],
            },
            sink: 0x55,
        });
        assert_eq!(round_trip(channel.clone()), channel);
    }

    #[test]
    fn channel_e_round_trip() {
        let channel = Channel::E(ChannelE { sink: 9 });
        assert_eq!(round_trip(channel.clone()), channel);
    }

    #[test]
    fn pack_order_is_fields_address_mask() {
        let channel = Channel::A(ChannelA {
            fields: DataFields {
                code: 0x11,
                param: 0x22,
                size: 0x33,
                source: 0x44,
                data: vec![0xaa],
            },
            address: 0x55,
            mask: vec![0xbb],
        });
        let mut writer = ByteWriter::new(Vec::new());
        channel.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let expected: Vec<u8> = [
            vec![0u8],                        // channel type
            vec![0x11, 0x22, 0x33],           // code, param, size
            0x44u64.to_le_bytes().to_vec(),   // source
            vec![1, 0, 0xaa],                 // u16-prefixed data
            0x55u64.to_le_bytes().to_vec(),   // address
            vec![1, 0, 0xbb],                 // u16-prefixed mask
        ]
        .concat();
        assert_eq!(bytes, expected);
    }
}
