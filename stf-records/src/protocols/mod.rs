//! Protocol payloads carried inside transaction records.

use core::fmt;
use std::io;

use crate::io::{
    TraceRead,
    TraceWrite,
};

pub mod tilelink;

use tilelink::Channel;

/// Identifies the protocol of a transaction trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ProtocolId {
    /// The TileLink on-chip interconnect protocol
    TileLink = 0,
}

impl ProtocolId {
    /// Converts a wire value into a `ProtocolId`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::TileLink),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TileLink => write!(f, "TILELINK"),
        }
    }
}

/// Protocol-specific payload of a transaction, tagged by [`ProtocolId`].
///
/// The protocol itself is declared once in the trace header, so the wire
/// form of a payload starts directly with the protocol's own framing
/// (for TileLink: the channel type byte).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolData {
    /// A TileLink channel message
    TileLink(Channel),
}

impl Default for ProtocolData {
    fn default() -> Self {
        Self::TileLink(Channel::default())
    }
}

impl ProtocolData {
    /// The protocol this payload belongs to.
    pub const fn protocol_id(&self) -> ProtocolId {
        match self {
            Self::TileLink(_) => ProtocolId::TileLink,
        }
    }

    /// The TileLink channel, if this is a TileLink payload.
    pub const fn tilelink(&self) -> Option<&Channel> {
        match self {
            Self::TileLink(channel) => Some(channel),
        }
    }

    /// Serializes the payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        match self {
            Self::TileLink(channel) => channel.pack(writer),
        }
    }

    /// Deserializes a payload of the protocol declared by the stream.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        let protocol_id = reader.protocol_id().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "transaction payload in a trace without a PROTOCOL_ID record",
            )
        })?;
        match protocol_id {
            ProtocolId::TileLink => {
                if !matches!(self, Self::TileLink(_)) {
                    *self = Self::TileLink(Channel::default());
                }
                let Self::TileLink(channel) = self;
                channel.unpack(reader)
            }
        }
    }
}

impl fmt::Display for ProtocolData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TileLink(channel) => write!(f, "{} {}", self.protocol_id(), channel),
        }
    }
}
