//! Transaction-trace records.

use core::fmt;
use std::io;

use crate::{
    header::ClockId,
    io::{
        TraceRead,
        TraceWrite,
    },
    protocols::ProtocolData,
};

/// One protocol transaction on the interconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionRecord {
    /// Unique transaction ID
    pub transaction_id: u64,
    /// Cycles elapsed since the previous transaction on this clock
    pub cycle_delta: u64,
    /// Clock domain of the transaction
    pub clock_id: ClockId,
    /// Generator-defined metadata
    pub metadata: u64,
    /// Protocol payload
    pub protocol_data: ProtocolData,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl TransactionRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.transaction_id)?;
        writer.write_u64(self.cycle_delta)?;
        writer.write_u8(self.clock_id)?;
        writer.write_u64(self.metadata)?;
        self.protocol_data.pack(writer)?;
        writer.write_bytes_u64(&self.payload)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.transaction_id = reader.read_u64()?;
        self.cycle_delta = reader.read_u64()?;
        self.clock_id = reader.read_u8()?;
        self.metadata = reader.read_u64()?;
        self.protocol_data.unpack(reader)?;
        reader.read_bytes_u64(&mut self.payload)
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction {} +{} clk {} {}",
            self.transaction_id, self.cycle_delta, self.clock_id, self.protocol_data
        )
    }
}

/// Declares that the preceding transaction depends on an earlier one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionDependencyRecord {
    /// ID of the transaction being depended on
    pub dependency_id: u64,
    /// Cycles elapsed since the dependency completed
    pub cycle_delta: u64,
    /// Clock domain of the dependency
    pub clock_id: ClockId,
}

impl TransactionDependencyRecord {
    /// Serializes the record payload.
    pub fn pack(&self, writer: &mut dyn TraceWrite) -> io::Result<()> {
        writer.write_u64(self.dependency_id)?;
        writer.write_u64(self.cycle_delta)?;
        writer.write_u8(self.clock_id)
    }

    /// Deserializes the record payload.
    pub fn unpack(&mut self, reader: &mut dyn TraceRead) -> io::Result<()> {
        self.dependency_id = reader.read_u64()?;
        self.cycle_delta = reader.read_u64()?;
        self.clock_id = reader.read_u8()?;
        Ok(())
    }
}

impl fmt::Display for TransactionDependencyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "depends on {} +{} clk {}",
            self.dependency_id, self.cycle_delta, self.clock_id
        )
    }
}
