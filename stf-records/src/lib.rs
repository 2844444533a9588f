//! Wire-format record model of the STF trace format.
//!
//! A trace is a stream of tagged records. Every record kind has a dense
//! internal [`Descriptor`] and a sparse on-wire [`EncodedDescriptor`];
//! payloads serialize through the [`io::TraceRead`] / [`io::TraceWrite`]
//! stream traits. The [`Record`] sum type carries any record and
//! dispatches pack/unpack/format to the concrete type.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod descriptor;
pub mod header;
pub mod inst;
pub mod io;
pub mod protocols;
mod record;
pub mod transaction;

pub use descriptor::{
    Descriptor,
    EncodedDescriptor,
};
pub use record::Record;

pub use header::{
    ClockId,
    ClockIdRecord,
    CommentRecord,
    EndHeaderRecord,
    ForcePcRecord,
    IdentifierRecord,
    InstIemRecord,
    IsaRecord,
    ProcessIdExtRecord,
    ProtocolIdRecord,
    TraceInfoFeatureRecord,
    TraceInfoRecord,
    VersionRecord,
    VlenConfigRecord,
    INVALID_CLOCK_ID,
};
pub use inst::{
    BusMasterAccessRecord,
    BusMasterContentRecord,
    EventPcTargetRecord,
    EventRecord,
    InstMemAccessRecord,
    InstMemContentRecord,
    InstMicroOpRecord,
    InstOpcode16Record,
    InstOpcode32Record,
    InstPcTargetRecord,
    InstReadyRegRecord,
    InstRegRecord,
    OperandType,
    PageTableWalkRecord,
    RegData,
    RegType,
    WalkEntry,
    CSR_SATP,
};
pub use protocols::{
    ProtocolData,
    ProtocolId,
};
pub use transaction::{
    TransactionDependencyRecord,
    TransactionRecord,
};
