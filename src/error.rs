//! Trace engine error types.

use std::io;

use stf_records::Descriptor;

/// Convenience alias used across the crate.
pub type Result<T> = core::result::Result<T, StfError>;

/// Everything that can go wrong while producing or consuming a trace.
#[derive(Debug, thiserror::Error)]
pub enum StfError {
    /// Underlying read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the STF identifier record.
    #[error("invalid magic: not an STF trace")]
    InvalidMagic,

    /// A descriptor byte outside the defined value space.
    #[error("invalid descriptor {0:#04x}")]
    InvalidDescriptor(u8),

    /// A defined descriptor with no registered constructor.
    #[error("unregistered descriptor {0}")]
    UnregisteredDescriptor(Descriptor),

    /// A singleton header record appeared twice.
    #[error("duplicate header record {0}")]
    DuplicateHeaderRecord(Descriptor),

    /// A non-header record appeared before END_HEADER.
    #[error("unexpected record {0} in header")]
    UnexpectedHeaderRecord(Descriptor),

    /// The stream ended before END_HEADER.
    #[error("incomplete header: trace ended before END_HEADER")]
    IncompleteHeader,

    /// The trace's protocol does not match the one the caller expected.
    #[error("protocol mismatch: expected {expected}, trace declares {actual}")]
    ProtocolMismatch {
        /// Protocol the caller asked for
        expected: stf_records::ProtocolId,
        /// Protocol found in the trace header
        actual: stf_records::ProtocolId,
    },

    /// A transaction trace opened with an expected protocol declares none.
    #[error("transaction trace declares no protocol")]
    MissingProtocolId,

    /// A record that is illegal at this point of the stream.
    #[error("unexpected record {0}")]
    UnexpectedRecord(Descriptor),

    /// The stream ended in the middle of a record.
    #[error("unexpected end of trace inside a record")]
    UnexpectedEof,

    /// The decoder's computed branch target disagrees with the trace.
    #[error(
        "branch target mismatch at pc {pc:#x}: decoded {decoded:#x}, trace has {trace:#x}"
    )]
    BranchTargetMismatch {
        /// PC of the branch
        pc: u64,
        /// Target computed from the opcode
        decoded: u64,
        /// Target recorded in the trace
        trace: u64,
    },

    /// An instruction's PC disagrees with the last taken branch's target.
    #[error("next-PC mismatch: expected {expected:#x}, found {found:#x}")]
    NextPcMismatch {
        /// Target of the last taken branch
        expected: u64,
        /// PC of the following instruction
        found: u64,
    },

    /// An indirect branch with no target record in the trace.
    #[error("indirect branch at pc {0:#x} has no target in the trace")]
    IndirectWithoutTarget(u64),

    /// Operand records that cannot belong to a decoded branch.
    #[error("instruction at pc {0:#x} decoded as a branch but its records disagree")]
    NotABranch(u64),

    /// A clock ID registered twice with different names.
    #[error("clock {id} already registered as \"{existing}\", refusing \"{name}\"")]
    ClockConflict {
        /// The conflicting clock ID
        id: stf_records::ClockId,
        /// Name already registered for the ID
        existing: String,
        /// Name the new registration supplied
        name: String,
    },

    /// Clock ID 0 is reserved.
    #[error("clock ID 0 is reserved as invalid")]
    InvalidClockId,

    /// No clocks have been registered yet.
    #[error("no clocks registered")]
    NoClocks,

    /// Address translation failed.
    #[error("address translation failure for VA {va:#x} at index {index:#x}")]
    Translation {
        /// Virtual address being translated
        va: u64,
        /// Instruction index of the query
        index: u64,
    },

    /// An SATP value with a reserved mode field.
    #[error(transparent)]
    InvalidSatpMode(#[from] stf_types::InvalidSatpMode),

    /// A page-table walk arrived while no SATP value was active.
    #[error("page table walk at index {0} with no active SATP")]
    WalkWithoutSatp(u64),

    /// A PTE was given two different values at the same instruction index.
    #[error("PTE at {pa:#x} has two different values at index {index}")]
    PteConflict {
        /// Physical address of the PTE
        pa: u64,
        /// Conflicting instruction index
        index: u64,
    },

    /// Seek ran off the end of the trace.
    #[error("attempted to seek past the end of the trace")]
    SeekPastEnd,

    /// A cursor fell out of the buffered window.
    #[error("cursor points outside the buffered window")]
    StaleCursor,

    /// Opcode and transaction descriptors cannot be filtered.
    #[error("descriptor {0} cannot be filtered")]
    UnfilterableDescriptor(Descriptor),

    /// A record operation that needs a finalized header.
    #[error("the header has not been finalized")]
    HeaderNotFinalized,

    /// A header operation after the header was finalized.
    #[error("the header has already been finalized")]
    HeaderFinalized,
}

impl StfError {
    /// Maps an I/O error from inside a record payload: a clean EOF there
    /// means the record was cut short.
    pub(crate) fn from_record_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Io(err)
        }
    }
}
