//! Reader and writer for the STF simulation trace format.
//!
//! An STF trace records the dynamic behavior of an executing processor
//! (instruction streams, register and memory accesses, page-translation
//! walks) or, in a separate profile, the ordered protocol transactions on
//! an on-chip interconnect. This crate is the trace I/O engine: the
//! chunked-compressed container, the record pool and factory, the base
//! record reader, the buffered instruction/branch/transaction readers,
//! the writer, and the page-table resolver with its prefetch thread.
//!
//! The record model itself lives in [`stf_records`]; shared atomic types
//! in [`stf_types`].
//!
//! ```no_run
//! use stf::prelude::*;
//!
//! # fn main() -> stf::Result<()> {
//! let mut reader = InstReader::open("trace.zstf", &ReaderOptions::default())?;
//! while let Some(inst) = reader.next_instruction()? {
//!     println!("{:#x}: {:#x}", inst.pc(), inst.opcode());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod branch;
pub mod buffered;
pub mod chunk;
pub mod clock;
pub mod error;
pub mod factory;
pub mod filter;
pub mod inst;
pub mod pool;
pub mod pte;
pub mod reader;
pub mod transaction;
pub mod writer;

pub use error::{
    Result,
    StfError,
};

// Fully re-export the format crates.
#[doc(no_inline)]
pub use stf_records;
#[doc(no_inline)]
pub use stf_types;

pub mod prelude {
    //! Everything needed to read and write traces.

    #[doc(no_inline)]
    pub use stf_records::{
        protocols::tilelink::{
            Channel,
            ChannelA,
            ChannelB,
            ChannelC,
            ChannelD,
            ChannelE,
            ChannelType,
            DataFields,
        },
        Descriptor,
        EncodedDescriptor,
        ProtocolData,
        ProtocolId,
        Record,
    };
    #[doc(no_inline)]
    pub use stf_types::{
        EventKind,
        ExecutionMode,
        Iem,
        Isa,
        TraceFeatures,
        VaMode,
    };

    pub use crate::{
        branch::{
            Branch,
            BranchReader,
        },
        buffered::ItemCursor,
        error::{
            Result,
            StfError,
        },
        inst::{
            InstReader,
            Instruction,
        },
        pte::{
            PageTable,
            PteReader,
        },
        reader::{
            ReaderOptions,
            RecordReader,
            TraceHeader,
        },
        transaction::{
            Transaction,
            TransactionReader,
        },
        writer::{
            TraceWriter,
            WriterOptions,
        },
    };
}
