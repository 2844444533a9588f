use core::fmt;

use crate::{
    bytes::bit_mask,
    Iem,
    VaMode,
    PAGE_OFFSET_BITS,
};

/// A decoded SATP register value: root page-table base plus addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Satp {
    base_addr: u64,
    va_mode: VaMode,
}

/// Error returned when an SATP value carries a reserved mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSatpMode(pub u8);

impl fmt::Display for InvalidSatpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid SATP mode value: {:#x}", self.0)
    }
}

impl std::error::Error for InvalidSatpMode {}

impl Satp {
    /// Decodes a raw SATP register value according to the trace IEM.
    ///
    /// RV32 has a 22-bit PPN and a single mode bit; RV64 has a 44-bit PPN
    /// and a 4-bit mode field where only bare/SV39/SV48/SV57 are defined.
    pub const fn decode(iem: Iem, value: u64) -> Result<Self, InvalidSatpMode> {
        let (ppn_bits, mode_shift, mode_bits) = match iem {
            Iem::Rv32 => (22, 31, 1),
            Iem::Rv64 => (44, 60, 4),
        };

        let mode_field = ((value >> mode_shift) & bit_mask(mode_bits)) as u8;
        let va_mode = match iem {
            Iem::Rv32 => match mode_field {
                0 => VaMode::NoTranslation,
                _ => VaMode::Sv32,
            },
            Iem::Rv64 => match mode_field {
                0 => VaMode::NoTranslation,
                8 => VaMode::Sv39,
                9 => VaMode::Sv48,
                10 => VaMode::Sv57,
                _ => return Err(InvalidSatpMode(mode_field)),
            },
        };

        Ok(Self {
            base_addr: (value & bit_mask(ppn_bits)) << PAGE_OFFSET_BITS,
            va_mode,
        })
    }

    /// Physical address of the root page table.
    pub const fn base_addr(&self) -> u64 {
        self.base_addr
    }

    /// Virtual addressing mode selected by this SATP value.
    pub const fn va_mode(&self) -> VaMode {
        self.va_mode
    }
}
