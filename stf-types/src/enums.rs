use core::fmt;

use crate::{
    bytes::bit_mask,
    PAGE_OFFSET_BITS,
};

/// Instruction encoding mode of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Iem {
    /// 32-bit RISC-V
    Rv32 = 1,
    /// 64-bit RISC-V
    Rv64 = 2,
}

impl Iem {
    /// Converts a wire value into an `Iem`, returning `None` for reserved
    /// values.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Rv32),
            2 => Some(Self::Rv64),
            _ => None,
        }
    }
}

impl fmt::Display for Iem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rv32 => write!(f, "RV32"),
            Self::Rv64 => write!(f, "RV64"),
        }
    }
}

/// Traced ISA family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Isa {
    /// RISC-V
    Riscv = 1,
}

impl Isa {
    /// Converts a wire value into an `Isa`, returning `None` for reserved
    /// values.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Riscv),
            _ => None,
        }
    }
}

/// Privilege mode the traced core was executing in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ExecutionMode {
    /// User mode
    User = 0,
    /// Supervisor mode
    Supervisor = 1,
    /// Hypervisor mode
    Hypervisor = 2,
    /// Machine mode. Traces that never report a mode are assumed to run
    /// entirely in machine mode.
    #[default]
    Machine = 3,
}

impl ExecutionMode {
    /// Converts a wire value into an `ExecutionMode`, returning `None` for
    /// reserved values.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::User),
            1 => Some(Self::Supervisor),
            2 => Some(Self::Hypervisor),
            3 => Some(Self::Machine),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Supervisor => write!(f, "SUPERVISOR"),
            Self::Hypervisor => write!(f, "HYPERVISOR"),
            Self::Machine => write!(f, "MACHINE"),
        }
    }
}

/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MemAccessType {
    /// Load
    Read = 0,
    /// Store
    Write = 1,
}

impl MemAccessType {
    /// Converts a wire value into a `MemAccessType`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            _ => None,
        }
    }
}

/// Originator of a bus-master access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BusMasterType {
    /// A processor core
    Core = 0,
    /// A DMA engine
    Dma = 1,
    /// A GPU
    Gpu = 2,
    /// A network interface
    Nic = 3,
    /// Anything else
    Other = 4,
}

impl BusMasterType {
    /// Converts a wire value into a `BusMasterType`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Core),
            1 => Some(Self::Dma),
            2 => Some(Self::Gpu),
            3 => Some(Self::Nic),
            4 => Some(Self::Other),
            _ => None,
        }
    }
}

/// Event codes carried by EVENT records.
///
/// Synchronous exceptions use the architectural cause values. Interrupts set
/// the top bit, the way the hardware cause register does. Mode changes use a
/// separate code outside the architectural space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum EventKind {
    /// Instruction address misaligned
    InstAddrMisaligned = 0,
    /// Instruction access fault
    InstAddrFault = 1,
    /// Illegal instruction
    IllegalInst = 2,
    /// Breakpoint
    Breakpoint = 3,
    /// Load address misaligned
    LoadAddrMisaligned = 4,
    /// Load access fault
    LoadAccessFault = 5,
    /// Store address misaligned
    StoreAddrMisaligned = 6,
    /// Store access fault
    StoreAccessFault = 7,
    /// Environment call from user mode
    UserEcall = 8,
    /// Environment call from supervisor mode
    SupervisorEcall = 9,
    /// Environment call from hypervisor mode
    HypervisorEcall = 10,
    /// Environment call from machine mode
    MachineEcall = 11,
    /// Instruction page fault
    InstPageFault = 12,
    /// Load page fault
    LoadPageFault = 13,
    /// Store page fault
    StorePageFault = 15,
    /// Privilege mode change. The first payload word carries the new
    /// [`ExecutionMode`].
    ModeChange = 0x0001_0000,
    /// User software interrupt
    UserSoftInterrupt = 0x8000_0000,
    /// Supervisor software interrupt
    SupervisorSoftInterrupt = 0x8000_0001,
    /// Machine software interrupt
    MachineSoftInterrupt = 0x8000_0003,
    /// User timer interrupt
    UserTimerInterrupt = 0x8000_0004,
    /// Supervisor timer interrupt
    SupervisorTimerInterrupt = 0x8000_0005,
    /// Machine timer interrupt
    MachineTimerInterrupt = 0x8000_0007,
    /// User external interrupt
    UserExtInterrupt = 0x8000_0008,
    /// Supervisor external interrupt
    SupervisorExtInterrupt = 0x8000_0009,
    /// Machine external interrupt
    MachineExtInterrupt = 0x8000_000b,
}

impl EventKind {
    /// Converts a wire value into an `EventKind`.
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::InstAddrMisaligned),
            1 => Some(Self::InstAddrFault),
            2 => Some(Self::IllegalInst),
            3 => Some(Self::Breakpoint),
            4 => Some(Self::LoadAddrMisaligned),
            5 => Some(Self::LoadAccessFault),
            6 => Some(Self::StoreAddrMisaligned),
            7 => Some(Self::StoreAccessFault),
            8 => Some(Self::UserEcall),
            9 => Some(Self::SupervisorEcall),
            10 => Some(Self::HypervisorEcall),
            11 => Some(Self::MachineEcall),
            12 => Some(Self::InstPageFault),
            13 => Some(Self::LoadPageFault),
            15 => Some(Self::StorePageFault),
            0x0001_0000 => Some(Self::ModeChange),
            0x8000_0000 => Some(Self::UserSoftInterrupt),
            0x8000_0001 => Some(Self::SupervisorSoftInterrupt),
            0x8000_0003 => Some(Self::MachineSoftInterrupt),
            0x8000_0004 => Some(Self::UserTimerInterrupt),
            0x8000_0005 => Some(Self::SupervisorTimerInterrupt),
            0x8000_0007 => Some(Self::MachineTimerInterrupt),
            0x8000_0008 => Some(Self::UserExtInterrupt),
            0x8000_0009 => Some(Self::SupervisorExtInterrupt),
            0x8000_000b => Some(Self::MachineExtInterrupt),
            _ => None,
        }
    }

    /// Whether this event reports a privilege mode change.
    pub const fn is_mode_change(self) -> bool {
        matches!(self, Self::ModeChange)
    }

    /// Whether this event is an asynchronous interrupt.
    pub const fn is_interrupt(self) -> bool {
        (self as u32) & 0x8000_0000 != 0
    }

    /// Whether this event is an environment call.
    pub const fn is_syscall(self) -> bool {
        matches!(
            self,
            Self::UserEcall
                | Self::SupervisorEcall
                | Self::HypervisorEcall
                | Self::MachineEcall
        )
    }

    /// Whether this event is a synchronous fault.
    pub const fn is_fault(self) -> bool {
        !self.is_interrupt() && !self.is_mode_change() && !self.is_syscall()
    }
}

/// Virtual addressing mode selected by the SATP register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum VaMode {
    /// 2-level translation with 32-bit virtual addresses
    Sv32 = 0,
    /// 3-level translation with 39-bit virtual addresses
    Sv39 = 1,
    /// 4-level translation with 48-bit virtual addresses
    Sv48 = 2,
    /// 5-level translation with 57-bit virtual addresses
    Sv57 = 3,
    /// Bare mode: VA == PA
    NoTranslation = 4,
}

/// Widths that characterize a [`VaMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaProperties {
    /// Physical address size in bits
    pub phys_addr_bits: u32,
    /// Virtual address size in bits
    pub virt_addr_bits: u32,
    /// Width of each VPN field in bits
    pub vpn_bits: u32,
    /// Shift applied to a VPN field when computing a PTE address
    pub pte_shift: u32,
}

impl VaMode {
    /// Widths for this mode. [`VaMode::NoTranslation`] has none.
    pub const fn properties(self) -> Option<VaProperties> {
        match self {
            Self::Sv32 => Some(VaProperties {
                phys_addr_bits: 34,
                virt_addr_bits: 32,
                vpn_bits: 10,
                pte_shift: 2,
            }),
            Self::Sv39 => Some(VaProperties {
                phys_addr_bits: 56,
                virt_addr_bits: 39,
                vpn_bits: 9,
                pte_shift: 3,
            }),
            Self::Sv48 => Some(VaProperties {
                phys_addr_bits: 56,
                virt_addr_bits: 48,
                vpn_bits: 9,
                pte_shift: 3,
            }),
            Self::Sv57 => Some(VaProperties {
                phys_addr_bits: 56,
                virt_addr_bits: 57,
                vpn_bits: 9,
                pte_shift: 3,
            }),
            Self::NoTranslation => None,
        }
    }
}

impl VaProperties {
    /// Number of page-table levels walked in this mode.
    pub const fn levels(&self) -> u32 {
        (self.virt_addr_bits - PAGE_OFFSET_BITS) / self.vpn_bits
    }

    /// Mask covering a full virtual address in this mode.
    pub const fn virt_addr_mask(&self) -> u64 {
        bit_mask(self.virt_addr_bits)
    }

    /// Mask covering a full physical address in this mode.
    pub const fn phys_addr_mask(&self) -> u64 {
        bit_mask(self.phys_addr_bits)
    }

    /// Mask covering a single VPN field.
    pub const fn vpn_mask(&self) -> u64 {
        bit_mask(self.vpn_bits)
    }
}
