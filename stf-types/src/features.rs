bitflags::bitflags! {
    /// Feature bitset carried by a TRACE_INFO_FEATURE header record.
    ///
    /// The bit assignments are part of the wire format and must not move.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TraceFeatures: u64 {
        /// Memory records carry physical addresses
        const CONTAIN_PHYSICAL_ADDRESS = 1 << 0;
        /// Memory records carry access attributes
        const CONTAIN_DATA_ATTRIBUTE = 1 << 1;
        /// Register records carry operand values
        const CONTAIN_OPERAND_VALUE = 1 << 2;
        /// The trace contains EVENT records
        const CONTAIN_EVENT = 1 << 3;
        /// Syscall events carry their return values
        const CONTAIN_SYSCALL_VALUE = 1 << 4;
        /// The trace contains 64-bit instructions
        const CONTAIN_RV64 = 1 << 5;
        /// Integer divide instructions carry operand values
        const CONTAIN_INT_DIV_OPERAND_VALUE = 1 << 6;
        /// The trace is a sampled subset of the full execution
        const CONTAIN_SAMPLING = 1 << 7;
        /// The trace contains page-table walk records
        const CONTAIN_PTE = 1 << 8;
        /// The trace contains only page-table walk records
        const CONTAIN_PTE_ONLY = 1 << 9;
        /// Page-table entries reflect hardware A/D bit updates
        const CONTAIN_PTE_HW_AD = 1 << 10;
        /// The trace contains process ID records
        const CONTAIN_PROCESS_ID = 1 << 11;
        /// The trace contains vector operands
        const CONTAIN_VEC = 1 << 12;
        /// The trace contains transaction records instead of instructions
        const CONTAIN_TRANSACTIONS = 1 << 13;
    }
}

impl TraceFeatures {
    /// Whether the trace advertises any page-translation content.
    pub const fn has_page_table_info(self) -> bool {
        self.intersects(
            Self::CONTAIN_PTE
                .union(Self::CONTAIN_PTE_ONLY)
                .union(Self::CONTAIN_PTE_HW_AD),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_table_feature_detection() {
        assert!(!TraceFeatures::CONTAIN_EVENT.has_page_table_info());
        assert!(TraceFeatures::CONTAIN_PTE.has_page_table_info());
        assert!(TraceFeatures::CONTAIN_PTE_HW_AD.has_page_table_info());
        let mixed = TraceFeatures::CONTAIN_EVENT | TraceFeatures::CONTAIN_PTE_ONLY;
        assert!(mixed.has_page_table_info());
    }

    #[test]
    fn wire_stability() {
        assert_eq!(TraceFeatures::CONTAIN_PTE.bits(), 0x100);
        assert_eq!(
            TraceFeatures::from_bits(0x3).unwrap(),
            TraceFeatures::CONTAIN_PHYSICAL_ADDRESS
                | TraceFeatures::CONTAIN_DATA_ATTRIBUTE
        );
    }
}
