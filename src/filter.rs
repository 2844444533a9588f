//! Per-reader record filtering.

use stf_records::Descriptor;

use crate::error::{
    Result,
    StfError,
};

/// A descriptor bitset that silently drops records before they reach the
/// consumer.
///
/// Marker records (opcodes, transactions) cannot be filtered; the reader
/// relies on them for counting and seeking.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    filtered: [bool; Descriptor::COUNT],
}

impl RecordFilter {
    /// A filter that passes everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts dropping records with the given descriptor.
    pub fn filter(&mut self, desc: Descriptor) -> Result<()> {
        if desc.is_marker() {
            return Err(StfError::UnfilterableDescriptor(desc));
        }
        self.filtered[desc.index()] = true;
        Ok(())
    }

    /// Stops dropping records with the given descriptor.
    pub fn unfilter(&mut self, desc: Descriptor) {
        self.filtered[desc.index()] = false;
    }

    /// Whether records with this descriptor are dropped.
    pub fn is_filtered(&self, desc: Descriptor) -> bool {
        self.filtered[desc.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_toggle() {
        let mut filter = RecordFilter::new();
        assert!(!filter.is_filtered(Descriptor::Event));

        filter.filter(Descriptor::Event).unwrap();
        assert!(filter.is_filtered(Descriptor::Event));
        assert!(!filter.is_filtered(Descriptor::InstReg));

        filter.unfilter(Descriptor::Event);
        assert!(!filter.is_filtered(Descriptor::Event));
    }

    #[test]
    fn markers_cannot_be_filtered() {
        let mut filter = RecordFilter::new();
        assert!(filter.filter(Descriptor::InstOpcode16).is_err());
        assert!(filter.filter(Descriptor::InstOpcode32).is_err());
        assert!(filter.filter(Descriptor::Transaction).is_err());
        assert!(filter.filter(Descriptor::TransactionDependency).is_ok());
    }
}
