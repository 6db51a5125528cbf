//! Scan results.

use ferry_core::ScanWarning;

/// Sizes found by a pre-scan.
#[derive(Debug, Clone, Default)]
pub struct ScanTotals {
    /// Sum of the sizes of every counted entry.
    pub total_bytes: u64,
    /// Bytes per top-level source, in source order. A source whose scan was
    /// cut short has no entry.
    pub per_source: Vec<u64>,
    /// Number of entries visited, directories included.
    pub entries: u64,
    /// Entries that could not be read.
    pub warnings: Vec<ScanWarning>,
    /// The scan stopped early; `total_bytes` is a lower bound.
    pub interrupted: bool,
}

impl ScanTotals {
    /// Create empty totals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Size measured for the source at `index`, if its scan completed.
    pub fn source_bytes(&self, index: usize) -> Option<u64> {
        self.per_source.get(index).copied()
    }

    /// Check if any entry could not be read.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
