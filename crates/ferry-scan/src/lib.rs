//! Size pre-scanner for ferry jobs.
//!
//! Before a job mutates anything, the scanner walks its sources to find the
//! total number of bytes the job will account, so progress can be shown as a
//! percentage.
//!
//! # Overview
//!
//! - **Depth-first** serial traversal via jwalk
//! - **Symlinks are never followed**: a link counts its own `lstat` size
//! - **Apparent size**, not allocated blocks
//! - **Cooperative cancellation** through a shared flag; an interrupted scan
//!   returns a lower bound
//! - **Best effort**: unreadable entries become warnings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use ferry_scan::Prescanner;
//!
//! let totals = Prescanner::new(true).scan(&[PathBuf::from("/path/to/copy")]);
//! println!("{} bytes in {} entries", totals.total_bytes, totals.entries);
//! ```

mod scanner;
mod totals;

pub use scanner::Prescanner;
pub use totals::ScanTotals;

// Re-export core types for convenience
pub use ferry_core::{ScanWarning, WarningKind};
