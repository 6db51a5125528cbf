//! JWalk-based serial size scanner.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jwalk::{Parallelism, WalkDir};
use tracing::debug;

use ferry_core::{ScanWarning, WarningKind};

use crate::totals::ScanTotals;

/// Computes how many bytes a job will account.
///
/// Directories count as zero bytes; regular files, symlinks and special
/// files count their apparent `lstat` size.
#[derive(Debug, Clone)]
pub struct Prescanner {
    recursive: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl Prescanner {
    /// Create a scanner. Non-recursive scanners only look at the sources
    /// themselves.
    pub fn new(recursive: bool) -> Self {
        Self {
            recursive,
            cancel: None,
        }
    }

    /// Stop scanning as soon as `flag` becomes true.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Scan every source in order.
    pub fn scan(&self, sources: &[PathBuf]) -> ScanTotals {
        let mut totals = ScanTotals::new();

        for source in sources {
            if self.is_cancelled() {
                totals.interrupted = true;
                break;
            }
            let before = totals.total_bytes;
            self.scan_source(source, &mut totals);
            if totals.interrupted {
                break;
            }
            totals.per_source.push(totals.total_bytes - before);
        }

        debug!(
            total_bytes = totals.total_bytes,
            entries = totals.entries,
            warnings = totals.warnings.len(),
            interrupted = totals.interrupted,
            "pre-scan finished"
        );
        totals
    }

    /// Size of a single path, following the scanner's recursion setting.
    pub fn scan_path(&self, path: &Path) -> u64 {
        let mut totals = ScanTotals::new();
        self.scan_source(path, &mut totals);
        totals.total_bytes
    }

    fn scan_source(&self, source: &Path, totals: &mut ScanTotals) {
        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(err) => {
                debug!(path = %source.display(), error = %err, "skipping unreadable source");
                totals.warnings.push(ScanWarning::from_io(
                    source,
                    &err,
                    WarningKind::MetadataError,
                ));
                return;
            }
        };

        totals.entries += 1;
        if !metadata.is_dir() {
            totals.total_bytes += metadata.len();
            return;
        }
        if self.recursive {
            self.scan_dir(source, totals);
        }
    }

    fn scan_dir(&self, root: &Path, totals: &mut ScanTotals) {
        let walker = WalkDir::new(root)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .sort(false)
            .min_depth(1);

        for entry_result in walker {
            if self.is_cancelled() {
                totals.interrupted = true;
                return;
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                    totals
                        .warnings
                        .push(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                    continue;
                }
            };

            totals.entries += 1;
            if entry.file_type().is_dir() {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => totals.total_bytes += metadata.len(),
                Err(err) => {
                    totals.warnings.push(ScanWarning::new(
                        entry.path(),
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                }
            }
        }
    }
}

impl Default for Prescanner {
    fn default() -> Self {
        Self::new(true)
    }
}
