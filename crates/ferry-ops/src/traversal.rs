//! Depth-first walk shared by every operation.
//!
//! The walk owns the cancellation checkpoint and the skip-if-vanished
//! policy; what happens to each entry is decided by an [`ItemAction`].

use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use ferry_core::{EngineConfig, OperationError};
use ferry_scan::Prescanner;

use crate::progress::ProgressReporter;
use crate::rendezvous::WorkerLink;

/// Why a job stopped early.
#[derive(Debug)]
pub(crate) enum Halt {
    /// Cancellation was confirmed, or a conflict answer said Cancel.
    Cancelled,
    /// A single-item operation failed.
    Failed(OperationError),
}

impl Halt {
    pub(crate) fn io(path: &Path, op: &'static str, source: std::io::Error) -> Self {
        Self::Failed(OperationError::io(path, op, source))
    }
}

impl From<OperationError> for Halt {
    fn from(err: OperationError) -> Self {
        Self::Failed(err)
    }
}

/// What the walk should do after a directory was entered.
#[derive(Debug)]
pub(crate) enum Visit {
    /// Walk the children; their destinations are joined onto the given path.
    Descend(Option<PathBuf>),
    /// The directory was handled as a whole, or skipped.
    Skip,
}

/// Per-item behaviour plugged into [`Walker::walk`].
pub(crate) trait ItemAction {
    /// Called for a directory before its children.
    fn enter_dir(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<Visit, Halt>;

    /// Called for a directory after its children.
    fn leave_dir(
        &mut self,
        _walker: &mut Walker,
        _source: &Path,
        _dest: Option<&Path>,
        _metadata: &Metadata,
    ) -> Result<(), Halt> {
        Ok(())
    }

    /// Called for everything that is not a directory.
    fn leaf(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt>;
}

/// Worker-private traversal state.
pub(crate) struct Walker {
    pub(crate) link: WorkerLink,
    pub(crate) config: EngineConfig,
    pub(crate) recursive: bool,
    progress: ProgressReporter,
    /// The top-level source being walked and its prescanned size.
    source_bytes: Option<(PathBuf, u64)>,
}

impl Walker {
    pub(crate) fn new(link: WorkerLink, config: EngineConfig, recursive: bool) -> Self {
        let progress = ProgressReporter::new(&config);
        Self {
            link,
            config,
            recursive,
            progress,
            source_bytes: None,
        }
    }

    /// Walk one top-level source. `prescanned` is its size from the job's
    /// pre-scan, reused when the whole source is skipped or renamed.
    pub(crate) fn walk_source(
        &mut self,
        action: &mut dyn ItemAction,
        source: &Path,
        dest: Option<&Path>,
        prescanned: Option<u64>,
    ) -> Result<(), Halt> {
        self.source_bytes = prescanned.map(|bytes| (source.to_path_buf(), bytes));
        let result = self.walk(action, source, dest);
        self.source_bytes = None;
        result
    }

    /// Bytes below `path`, accounted when a subtree is handled in one step.
    pub(crate) fn subtree_bytes(&self, path: &Path) -> u64 {
        match &self.source_bytes {
            Some((source, bytes)) if source == path => *bytes,
            _ => Prescanner::new(self.recursive).scan_path(path),
        }
    }

    /// Process `source` and, for directories, everything below it.
    pub(crate) fn walk(
        &mut self,
        action: &mut dyn ItemAction,
        source: &Path,
        dest: Option<&Path>,
    ) -> Result<(), Halt> {
        self.checkpoint()?;

        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(err) => {
                debug!(path = %source.display(), error = %err, "skipping unreadable item");
                return Ok(());
            }
        };

        self.begin_item(source, dest);

        if !metadata.is_dir() {
            return action.leaf(self, source, dest, &metadata);
        }

        // Listed before entering so nothing the action creates inside
        // `source` (a destination below it) is walked as a child.
        let children = if self.recursive {
            list_dir(source)
        } else {
            Ok(Vec::new())
        };

        let dest = match action.enter_dir(self, source, dest, &metadata)? {
            Visit::Descend(dest) => dest,
            Visit::Skip => return Ok(()),
        };

        if self.recursive {
            for child in children? {
                let child_dest = dest
                    .as_deref()
                    .zip(child.file_name())
                    .map(|(d, name)| d.join(name));
                self.walk(action, &child, child_dest.as_deref())?;
            }
        }

        action.leave_dir(self, source, dest.as_deref(), &metadata)
    }

    /// Honour a pending cancellation request.
    ///
    /// The request is consumed; with `confirm_cancel` the controller gets to
    /// veto it, in which case work simply continues.
    pub(crate) fn checkpoint(&mut self) -> Result<(), Halt> {
        if !self.link.take_cancel_request() {
            return Ok(());
        }
        if !self.config.confirm_cancel || self.link.confirm_cancel() {
            debug!("cancellation confirmed");
            return Err(Halt::Cancelled);
        }
        debug!("cancellation withdrawn by controller");
        Ok(())
    }

    /// Cancellation check inside a streaming copy: no confirmation round-trip.
    pub(crate) fn interrupted(&self) -> bool {
        self.link.cancel_requested()
    }

    pub(crate) fn begin_item(&mut self, source: &Path, dest: Option<&Path>) {
        self.link
            .update(|s| s.set_current(source.to_path_buf(), dest.map(Path::to_path_buf)));
        if self.progress.item_notice_due() {
            self.link.publish_progress(false);
        }
    }

    /// Account bytes toward progress, publishing when the percentage moves.
    pub(crate) fn account(&mut self, bytes: u64) {
        let percent = self.link.update(|s| {
            s.add_processed(bytes);
            s.percent()
        });
        if self.progress.percent_changed(percent) {
            self.link
                .publish_progress(self.config.acknowledge_progress);
        }
    }

    pub(crate) fn item_done(&mut self) {
        self.link.update(|s| s.items_done += 1);
    }

    pub(crate) fn item_skipped(&mut self) {
        self.link.update(|s| s.items_skipped += 1);
    }
}

/// Children of a directory in listing order.
///
/// The listing is read completely before anything is processed so removals
/// cannot disturb it. A directory that vanished yields nothing.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, Halt> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Halt::io(dir, "read directory", err)),
    };

    entries
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|err| Halt::io(dir, "read directory", err))
        })
        .collect()
}
