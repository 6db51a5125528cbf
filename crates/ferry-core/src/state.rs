//! Job state shared between the worker and its controller.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobPhase {
    /// Sizing the sources.
    #[default]
    Scanning,
    /// Processing items.
    Running,
    /// Waiting for the controller to confirm a cancellation request.
    AwaitingCancelConfirm,
    /// Waiting for the controller to answer an overwrite query.
    AwaitingOverwriteDecision,
    /// Waiting for the controller to acknowledge a fatal error.
    AwaitingErrorAck,
    /// The job was halted; no further mutation happens.
    Cancelled,
    /// All sources were processed.
    Done,
}

/// Final result of a job, reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    Cancelled,
    Failed,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable state of one job.
///
/// The worker owns it; controllers see clones taken under the rendezvous
/// lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    /// Lifecycle phase.
    pub phase: JobPhase,
    /// The item presently being processed.
    pub current_source: Option<PathBuf>,
    /// Where the current item is going, if anywhere.
    pub current_dest: Option<PathBuf>,
    /// Bytes found by the pre-scan. A lower bound if the scan was cancelled.
    pub total_bytes: u64,
    /// Bytes accounted so far.
    pub processed_bytes: u64,
    /// Resolve every later conflict by overwriting.
    pub overwrite_all: bool,
    /// Resolve every later conflict by skipping.
    pub skip_all: bool,
    /// Description of the last fatal error, until acknowledged.
    pub last_error: Option<String>,
    /// Items completed.
    pub items_done: u64,
    /// Items skipped because of a conflict answer.
    pub items_skipped: u64,
}

impl JobState {
    /// Create the state of a job that is about to scan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole percentage of work done, `floor(processed * 100 / total)`.
    ///
    /// Processed bytes are clamped to the total. A job with nothing to size
    /// reports 100 once it is done and 0 before.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return if self.phase == JobPhase::Done { 100 } else { 0 };
        }
        let processed = self.processed_bytes.min(self.total_bytes) as u128;
        (processed * 100 / self.total_bytes as u128) as u8
    }

    /// Account processed bytes.
    pub fn add_processed(&mut self, bytes: u64) {
        self.processed_bytes = self.processed_bytes.saturating_add(bytes);
    }

    /// Record the item now being processed.
    pub fn set_current(&mut self, source: PathBuf, dest: Option<PathBuf>) {
        self.current_source = Some(source);
        self.current_dest = dest;
    }

    /// Get a human-readable summary of the job.
    pub fn summary(&self) -> String {
        if self.items_skipped == 0 {
            format!("{} items processed", self.items_done)
        } else {
            format!(
                "{} items processed, {} skipped",
                self.items_done, self.items_skipped
            )
        }
    }
}
