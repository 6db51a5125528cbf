//! Progress throttling.

use std::time::{Duration, Instant};

use ferry_core::EngineConfig;

/// Decides when a progress change is worth telling the controller about.
///
/// Percentage changes always are; current-item changes at most once per
/// `progress_interval`.
#[derive(Debug)]
pub(crate) struct ProgressReporter {
    last_percent: Option<u8>,
    last_item_notice: Option<Instant>,
    interval: Duration,
}

impl ProgressReporter {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Self {
            last_percent: None,
            last_item_notice: None,
            interval: config.progress_interval,
        }
    }

    /// Record `percent`, returning true if it differs from the last one.
    pub(crate) fn percent_changed(&mut self, percent: u8) -> bool {
        if self.last_percent == Some(percent) {
            return false;
        }
        self.last_percent = Some(percent);
        true
    }

    /// Check if enough time passed to announce a new current item.
    pub(crate) fn item_notice_due(&mut self) -> bool {
        let now = Instant::now();
        match self.last_item_notice {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_item_notice = Some(now);
                true
            }
        }
    }
}
