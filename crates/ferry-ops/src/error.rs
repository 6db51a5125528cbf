//! Errors surfaced to controllers.

use thiserror::Error;

use ferry_core::{ConfigError, DescriptorError};

/// Errors from starting, answering or joining a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The descriptor is inconsistent.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The engine configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker thread could not be started.
    #[error("Failed to start worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// An answer was given while no question of that kind was outstanding.
    #[error("No {expected} is waiting for an answer")]
    NoPendingQuestion { expected: &'static str },

    /// The worker stopped listening before the answer arrived.
    #[error("The job's worker is gone")]
    WorkerGone,

    /// The worker thread panicked.
    #[error("The job's worker panicked")]
    WorkerPanicked,
}
