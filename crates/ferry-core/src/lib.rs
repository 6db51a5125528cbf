//! Core types for ferry.
//!
//! This crate provides the data model shared by the scanner, the operation
//! engine and controllers: job descriptors, the permission bit table, engine
//! configuration and the job state snapshot.

mod config;
mod error;
mod job;
mod permissions;
mod state;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{ConfigError, DescriptorError, OperationError, ScanWarning, WarningKind};
pub use job::{JobDescriptor, JobDescriptorBuilder, Operation};
pub use permissions::{PermissionBit, PermissionEdits, TriState};
pub use state::{JobOutcome, JobPhase, JobState};
