//! Background file-operation engine for ferry.
//!
//! A job (move, copy, delete, link or chmod/chown over a list of sources)
//! runs on its own worker thread. The controller that started it receives
//! progress, overwrite queries, fatal errors and cancel confirmations through
//! a [`JobController`], and the worker blocks on every question until the
//! controller answers through a [`Responder`].
//!
//! ```no_run
//! use ferry_ops::{Callbacks, EngineConfig, JobDescriptor, OverwriteDecision, start_job};
//!
//! let job = JobDescriptor::copy(vec!["/tmp/a.txt".into()], "/tmp/out").unwrap();
//! let controller = Callbacks::new(
//!     |_src, _dst, percent| println!("{percent}%"),
//!     |_query, responder| {
//!         let _ = responder.answer_overwrite_query(OverwriteDecision::Skip);
//!     },
//!     |path, description, responder| {
//!         eprintln!("{}: {description}", path.display());
//!         let _ = responder.acknowledge_error();
//!     },
//!     |outcome| println!("{outcome}"),
//! );
//! let mut handle = start_job(job, EngineConfig::default(), controller).unwrap();
//! handle.run().unwrap();
//! ```

mod chmod;
mod conflict;
mod copy;
mod delete;
mod error;
mod job;
mod link;
mod move_op;
mod progress;
mod rendezvous;
mod traversal;

pub use conflict::{OverwriteDecision, OverwriteQuery, suggest_rename};
pub use error::JobError;
pub use job::{Callbacks, Canceller, JobController, JobHandle, start_job};
pub use rendezvous::Responder;

pub use ferry_core::{
    ConfigError, EngineConfig, EngineConfigBuilder, JobDescriptor, JobDescriptorBuilder, JobOutcome, JobPhase,
    JobState, Operation, OperationError, PermissionBit, PermissionEdits, TriState,
};
