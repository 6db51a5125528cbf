//! Request/response bridge between a job's worker and its controller.
//!
//! The worker sends [`Request`]s over one unbounded channel. Every question
//! carries its own one-shot reply channel, and the worker blocks on it until
//! the controller answers, so at most one question is ever outstanding.
//! Progress is published by updating the shared [`JobState`] and sending a
//! nudge; the controller reads whatever is newest when it handles the nudge.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use ferry_core::{JobOutcome, JobPhase, JobState};

use crate::JobError;
use crate::conflict::{OverwriteDecision, OverwriteQuery};

/// Message from the worker to the controller.
#[derive(Debug)]
pub(crate) enum Request {
    /// Progress changed. With `ack`, the worker waits until it is handled.
    Progress { ack: Option<oneshot::Sender<()>> },
    /// A destination entry already exists.
    Overwrite {
        query: OverwriteQuery,
        reply: oneshot::Sender<OverwriteDecision>,
    },
    /// A fatal error; the only answer is an acknowledgement.
    Error {
        path: PathBuf,
        description: String,
        reply: oneshot::Sender<()>,
    },
    /// A cancellation was requested; should the job really stop?
    ConfirmCancel { reply: oneshot::Sender<bool> },
    /// The worker is done and about to exit.
    Finished(JobOutcome),
}

/// The question currently waiting for an answer.
#[derive(Debug)]
pub(crate) enum Pending {
    Overwrite(oneshot::Sender<OverwriteDecision>),
    Error(oneshot::Sender<()>),
    ConfirmCancel(oneshot::Sender<bool>),
}

impl Pending {
    fn describe(&self) -> &'static str {
        match self {
            Self::Overwrite(_) => "overwrite query",
            Self::Error(_) => "error notice",
            Self::ConfirmCancel(_) => "cancel confirmation",
        }
    }
}

pub(crate) fn lock_state(state: &Mutex<JobState>) -> MutexGuard<'_, JobState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Answers the outstanding question of a job.
///
/// Handed to controller callbacks; clone it to answer later from anywhere.
/// Each answer satisfies exactly one outstanding question of the matching
/// kind.
#[derive(Debug, Clone)]
pub struct Responder {
    pending: Arc<Mutex<Option<Pending>>>,
}

impl Responder {
    pub(crate) fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn park(&self, question: Pending) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stale) = pending.replace(question) {
            debug!(question = stale.describe(), "replacing unanswered question");
        }
    }

    fn take<T>(
        &self,
        expected: &'static str,
        select: impl FnOnce(Pending) -> Result<T, Pending>,
    ) -> Result<T, JobError> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.take() {
            Some(question) => match select(question) {
                Ok(reply) => Ok(reply),
                Err(other) => {
                    *pending = Some(other);
                    Err(JobError::NoPendingQuestion { expected })
                }
            },
            None => Err(JobError::NoPendingQuestion { expected }),
        }
    }

    /// Answer the outstanding overwrite query.
    pub fn answer_overwrite_query(&self, decision: OverwriteDecision) -> Result<(), JobError> {
        let reply = self.take("overwrite query", |q| match q {
            Pending::Overwrite(reply) => Ok(reply),
            other => Err(other),
        })?;
        reply.send(decision).map_err(|_| JobError::WorkerGone)
    }

    /// Answer the outstanding cancel confirmation.
    pub fn answer_cancel_confirm(&self, confirmed: bool) -> Result<(), JobError> {
        let reply = self.take("cancel confirmation", |q| match q {
            Pending::ConfirmCancel(reply) => Ok(reply),
            other => Err(other),
        })?;
        reply.send(confirmed).map_err(|_| JobError::WorkerGone)
    }

    /// Acknowledge the outstanding fatal error. The job then ends.
    pub fn acknowledge_error(&self) -> Result<(), JobError> {
        let reply = self.take("error notice", |q| match q {
            Pending::Error(reply) => Ok(reply),
            other => Err(other),
        })?;
        reply.send(()).map_err(|_| JobError::WorkerGone)
    }
}

/// The worker's end of the rendezvous.
#[derive(Debug, Clone)]
pub(crate) struct WorkerLink {
    requests: mpsc::UnboundedSender<Request>,
    state: Arc<Mutex<JobState>>,
    cancel: Arc<AtomicBool>,
}

impl WorkerLink {
    pub(crate) fn new(
        requests: mpsc::UnboundedSender<Request>,
        state: Arc<Mutex<JobState>>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            requests,
            state,
            cancel,
        }
    }

    /// Run `f` on the shared state under the lock.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> R {
        f(&mut lock_state(&self.state))
    }

    fn set_phase(&self, phase: JobPhase) {
        self.update(|s| s.phase = phase);
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Check for a cancellation request without consuming it.
    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Consume a pending cancellation request.
    pub(crate) fn take_cancel_request(&self) -> bool {
        self.cancel.swap(false, Ordering::AcqRel)
    }

    /// Tell the controller progress changed, optionally waiting until it has
    /// been handled.
    pub(crate) fn publish_progress(&self, wait: bool) {
        if !wait {
            let _ = self.requests.send(Request::Progress { ack: None });
            return;
        }
        let (ack, done) = oneshot::channel();
        if self.requests.send(Request::Progress { ack: Some(ack) }).is_ok() {
            let _ = done.blocking_recv();
        }
    }

    /// Ask how to handle an existing destination. A vanished controller
    /// counts as `Cancel`.
    pub(crate) fn ask_overwrite(&self, query: OverwriteQuery) -> OverwriteDecision {
        self.set_phase(JobPhase::AwaitingOverwriteDecision);
        let (reply, answer) = oneshot::channel();
        let decision = match self.requests.send(Request::Overwrite { query, reply }) {
            Ok(()) => answer.blocking_recv().unwrap_or(OverwriteDecision::Cancel),
            Err(_) => OverwriteDecision::Cancel,
        };
        self.set_phase(JobPhase::Running);
        decision
    }

    /// Report a fatal error and wait for the acknowledgement.
    pub(crate) fn report_error(&self, path: &Path, description: &str) {
        self.update(|s| {
            s.phase = JobPhase::AwaitingErrorAck;
            s.last_error = Some(description.to_string());
        });
        let (reply, answer) = oneshot::channel();
        let sent = self.requests.send(Request::Error {
            path: path.to_path_buf(),
            description: description.to_string(),
            reply,
        });
        if sent.is_err() {
            debug!(path = %path.display(), "controller gone, error not delivered");
        } else if answer.blocking_recv().is_err() {
            debug!(path = %path.display(), "error notice dropped without acknowledgement");
        }
        self.update(|s| s.last_error = None);
    }

    /// Ask whether a requested cancellation should go ahead. A vanished
    /// controller counts as confirmed.
    pub(crate) fn confirm_cancel(&self) -> bool {
        self.set_phase(JobPhase::AwaitingCancelConfirm);
        let (reply, answer) = oneshot::channel();
        let confirmed = match self.requests.send(Request::ConfirmCancel { reply }) {
            Ok(()) => answer.blocking_recv().unwrap_or(true),
            Err(_) => true,
        };
        if !confirmed {
            self.set_phase(JobPhase::Running);
        }
        confirmed
    }

    /// Send the single completion message.
    pub(crate) fn finish(&self, outcome: JobOutcome) {
        let _ = self.requests.send(Request::Finished(outcome));
    }
}
