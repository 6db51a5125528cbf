//! Starting jobs and driving their controllers.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, info_span, warn};

use ferry_core::{
    EngineConfig, JobDescriptor, JobOutcome, JobPhase, JobState, Operation, OperationError,
};
use ferry_scan::{Prescanner, ScanTotals};

use crate::JobError;
use crate::chmod::ChmodAction;
use crate::conflict::{OverwriteQuery, lands_inside};
use crate::copy::TransferAction;
use crate::delete::DeleteAction;
use crate::link::LinkAction;
use crate::move_op::same_device;
use crate::rendezvous::{Pending, Request, Responder, WorkerLink, lock_state};
use crate::traversal::{Halt, Walker};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Receives a job's notifications and questions.
///
/// Methods run on the controller's own thread, from
/// [`JobHandle::dispatch_pending`], [`JobHandle::run`] or
/// [`JobHandle::run_async`]. Questions come with a [`Responder`]; they may
/// be answered before returning or later from anywhere, but the worker
/// waits until they are.
pub trait JobController {
    /// The current item or the percentage changed.
    fn progress(&mut self, source: Option<&Path>, dest: Option<&Path>, percent: u8);

    /// A destination already exists. Answer with
    /// [`Responder::answer_overwrite_query`].
    fn overwrite_query(&mut self, query: &OverwriteQuery, responder: &Responder);

    /// A fatal error stopped the job. Answer with
    /// [`Responder::acknowledge_error`].
    fn error(&mut self, failed_path: &Path, description: &str, responder: &Responder);

    /// A cancellation request reached a checkpoint. Answer with
    /// [`Responder::answer_cancel_confirm`]; the default confirms.
    fn confirm_cancel(&mut self, responder: &Responder) {
        let _ = responder.answer_cancel_confirm(true);
    }

    /// The job ended. Called exactly once.
    fn completion(&mut self, outcome: JobOutcome);
}

/// A [`JobController`] made of four closures.
pub struct Callbacks<P, O, E, D> {
    progress: P,
    overwrite_query: O,
    error: E,
    completion: D,
}

impl<P, O, E, D> Callbacks<P, O, E, D>
where
    P: FnMut(Option<&Path>, Option<&Path>, u8),
    O: FnMut(&OverwriteQuery, &Responder),
    E: FnMut(&Path, &str, &Responder),
    D: FnMut(JobOutcome),
{
    pub fn new(progress: P, overwrite_query: O, error: E, completion: D) -> Self {
        Self {
            progress,
            overwrite_query,
            error,
            completion,
        }
    }
}

impl<P, O, E, D> JobController for Callbacks<P, O, E, D>
where
    P: FnMut(Option<&Path>, Option<&Path>, u8),
    O: FnMut(&OverwriteQuery, &Responder),
    E: FnMut(&Path, &str, &Responder),
    D: FnMut(JobOutcome),
{
    fn progress(&mut self, source: Option<&Path>, dest: Option<&Path>, percent: u8) {
        (self.progress)(source, dest, percent)
    }

    fn overwrite_query(&mut self, query: &OverwriteQuery, responder: &Responder) {
        (self.overwrite_query)(query, responder)
    }

    fn error(&mut self, failed_path: &Path, description: &str, responder: &Responder) {
        (self.error)(failed_path, description, responder)
    }

    fn completion(&mut self, outcome: JobOutcome) {
        (self.completion)(outcome)
    }
}

/// Start a job on its own worker thread.
///
/// The descriptor and config are validated first. Nothing reaches `controller` until the
/// returned handle is driven.
pub fn start_job<C: JobController>(
    descriptor: JobDescriptor,
    config: EngineConfig,
    controller: C,
) -> Result<JobHandle<C>, JobError> {
    descriptor.validate()?;
    config.validate()?;

    let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
    let (requests_tx, requests) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(JobState::new()));
    let cancel = Arc::new(AtomicBool::new(false));
    let link = WorkerLink::new(requests_tx, Arc::clone(&state), Arc::clone(&cancel));

    let worker = thread::Builder::new()
        .name(format!("ferry-job-{id}"))
        .spawn(move || {
            let span = info_span!("job", id, operation = %descriptor.operation);
            let _entered = span.enter();
            let outcome = run_job(&descriptor, config, &link);
            link.finish(outcome);
        })
        .map_err(JobError::Spawn)?;

    Ok(JobHandle {
        id,
        requests,
        state,
        cancel,
        responder: Responder::new(),
        controller,
        worker: Some(worker),
        outcome: None,
    })
}

/// Requests cancellation of a job from anywhere, including from inside
/// controller callbacks.
#[derive(Debug, Clone)]
pub struct Canceller {
    flag: Arc<AtomicBool>,
}

impl Canceller {
    /// Ask the worker to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// The controller's handle on a running job.
///
/// Dropping an unfinished handle requests cancellation; with nobody left to
/// answer, the worker treats every question as a confirmed cancel.
pub struct JobHandle<C: JobController> {
    id: u64,
    requests: mpsc::UnboundedReceiver<Request>,
    state: Arc<Mutex<JobState>>,
    cancel: Arc<AtomicBool>,
    responder: Responder,
    controller: C,
    worker: Option<JoinHandle<()>>,
    outcome: Option<JobOutcome>,
}

impl<C: JobController> JobHandle<C> {
    /// Process-unique job number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the worker to stop at its next checkpoint.
    pub fn request_cancel(&self) {
        debug!(job = self.id, "cancellation requested");
        self.cancel.store(true, Ordering::Release);
    }

    /// A clonable way to request cancellation later.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Answer the outstanding overwrite query.
    pub fn answer_overwrite_query(
        &self,
        decision: crate::OverwriteDecision,
    ) -> Result<(), JobError> {
        self.responder.answer_overwrite_query(decision)
    }

    /// Answer the outstanding cancel confirmation.
    pub fn answer_cancel_confirm(&self, confirmed: bool) -> Result<(), JobError> {
        self.responder.answer_cancel_confirm(confirmed)
    }

    /// Acknowledge the outstanding fatal error.
    pub fn acknowledge_error(&self) -> Result<(), JobError> {
        self.responder.acknowledge_error()
    }

    /// A responder that can answer this job's questions from elsewhere.
    pub fn responder(&self) -> Responder {
        self.responder.clone()
    }

    /// Snapshot of the job state.
    pub fn state(&self) -> JobState {
        lock_state(&self.state).clone()
    }

    /// The final outcome, once completion has been dispatched.
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.outcome
    }

    /// Check if completion has been dispatched.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// The controller receiving this job's callbacks.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Deliver everything the worker has sent so far without blocking.
    ///
    /// Meant to be called from a controller's event loop. Returns true once
    /// completion has been dispatched.
    pub fn dispatch_pending(&mut self) -> bool {
        while !self.is_finished() {
            match self.requests.try_recv() {
                Ok(request) => self.dispatch(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.worker_vanished(),
            }
        }
        self.is_finished()
    }

    /// Block, dispatching callbacks, until the job ends; then join the
    /// worker.
    ///
    /// Questions must be answered from inside the callbacks or from another
    /// thread, since this thread is busy waiting. Must not be called from
    /// within an async runtime; use [`run_async`](Self::run_async) there.
    pub fn run(&mut self) -> Result<JobOutcome, JobError> {
        while !self.is_finished() {
            match self.requests.blocking_recv() {
                Some(request) => self.dispatch(request),
                None => self.worker_vanished(),
            }
        }
        self.join()?;
        Ok(self.outcome.unwrap_or(JobOutcome::Failed))
    }

    /// Wait for the next message from the worker and dispatch it.
    ///
    /// Returns true once completion has been dispatched; after that it
    /// returns immediately.
    pub async fn next_event(&mut self) -> bool {
        if !self.is_finished() {
            match self.requests.recv().await {
                Some(request) => self.dispatch(request),
                None => self.worker_vanished(),
            }
        }
        self.is_finished()
    }

    /// Await the job's end, dispatching callbacks as requests arrive.
    ///
    /// The worker has sent its last message when this returns; call
    /// [`join`](Self::join) to reap it.
    pub async fn run_async(&mut self) -> JobOutcome {
        while !self.next_event().await {}
        self.outcome.unwrap_or(JobOutcome::Failed)
    }

    /// Wait for the worker thread to exit.
    pub fn join(&mut self) -> Result<(), JobError> {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| JobError::WorkerPanicked),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, request: Request) {
        match request {
            Request::Progress { ack } => {
                let (source, dest, percent) = {
                    let state = lock_state(&self.state);
                    (
                        state.current_source.clone(),
                        state.current_dest.clone(),
                        state.percent(),
                    )
                };
                self.controller
                    .progress(source.as_deref(), dest.as_deref(), percent);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Request::Overwrite { query, reply } => {
                self.responder.park(Pending::Overwrite(reply));
                self.controller.overwrite_query(&query, &self.responder);
            }
            Request::Error {
                path,
                description,
                reply,
            } => {
                self.responder.park(Pending::Error(reply));
                self.controller.error(&path, &description, &self.responder);
            }
            Request::ConfirmCancel { reply } => {
                self.responder.park(Pending::ConfirmCancel(reply));
                self.controller.confirm_cancel(&self.responder);
            }
            Request::Finished(outcome) => self.complete(outcome),
        }
    }

    fn worker_vanished(&mut self) {
        warn!(job = self.id, "worker exited without reporting completion");
        self.complete(JobOutcome::Failed);
    }

    fn complete(&mut self, outcome: JobOutcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
            self.controller.completion(outcome);
        }
    }
}

impl<C: JobController> Drop for JobHandle<C> {
    fn drop(&mut self) {
        if !self.is_finished() {
            self.cancel.store(true, Ordering::Release);
        }
    }
}

/// Body of the worker thread.
fn run_job(descriptor: &JobDescriptor, config: EngineConfig, link: &WorkerLink) -> JobOutcome {
    info!(sources = descriptor.sources.len(), "job started");

    // Moves carry whole trees; links never look inside directories.
    let recursive = match descriptor.operation {
        Operation::Move => true,
        Operation::Link => false,
        _ => descriptor.recursive,
    };

    let totals = Prescanner::new(recursive)
        .with_cancel(link.cancel_flag())
        .scan(&descriptor.sources);
    link.update(|s| {
        s.total_bytes = totals.total_bytes;
        s.phase = JobPhase::Running;
    });
    link.publish_progress(false);

    let mut walker = Walker::new(link.clone(), config, recursive);
    let outcome = match process_sources(descriptor, &totals, &mut walker) {
        Ok(()) => {
            link.update(|s| s.phase = JobPhase::Done);
            link.publish_progress(false);
            JobOutcome::Succeeded
        }
        Err(Halt::Cancelled) => {
            link.update(|s| s.phase = JobPhase::Cancelled);
            JobOutcome::Cancelled
        }
        Err(Halt::Failed(err)) => {
            warn!(error = %err, "job failed");
            link.report_error(err.path(), &err.to_string());
            link.update(|s| s.phase = JobPhase::Cancelled);
            JobOutcome::Failed
        }
    };

    let summary = link.update(|s| s.summary());
    info!(%outcome, %summary, "job finished");
    outcome
}

fn process_sources(
    descriptor: &JobDescriptor,
    totals: &ScanTotals,
    walker: &mut Walker,
) -> Result<(), Halt> {
    let destination = descriptor.destination_dir.as_deref();
    if let Some(dir) = destination {
        ensure_directory(dir)?;
    }

    let mut chmod = ChmodAction::new(
        descriptor.permission_edits.clone(),
        descriptor.owner_uid,
        descriptor.group_gid,
    );

    for (index, source) in descriptor.sources.iter().enumerate() {
        let prescanned = totals.source_bytes(index);
        match (descriptor.operation, destination) {
            (Operation::Copy, Some(dir)) => {
                let dest = destination_for(source, dir)?;
                walker.walk_source(&mut TransferAction::copy(), source, Some(&dest), prescanned)?;
            }
            (Operation::Move, Some(dir)) => {
                let Ok(metadata) = fs::symlink_metadata(source) else {
                    debug!(path = %source.display(), "skipping vanished source");
                    continue;
                };
                let dest = destination_for(source, dir)?;
                let action = &mut TransferAction::moving(same_device(&metadata, dir)?);
                walker.walk_source(action, source, Some(&dest), prescanned)?;
            }
            (Operation::Link, Some(dir)) => {
                let dest = dir.join(file_name(source)?);
                walker.walk(&mut LinkAction, source, Some(&dest))?;
            }
            (Operation::Delete, _) => walker.walk(&mut DeleteAction, source, None)?,
            (Operation::ChmodChown, _) => walker.walk(&mut chmod, source, None)?,
            (operation, None) => {
                return Err(Halt::io(
                    source,
                    "place",
                    io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("{operation} has no destination directory"),
                    ),
                ));
            }
        }
    }

    Ok(())
}

/// Create the destination directory if it does not exist yet.
fn ensure_directory(dir: &Path) -> Result<(), Halt> {
    if fs::symlink_metadata(dir).is_ok() {
        return Ok(());
    }
    info!(path = %dir.display(), "creating destination directory");
    fs::create_dir_all(dir).map_err(|e| Halt::io(dir, "create directory", e))
}

fn file_name(source: &Path) -> Result<&std::ffi::OsStr, Halt> {
    source.file_name().ok_or_else(|| {
        Halt::io(
            source,
            "resolve name of",
            io::Error::new(ErrorKind::InvalidInput, "path has no file name"),
        )
    })
}

/// Destination of a top-level copy or move, refusing to place a directory
/// inside itself.
fn destination_for(source: &Path, dir: &Path) -> Result<PathBuf, Halt> {
    let dest = dir.join(file_name(source)?);

    if fs::symlink_metadata(source).is_ok_and(|m| m.is_dir()) && lands_inside(source, dir) {
        return Err(OperationError::IntoItself {
            path: source.to_path_buf(),
        }
        .into());
    }

    Ok(dest)
}
