use std::collections::VecDeque;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use ferry_ops::{
    Canceller, ConfigError, EngineConfig, JobController, JobDescriptor, JobError, JobHandle,
    JobOutcome, JobPhase, OperationError, OverwriteDecision, OverwriteQuery, PermissionEdits, Responder, start_job, suggest_rename,
};
use tempfile::TempDir;

/// Records every callback and answers questions from queues.
#[derive(Default)]
struct Recorder {
    percents: Vec<u8>,
    queries: Vec<OverwriteQuery>,
    answers: VecDeque<OverwriteDecision>,
    errors: Vec<(PathBuf, String)>,
    cancel_answers: VecDeque<bool>,
    cancel_asks: usize,
    outcomes: Vec<JobOutcome>,
    cancel_at: Option<(u8, Arc<OnceLock<Canceller>>)>,
    cancel_fired: bool,
}

impl Recorder {
    fn answering(answers: impl IntoIterator<Item = OverwriteDecision>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Request cancellation from inside the first progress callback at or
    /// past `percent`.
    fn cancelling_at(percent: u8, slot: Arc<OnceLock<Canceller>>) -> Self {
        Self {
            cancel_at: Some((percent, slot)),
            ..Self::default()
        }
    }
}

impl JobController for Recorder {
    fn progress(&mut self, _source: Option<&Path>, _dest: Option<&Path>, percent: u8) {
        self.percents.push(percent);
        if let Some((threshold, slot)) = &self.cancel_at
            && !self.cancel_fired
            && percent >= *threshold
            && percent < 100
            && let Some(canceller) = slot.get()
        {
            canceller.cancel();
            self.cancel_fired = true;
        }
    }

    fn overwrite_query(&mut self, query: &OverwriteQuery, responder: &Responder) {
        self.queries.push(query.clone());
        let decision = self.answers.pop_front().unwrap_or(OverwriteDecision::Skip);
        responder.answer_overwrite_query(decision).unwrap();
    }

    fn error(&mut self, failed_path: &Path, description: &str, responder: &Responder) {
        self.errors
            .push((failed_path.to_path_buf(), description.to_string()));
        responder.acknowledge_error().unwrap();
    }

    fn confirm_cancel(&mut self, responder: &Responder) {
        self.cancel_asks += 1;
        let confirmed = self.cancel_answers.pop_front().unwrap_or(true);
        responder.answer_cancel_confirm(confirmed).unwrap();
    }

    fn completion(&mut self, outcome: JobOutcome) {
        self.outcomes.push(outcome);
    }
}

fn run(descriptor: JobDescriptor, config: EngineConfig, recorder: Recorder) -> JobHandle<Recorder> {
    let mut handle = start_job(descriptor, config, recorder).unwrap();
    handle.run().unwrap();
    handle
}

fn acknowledged() -> EngineConfig {
    EngineConfig::builder()
        .acknowledge_progress(true)
        .build()
        .unwrap()
}

fn write(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![b'x'; len]).unwrap();
}

fn mode(path: &Path) -> u32 {
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o7777
}

/// Source tree: `a.txt` (10 bytes) and `dir/` holding 20 bytes.
fn sample_tree(root: &Path) -> (PathBuf, PathBuf) {
    let a = root.join("src/a.txt");
    let dir = root.join("src/dir");
    write(&a, 10);
    write(&dir.join("b.bin"), 15);
    write(&dir.join("nested/c.bin"), 5);
    (a, dir)
}

#[test]
fn test_copy_file_and_directory() {
    let temp = TempDir::new().unwrap();
    let (a, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let job = JobDescriptor::copy(vec![a.clone(), dir.clone()], &out).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    let recorder = handle.controller();
    assert_eq!(recorder.outcomes, vec![JobOutcome::Succeeded]);
    assert!(recorder.queries.is_empty());
    assert_eq!(recorder.percents.last(), Some(&100));

    let state = handle.state();
    assert_eq!(state.total_bytes, 30);
    assert_eq!(state.processed_bytes, 30);
    assert_eq!(state.phase, JobPhase::Done);

    assert_eq!(fs::read(out.join("a.txt")).unwrap(), fs::read(&a).unwrap());
    assert_eq!(fs::read(out.join("dir/b.bin")).unwrap().len(), 15);
    assert_eq!(fs::read(out.join("dir/nested/c.bin")).unwrap().len(), 5);
    // Sources untouched.
    assert!(a.exists());
    assert!(dir.join("nested/c.bin").exists());
}

#[test]
fn test_copy_creates_missing_destination() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("deep/out");

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert!(out.join("a.txt").is_file());
}

#[test]
fn test_copy_preserves_mode_and_symlinks() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    write(&src.join("run.sh"), 4);
    fs::set_permissions(src.join("run.sh"), fs::Permissions::from_mode(0o750)).unwrap();
    std::os::unix::fs::symlink("run.sh", src.join("alias")).unwrap();
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let job = JobDescriptor::copy(vec![src], &out).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert_eq!(mode(&out.join("src/run.sh")), 0o750);
    assert_eq!(
        fs::read_link(out.join("src/alias")).unwrap(),
        PathBuf::from("run.sh")
    );
}

#[test]
fn test_rename_answer_keeps_both() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();
    fs::write(out.join("a.txt"), "old").unwrap();

    let renamed = suggest_rename(&out.join("a.txt"));
    assert_eq!(renamed, out.join("a (copy).txt"));

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Rename(renamed.clone())]),
    );

    let recorder = handle.controller();
    assert_eq!(recorder.outcomes, vec![JobOutcome::Succeeded]);
    assert_eq!(recorder.queries.len(), 1);
    assert_eq!(recorder.queries[0].destination, out.join("a.txt"));
    assert!(!recorder.queries[0].is_same_entry);

    assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "old");
    assert_eq!(fs::read(&renamed).unwrap().len(), 10);
    assert!(!handle.state().overwrite_all);
}

#[test]
fn test_relative_rename_resolves_next_to_destination() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();
    fs::write(out.join("a.txt"), "old").unwrap();

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Rename("renamed.txt".into())]),
    );

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert!(out.join("renamed.txt").is_file());
}

#[test]
fn test_rename_onto_another_existing_name_asks_again() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();
    fs::write(out.join("a.txt"), "old").unwrap();
    fs::write(out.join("taken.txt"), "taken").unwrap();

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([
            OverwriteDecision::Rename(out.join("taken.txt")),
            OverwriteDecision::Rename(out.join("free.txt")),
        ]),
    );

    let recorder = handle.controller();
    assert_eq!(recorder.queries.len(), 2);
    assert_eq!(recorder.queries[1].destination, out.join("taken.txt"));
    assert_eq!(fs::read_to_string(out.join("taken.txt")).unwrap(), "taken");
    assert!(out.join("free.txt").is_file());
}

#[test]
fn test_skip_all_stops_queries() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let out = temp.path().join("out");
    let names = ["one", "two", "three"];
    for name in names {
        write(&src.join(name), 8);
        write(&out.join(name), 1);
    }

    let sources = names.iter().map(|n| src.join(n)).collect();
    let job = JobDescriptor::copy(sources, &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::SkipAll]),
    );

    let recorder = handle.controller();
    assert_eq!(recorder.queries.len(), 1);
    assert_eq!(recorder.outcomes, vec![JobOutcome::Succeeded]);
    for name in names {
        assert_eq!(fs::read(out.join(name)).unwrap().len(), 1);
    }

    let state = handle.state();
    assert!(state.skip_all);
    assert_eq!(state.items_skipped, 3);
    assert_eq!(state.percent(), 100);
}

#[test]
fn test_overwrite_all_stops_queries() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let out = temp.path().join("out");
    let names = ["one", "two", "three"];
    for name in names {
        write(&src.join(name), 8);
        write(&out.join(name), 1);
    }

    let sources = names.iter().map(|n| src.join(n)).collect();
    let job = JobDescriptor::copy(sources, &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::OverwriteAll]),
    );

    assert_eq!(handle.controller().queries.len(), 1);
    assert!(handle.state().overwrite_all);
    for name in names {
        assert_eq!(fs::read(out.join(name)).unwrap().len(), 8);
    }
}

#[test]
fn test_overwrite_does_not_follow_destination_symlink() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();
    let victim = temp.path().join("victim");
    fs::write(&victim, "keep").unwrap();
    std::os::unix::fs::symlink(&victim, out.join("a.txt")).unwrap();

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Overwrite]),
    );

    assert_eq!(fs::read_to_string(&victim).unwrap(), "keep");
    assert!(!fs::symlink_metadata(out.join("a.txt")).unwrap().is_symlink());
    assert_eq!(fs::read(out.join("a.txt")).unwrap().len(), 10);
}

#[test]
fn test_recopy_with_overwrite_all_is_identical() {
    let temp = TempDir::new().unwrap();
    let (a, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");

    let job = JobDescriptor::copy(vec![a.clone(), dir.clone()], &out).unwrap();
    run(job.clone(), EngineConfig::default(), Recorder::default());

    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::OverwriteAll]),
    );
    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));

    assert_eq!(fs::read(out.join("a.txt")).unwrap(), fs::read(&a).unwrap());
    assert_eq!(
        fs::read(out.join("dir/b.bin")).unwrap(),
        fs::read(dir.join("b.bin")).unwrap()
    );
    assert_eq!(
        fs::read(out.join("dir/nested/c.bin")).unwrap(),
        fs::read(dir.join("nested/c.bin")).unwrap()
    );
    assert_eq!(fs::read_dir(out.join("dir")).unwrap().count(), 2);
}

#[test]
fn test_copy_onto_itself_only_offers_rename() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let src = temp.path().join("src");

    let job = JobDescriptor::copy(vec![a.clone()], &src).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Overwrite]),
    );

    let recorder = handle.controller();
    assert_eq!(recorder.queries.len(), 1);
    assert!(recorder.queries[0].is_same_entry);
    assert_eq!(fs::read(&a).unwrap().len(), 10);
    assert_eq!(handle.state().items_skipped, 1);
}

#[test]
fn test_copy_directory_into_itself_fails() {
    let temp = TempDir::new().unwrap();
    let (_, dir) = sample_tree(temp.path());
    let inside = dir.join("nested");

    let job = JobDescriptor::copy(vec![dir.clone()], &inside).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    let recorder = handle.controller();
    assert_eq!(recorder.outcomes, vec![JobOutcome::Failed]);
    assert_eq!(recorder.errors.len(), 1);
    assert_eq!(recorder.errors[0].0, dir);
    assert!(!inside.join("dir").exists());
}

#[test]
fn test_rename_into_source_directory_fails() {
    let temp = TempDir::new().unwrap();
    let (_, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir_all(out.join("dir")).unwrap();
    let inside = dir.join("nested/copy");

    let job = JobDescriptor::copy(vec![dir.clone()], &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Rename(inside.clone())]),
    );

    let recorder = handle.controller();
    assert_eq!(recorder.queries.len(), 1);
    assert_eq!(recorder.outcomes, vec![JobOutcome::Failed]);
    assert_eq!(recorder.errors.len(), 1);
    assert_eq!(recorder.errors[0].0, dir);
    assert_eq!(
        recorder.errors[0].1,
        OperationError::IntoItself { path: dir.clone() }.to_string()
    );
    assert!(!inside.exists());
    assert!(fs::read_dir(out.join("dir")).unwrap().next().is_none());
}

#[test]
fn test_cancel_answer_stops_job() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let out = temp.path().join("out");
    for name in ["one", "two"] {
        write(&src.join(name), 4);
        write(&out.join(name), 1);
    }

    let job = JobDescriptor::copy(vec![src.join("one"), src.join("two")], &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Cancel]),
    );

    let recorder = handle.controller();
    assert_eq!(recorder.queries.len(), 1);
    assert_eq!(recorder.outcomes, vec![JobOutcome::Cancelled]);
    assert_eq!(handle.state().phase, JobPhase::Cancelled);
}

#[test]
fn test_fatal_error_is_reported_once() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let not_a_dir = temp.path().join("plain");
    fs::write(&not_a_dir, "x").unwrap();

    let job = JobDescriptor::copy(vec![a], &not_a_dir).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    let recorder = handle.controller();
    assert_eq!(recorder.errors.len(), 1);
    assert_eq!(recorder.errors[0].0, not_a_dir.join("a.txt"));
    assert!(recorder.errors[0].1.contains("Failed to create"));
    assert_eq!(recorder.outcomes, vec![JobOutcome::Failed]);

    let state = handle.state();
    assert_eq!(state.phase, JobPhase::Cancelled);
    assert!(state.last_error.is_none());
}

#[test]
fn test_missing_source_is_skipped() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");

    let job = JobDescriptor::copy(vec![temp.path().join("ghost"), a], &out).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert!(handle.controller().errors.is_empty());
    assert!(out.join("a.txt").is_file());
    assert!(!out.join("ghost").exists());
}

#[test]
fn test_empty_job_succeeds() {
    let temp = TempDir::new().unwrap();
    let job = JobDescriptor::copy(Vec::new(), temp.path()).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    let recorder = handle.controller();
    assert_eq!(recorder.outcomes, vec![JobOutcome::Succeeded]);
    assert_eq!(recorder.percents.last(), Some(&100));
}

#[test]
fn test_move_same_device_removes_sources() {
    let temp = TempDir::new().unwrap();
    let (a, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let job = JobDescriptor::move_to(vec![a.clone(), dir.clone()], &out).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert!(!a.exists());
    assert!(!dir.exists());
    assert_eq!(fs::read(out.join("a.txt")).unwrap().len(), 10);
    assert_eq!(fs::read(out.join("dir/nested/c.bin")).unwrap().len(), 5);
    assert_eq!(handle.state().percent(), 100);
}

#[test]
fn test_move_merge_keeps_skipped_entries() {
    let temp = TempDir::new().unwrap();
    let (_, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");
    write(&out.join("dir/b.bin"), 1);

    let job = JobDescriptor::move_to(vec![dir.clone()], &out).unwrap();
    let handle = run(
        job,
        EngineConfig::default(),
        // Merge the directories, then keep the existing file.
        Recorder::answering([OverwriteDecision::Overwrite, OverwriteDecision::Skip]),
    );

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert_eq!(handle.controller().queries.len(), 2);
    assert!(handle.controller().queries[0].both_directories);
    assert_eq!(fs::read(out.join("dir/b.bin")).unwrap().len(), 1);
    assert!(out.join("dir/nested/c.bin").is_file());
    // The skipped file stays behind, and so does its directory.
    assert!(dir.join("b.bin").is_file());
    assert!(!dir.join("nested").exists());
}

#[test]
fn test_delete_tree() {
    let temp = TempDir::new().unwrap();
    let (a, dir) = sample_tree(temp.path());

    let job = JobDescriptor::delete(vec![a.clone(), dir.clone()]).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert!(!a.exists());
    assert!(!dir.exists());
    assert!(temp.path().join("src").exists());
    assert_eq!(handle.state().percent(), 100);
}

#[test]
fn test_delete_symlink_leaves_target() {
    let temp = TempDir::new().unwrap();
    let (_, dir) = sample_tree(temp.path());
    let link = temp.path().join("link");
    std::os::unix::fs::symlink(&dir, &link).unwrap();

    let job = JobDescriptor::delete(vec![link.clone()]).unwrap();
    run(job, EngineConfig::default(), Recorder::default());

    assert!(fs::symlink_metadata(&link).is_err());
    assert!(dir.join("b.bin").is_file());
}

#[test]
fn test_chmod_recursive() {
    let temp = TempDir::new().unwrap();
    let (_, dir) = sample_tree(temp.path());
    fs::set_permissions(dir.join("b.bin"), fs::Permissions::from_mode(0o644)).unwrap();

    let edits = PermissionEdits::parse("g+w,o-r").unwrap();
    let job = JobDescriptor::chmod(vec![dir.clone()], edits, true).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert_eq!(mode(&dir.join("b.bin")), 0o660);
    assert_eq!(mode(&dir) & 0o024, 0o020);
    assert_eq!(mode(&dir.join("nested")) & 0o024, 0o020);
}

#[test]
fn test_chmod_not_recursive() {
    let temp = TempDir::new().unwrap();
    let (_, dir) = sample_tree(temp.path());
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
    fs::set_permissions(dir.join("b.bin"), fs::Permissions::from_mode(0o644)).unwrap();

    let edits = PermissionEdits::parse("700").unwrap();
    let job = JobDescriptor::chmod(vec![dir.clone()], edits, false).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert_eq!(mode(&dir), 0o700);
    assert_eq!(mode(&dir.join("b.bin")), 0o644);
}

#[test]
fn test_link_places_symlinks() {
    let temp = TempDir::new().unwrap();
    let (a, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let job = JobDescriptor::link(vec![a.clone(), dir.clone()], &out).unwrap();
    let handle = run(job, EngineConfig::default(), Recorder::default());

    assert_eq!(handle.outcome(), Some(JobOutcome::Succeeded));
    assert_eq!(fs::read_link(out.join("a.txt")).unwrap(), a);
    assert_eq!(fs::read_link(out.join("dir")).unwrap(), dir);
    assert_eq!(handle.state().items_done, 2);
}

#[test]
fn test_cancel_during_copy_stops_immediately() {
    let temp = TempDir::new().unwrap();
    let big = temp.path().join("big.bin");
    write(&big, 1 << 20);
    let out = temp.path().join("out");

    let slot = Arc::new(OnceLock::new());
    let config = EngineConfig::builder()
        .chunk_size(1024usize)
        .acknowledge_progress(true)
        .build()
        .unwrap();
    let job = JobDescriptor::copy(vec![big], &out).unwrap();
    let mut handle = start_job(job, config, Recorder::cancelling_at(10, Arc::clone(&slot))).unwrap();
    slot.set(handle.canceller()).unwrap();

    assert_eq!(handle.run().unwrap(), JobOutcome::Cancelled);

    let recorder = handle.controller();
    assert!(recorder.cancel_fired);
    assert_eq!(recorder.cancel_asks, 0);
    assert_eq!(recorder.outcomes, vec![JobOutcome::Cancelled]);

    // The partial file stays.
    let copied = fs::metadata(out.join("big.bin")).unwrap().len();
    assert!(copied < 1 << 20);
    assert!(copied > 0);
}

fn many_files(root: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = root.join(format!("f{i:02}"));
            write(&path, 100);
            path
        })
        .collect()
}

#[test]
fn test_declined_cancel_continues() {
    let temp = TempDir::new().unwrap();
    let files = many_files(temp.path(), 50);

    let slot = Arc::new(OnceLock::new());
    let mut recorder = Recorder::cancelling_at(10, Arc::clone(&slot));
    recorder.cancel_answers.push_back(false);

    let job = JobDescriptor::delete(files.clone()).unwrap();
    let mut handle = start_job(job, acknowledged(), recorder).unwrap();
    slot.set(handle.canceller()).unwrap();

    assert_eq!(handle.run().unwrap(), JobOutcome::Succeeded);
    assert_eq!(handle.controller().cancel_asks, 1);
    assert!(files.iter().all(|f| !f.exists()));
}

#[test]
fn test_confirmed_cancel_stops_between_items() {
    let temp = TempDir::new().unwrap();
    let files = many_files(temp.path(), 50);

    let slot = Arc::new(OnceLock::new());
    let job = JobDescriptor::delete(files.clone()).unwrap();
    let mut handle = start_job(
        job,
        acknowledged(),
        Recorder::cancelling_at(10, Arc::clone(&slot)),
    )
    .unwrap();
    slot.set(handle.canceller()).unwrap();

    assert_eq!(handle.run().unwrap(), JobOutcome::Cancelled);
    assert_eq!(handle.controller().cancel_asks, 1);
    assert_eq!(handle.state().phase, JobPhase::Cancelled);

    let remaining = files.iter().filter(|f| f.exists()).count();
    assert!(remaining > 0);
    assert!(remaining < 50);
}

#[test]
fn test_cancel_without_confirmation() {
    let temp = TempDir::new().unwrap();
    let files = many_files(temp.path(), 50);

    let slot = Arc::new(OnceLock::new());
    let config = EngineConfig::builder()
        .acknowledge_progress(true)
        .confirm_cancel(false)
        .build()
        .unwrap();
    let job = JobDescriptor::delete(files).unwrap();
    let mut handle = start_job(job, config, Recorder::cancelling_at(10, Arc::clone(&slot))).unwrap();
    slot.set(handle.canceller()).unwrap();

    assert_eq!(handle.run().unwrap(), JobOutcome::Cancelled);
    assert_eq!(handle.controller().cancel_asks, 0);
}

#[test]
fn test_acknowledged_progress_is_monotonic() {
    let temp = TempDir::new().unwrap();
    let files = many_files(temp.path(), 20);

    let job = JobDescriptor::delete(files).unwrap();
    let handle = run(job, acknowledged(), Recorder::default());

    let percents = &handle.controller().percents;
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn test_invalid_descriptor_is_rejected() {
    let mut job = JobDescriptor::delete(vec!["/tmp/x".into()]).unwrap();
    job.sources = vec!["relative".into()];

    assert!(start_job(job, EngineConfig::default(), Recorder::default()).is_err());
}

#[test]
fn test_zero_chunk_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");
    let config = EngineConfig {
        chunk_size: 0,
        ..EngineConfig::default()
    };

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let result = start_job(job, config, Recorder::default());
    assert!(matches!(
        result.err(),
        Some(JobError::Config(ConfigError::ZeroChunkSize))
    ));
    // Rejected before any worker touched the filesystem.
    assert!(!out.exists());
}

#[test]
fn test_dispatch_pending_polling() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let mut handle = start_job(job, EngineConfig::default(), Recorder::default()).unwrap();
    while !handle.dispatch_pending() {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    handle.join().unwrap();

    assert_eq!(handle.controller().outcomes, vec![JobOutcome::Succeeded]);
    // Dispatching after completion changes nothing.
    assert!(handle.dispatch_pending());
    assert_eq!(handle.controller().outcomes.len(), 1);
}

#[test]
fn test_answer_from_outside_callback() {
    struct Deferred {
        parked: Option<Responder>,
        outcome: Option<JobOutcome>,
    }

    impl JobController for Deferred {
        fn progress(&mut self, _: Option<&Path>, _: Option<&Path>, _: u8) {}

        fn overwrite_query(&mut self, _query: &OverwriteQuery, responder: &Responder) {
            self.parked = Some(responder.clone());
        }

        fn error(&mut self, _: &Path, _: &str, responder: &Responder) {
            responder.acknowledge_error().unwrap();
        }

        fn completion(&mut self, outcome: JobOutcome) {
            self.outcome = Some(outcome);
        }
    }

    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());
    let out = temp.path().join("out");
    write(&out.join("a.txt"), 1);

    let job = JobDescriptor::copy(vec![a], &out).unwrap();
    let controller = Deferred {
        parked: None,
        outcome: None,
    };
    let mut handle = start_job(job, EngineConfig::default(), controller).unwrap();

    while handle.controller().parked.is_none() {
        handle.dispatch_pending();
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert_eq!(handle.state().phase, JobPhase::AwaitingOverwriteDecision);
    // A mismatched answer leaves the question open.
    assert!(handle.acknowledge_error().is_err());
    handle
        .answer_overwrite_query(OverwriteDecision::Overwrite)
        .unwrap();

    assert_eq!(handle.run().unwrap(), JobOutcome::Succeeded);
    assert_eq!(fs::read(out.join("a.txt")).unwrap().len(), 10);
}

#[tokio::test]
async fn test_run_async() {
    let temp = TempDir::new().unwrap();
    let (a, dir) = sample_tree(temp.path());
    let out = temp.path().join("out");
    write(&out.join("a.txt"), 1);

    let job = JobDescriptor::copy(vec![a, dir], &out).unwrap();
    let mut handle = start_job(
        job,
        EngineConfig::default(),
        Recorder::answering([OverwriteDecision::Overwrite]),
    )
    .unwrap();

    assert_eq!(handle.run_async().await, JobOutcome::Succeeded);
    handle.join().unwrap();
    assert_eq!(handle.controller().queries.len(), 1);
    assert_eq!(fs::read(out.join("a.txt")).unwrap().len(), 10);
}

#[tokio::test]
async fn test_next_event_steps_until_completion() {
    let temp = TempDir::new().unwrap();
    let (a, _) = sample_tree(temp.path());

    let job = JobDescriptor::delete(vec![a.clone()]).unwrap();
    let mut handle = start_job(job, EngineConfig::default(), Recorder::default()).unwrap();

    let mut events = 0;
    while !handle.next_event().await {
        events += 1;
    }
    assert!(events >= 1);
    assert!(handle.next_event().await);
    assert_eq!(handle.controller().outcomes, vec![JobOutcome::Succeeded]);
    assert!(!a.exists());
}
