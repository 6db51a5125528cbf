//! Terminal controller: prints progress and answers questions on stdin.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ferry_ops::{
    JobController, JobOutcome, OverwriteDecision, OverwriteQuery, Responder, suggest_rename,
};

/// Progress stays hidden for jobs that finish faster than this.
const GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Preset answer for every conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Ask,
    Overwrite,
    Skip,
}

pub struct TerminalController {
    policy: ConflictPolicy,
    interactive: bool,
    quiet: bool,
    started: Instant,
    progress_shown: bool,
    pub failure: Option<String>,
}

impl TerminalController {
    pub fn new(policy: ConflictPolicy, interactive: bool, quiet: bool) -> Self {
        Self {
            policy,
            interactive,
            quiet,
            started: Instant::now(),
            progress_shown: false,
            failure: None,
        }
    }

    fn clear_progress_line(&mut self) {
        if self.progress_shown {
            eprint!("\r\x1b[2K");
            self.progress_shown = false;
        }
    }

    /// Ask until the answer parses. End of input cancels the job.
    fn prompt(&mut self, query: &OverwriteQuery) -> OverwriteDecision {
        self.clear_progress_line();

        let kind = if query.both_directories {
            "Directory"
        } else {
            "File"
        };
        eprintln!("{kind} {} already exists.", query.destination.display());
        let choices = if query.is_same_entry {
            "[r]ename, [s]kip, skip a[l]l, [c]ancel"
        } else {
            "[o]verwrite, overwrite [a]ll, [r]ename, [s]kip, skip a[l]l, [c]ancel"
        };

        loop {
            let Some(answer) = read_line(&format!("{choices}? ")) else {
                return OverwriteDecision::Cancel;
            };
            let decision = match answer.as_str() {
                "o" if !query.is_same_entry => OverwriteDecision::Overwrite,
                "a" if !query.is_same_entry => OverwriteDecision::OverwriteAll,
                "s" => OverwriteDecision::Skip,
                "l" => OverwriteDecision::SkipAll,
                "c" => OverwriteDecision::Cancel,
                "r" => match prompt_rename(&query.destination) {
                    Some(path) => OverwriteDecision::Rename(path),
                    None => continue,
                },
                _ => continue,
            };
            return decision;
        }
    }
}

/// Print `message` and read one trimmed line; `None` at end of input.
fn read_line(message: &str) -> Option<String> {
    eprint!("{message}");
    let _ = io::stderr().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn prompt_rename(destination: &Path) -> Option<PathBuf> {
    let suggestion = suggest_rename(destination);
    let name = suggestion.file_name()?.to_string_lossy().into_owned();
    let answer = read_line(&format!("New name [{name}]: "))?;
    if answer.is_empty() {
        Some(suggestion)
    } else {
        Some(PathBuf::from(answer))
    }
}

impl JobController for TerminalController {
    fn progress(&mut self, source: Option<&Path>, _dest: Option<&Path>, percent: u8) {
        if self.quiet || self.started.elapsed() < GRACE_PERIOD {
            return;
        }
        let name = source
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        eprint!("\r\x1b[2K{percent:>3}% {name}");
        let _ = io::stderr().flush();
        self.progress_shown = true;
    }

    fn overwrite_query(&mut self, query: &OverwriteQuery, responder: &Responder) {
        let decision = match self.policy {
            ConflictPolicy::Overwrite if !query.is_same_entry => OverwriteDecision::OverwriteAll,
            ConflictPolicy::Overwrite | ConflictPolicy::Skip => OverwriteDecision::SkipAll,
            ConflictPolicy::Ask if self.interactive => self.prompt(query),
            ConflictPolicy::Ask => OverwriteDecision::Skip,
        };
        tracing::debug!(?decision, dest = %query.destination.display(), "conflict answered");
        let _ = responder.answer_overwrite_query(decision);
    }

    fn error(&mut self, failed_path: &Path, description: &str, responder: &Responder) {
        self.clear_progress_line();
        self.failure = Some(format!("{}: {description}", failed_path.display()));
        let _ = responder.acknowledge_error();
    }

    fn confirm_cancel(&mut self, responder: &Responder) {
        let confirmed = !self.interactive
            || read_line("Cancel the job? [Y/n] ")
                .is_none_or(|a| !a.eq_ignore_ascii_case("n"));
        let _ = responder.answer_cancel_confirm(confirmed);
    }

    fn completion(&mut self, outcome: JobOutcome) {
        self.clear_progress_line();
        tracing::info!(%outcome, "job completed");
    }
}
