//! Conflict detection and resolution for operations that create entries.

use std::fs::{self, Metadata};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ferry_core::OperationError;

use crate::traversal::{Halt, Walker};

/// Question sent to the controller when a destination already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteQuery {
    /// The entry being copied, moved or linked.
    pub source: PathBuf,
    /// The existing destination entry.
    pub destination: PathBuf,
    /// Source and destination are the same file system entry; only a rename
    /// makes sense.
    pub is_same_entry: bool,
    /// Both are directories (an overwrite merges them).
    pub both_directories: bool,
}

/// The controller's answer to an [`OverwriteQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteDecision {
    /// Replace this destination.
    Overwrite,
    /// Replace this and every later destination of the same kind.
    OverwriteAll,
    /// Try again with another destination path.
    Rename(PathBuf),
    /// Leave this item alone.
    Skip,
    /// Leave this and every later conflicting item alone.
    SkipAll,
    /// Stop the whole job.
    Cancel,
}

impl OverwriteDecision {
    /// Check if this decision applies to all remaining conflicts.
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::SkipAll | Self::OverwriteAll)
    }
}

/// How the engine proceeds with one item after conflict resolution.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// Create the entry at `dest`. `existing` is set when something is
    /// there and must be replaced or merged into.
    Proceed {
        dest: PathBuf,
        existing: Option<Metadata>,
    },
    Skip,
}

fn same_entry(a: &Metadata, b: &Metadata) -> bool {
    a.dev() == b.dev() && a.ino() == b.ino()
}

/// Whether `dir` is the directory `source` or lies somewhere below it.
///
/// Both sides are resolved first, so symlinked paths are caught. A path that
/// cannot be resolved is not inside anything.
pub(crate) fn lands_inside(source: &Path, dir: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(dir)) {
        (Ok(source), Ok(dir)) => dir.starts_with(source),
        _ => false,
    }
}

impl Walker {
    /// Decide what to do about `dest` before creating it.
    ///
    /// Sticky answers short-circuit the controller. `Rename` answers loop
    /// until a free path is found or another answer is given.
    pub(crate) fn resolve_conflict(
        &mut self,
        source: &Path,
        source_meta: &Metadata,
        dest: &Path,
    ) -> Result<Resolution, Halt> {
        let mut candidate = dest.to_path_buf();

        loop {
            let existing = match fs::symlink_metadata(&candidate) {
                Ok(m) => m,
                Err(_) => {
                    return Ok(Resolution::Proceed {
                        dest: candidate,
                        existing: None,
                    });
                }
            };

            let is_same_entry = same_entry(source_meta, &existing);
            let same_kind = source_meta.is_dir() == existing.is_dir();
            let (skip_all, overwrite_all) = self.link.update(|s| (s.skip_all, s.overwrite_all));

            if skip_all {
                self.item_skipped();
                return Ok(Resolution::Skip);
            }
            if overwrite_all && !is_same_entry && same_kind {
                return Ok(Resolution::Proceed {
                    dest: candidate,
                    existing: Some(existing),
                });
            }

            let query = OverwriteQuery {
                source: source.to_path_buf(),
                destination: candidate.clone(),
                is_same_entry,
                both_directories: source_meta.is_dir() && existing.is_dir(),
            };
            let decision = self.link.ask_overwrite(query);
            debug!(dest = %candidate.display(), ?decision, "conflict answered");

            match decision {
                OverwriteDecision::Overwrite | OverwriteDecision::OverwriteAll => {
                    if decision.is_sticky() {
                        self.link.update(|s| s.overwrite_all = true);
                    }
                    if is_same_entry {
                        warn!(
                            path = %candidate.display(),
                            "refusing to overwrite an entry with itself, skipping"
                        );
                        self.item_skipped();
                        return Ok(Resolution::Skip);
                    }
                    return Ok(Resolution::Proceed {
                        dest: candidate,
                        existing: Some(existing),
                    });
                }
                OverwriteDecision::Skip | OverwriteDecision::SkipAll => {
                    if decision.is_sticky() {
                        self.link.update(|s| s.skip_all = true);
                    }
                    self.item_skipped();
                    return Ok(Resolution::Skip);
                }
                OverwriteDecision::Rename(new_path) => {
                    candidate = if new_path.is_absolute() {
                        new_path
                    } else {
                        candidate
                            .parent()
                            .unwrap_or(Path::new("/"))
                            .join(new_path)
                    };
                    if source_meta.is_dir()
                        && candidate.parent().is_some_and(|p| lands_inside(source, p))
                    {
                        return Err(OperationError::IntoItself {
                            path: source.to_path_buf(),
                        }
                        .into());
                    }
                }
                OverwriteDecision::Cancel => return Err(Halt::Cancelled),
            }
        }
    }
}

/// Make room for a new entry at `dest`.
///
/// A directory replacing a directory merges into it, so nothing is removed.
/// Anything else is removed first; in particular an existing non-directory
/// is always unlinked so new data never goes through an old symlink.
pub(crate) fn clear_destination(
    dest: &Path,
    existing: &Metadata,
    source_is_dir: bool,
) -> Result<(), Halt> {
    match (existing.is_dir(), source_is_dir) {
        (true, true) => Ok(()),
        (true, false) => {
            fs::remove_dir_all(dest).map_err(|e| Halt::io(dest, "remove directory", e))
        }
        (false, _) => fs::remove_file(dest).map_err(|e| Halt::io(dest, "remove", e)),
    }
}

/// Suggest a free name next to `path` for a controller's rename prompt.
///
/// For "file.txt", tries "file (copy).txt", "file (copy 2).txt", etc.
pub fn suggest_rename(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let candidate = |n: u32| {
        let label = if n == 1 {
            "copy".to_string()
        } else {
            format!("copy {n}")
        };
        let name = match &extension {
            Some(ext) => format!("{stem} ({label}).{ext}"),
            None => format!("{stem} ({label})"),
        };
        parent.join(name)
    };

    (1..10_000)
        .map(candidate)
        .find(|p| fs::symlink_metadata(p).is_err())
        .unwrap_or_else(|| candidate(10_000))
}
