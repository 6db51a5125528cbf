//! Copy, and the copy half of cross-device moves.

use std::fs::{self, DirBuilder, File, Metadata, OpenOptions, Permissions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt, symlink};
use std::path::Path;

use tracing::{debug, warn};

use crate::conflict::{Resolution, clear_destination};
use crate::move_op::{RenameOutcome, try_rename};
use crate::traversal::{Halt, ItemAction, Visit, Walker};

/// How entries reach their destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    Copy,
    /// Move; with `same_device` entries are renamed where possible,
    /// otherwise each one is copied and the original removed.
    Move { same_device: bool },
}

/// Creates each visited entry at its destination.
#[derive(Debug)]
pub(crate) struct TransferAction {
    mode: Transfer,
}

impl TransferAction {
    pub(crate) fn copy() -> Self {
        Self {
            mode: Transfer::Copy,
        }
    }

    pub(crate) fn moving(same_device: bool) -> Self {
        Self {
            mode: Transfer::Move { same_device },
        }
    }

    fn is_move(&self) -> bool {
        matches!(self.mode, Transfer::Move { .. })
    }

    fn may_rename(&self) -> bool {
        self.mode == Transfer::Move { same_device: true }
    }
}

impl ItemAction for TransferAction {
    fn enter_dir(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<Visit, Halt> {
        let Some(dest) = dest else {
            return Ok(Visit::Skip);
        };

        let (dest, existing) = match walker.resolve_conflict(source, metadata, dest)? {
            Resolution::Proceed { dest, existing } => (dest, existing),
            Resolution::Skip => {
                let bytes = walker.subtree_bytes(source);
                walker.account(bytes);
                return Ok(Visit::Skip);
            }
        };

        let merging = existing.as_ref().is_some_and(Metadata::is_dir);
        if let Some(existing) = &existing {
            clear_destination(&dest, existing, true)?;
        }

        if self.may_rename() && !merging {
            let bytes = walker.subtree_bytes(source);
            if try_rename(source, &dest)? == RenameOutcome::Renamed {
                walker.account(bytes);
                walker.item_done();
                return Ok(Visit::Skip);
            }
        }

        if !merging {
            DirBuilder::new()
                .mode((metadata.mode() & 0o7777) | 0o700)
                .create(&dest)
                .map_err(|e| Halt::io(&dest, "create directory", e))?;
        }

        Ok(Visit::Descend(Some(dest)))
    }

    fn leave_dir(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt> {
        if let Some(dest) = dest {
            restore_mode(dest, metadata);
        }

        if self.is_move() {
            match fs::remove_dir(source) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => {
                    debug!(path = %source.display(), "keeping source directory with skipped entries");
                }
                Err(err) => return Err(Halt::io(source, "remove directory", err)),
            }
        }

        walker.item_done();
        Ok(())
    }

    fn leaf(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt> {
        let Some(dest) = dest else {
            return Ok(());
        };

        let (dest, existing) = match walker.resolve_conflict(source, metadata, dest)? {
            Resolution::Proceed { dest, existing } => (dest, existing),
            Resolution::Skip => {
                walker.account(metadata.len());
                return Ok(());
            }
        };

        if let Some(existing) = &existing {
            clear_destination(&dest, existing, false)?;
        }

        if self.may_rename() && try_rename(source, &dest)? == RenameOutcome::Renamed {
            walker.account(metadata.len());
            walker.item_done();
            return Ok(());
        }

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            copy_symlink(source, &dest)?;
            walker.account(metadata.len());
        } else if file_type.is_file() {
            copy_contents(walker, source, &dest, metadata)?;
        } else {
            warn!(path = %source.display(), "skipping special file");
            walker.account(metadata.len());
            walker.item_skipped();
            return Ok(());
        }

        if self.is_move() {
            fs::remove_file(source).map_err(|e| Halt::io(source, "remove", e))?;
        }

        walker.item_done();
        Ok(())
    }
}

/// Recreate a symlink with the same target. The target is never read.
fn copy_symlink(source: &Path, dest: &Path) -> Result<(), Halt> {
    let target = fs::read_link(source).map_err(|e| Halt::io(source, "read link", e))?;
    symlink(&target, dest).map_err(|e| Halt::io(dest, "create symlink", e))
}

/// Stream a regular file in `chunk_size` pieces.
///
/// Cancellation is checked before every chunk and honoured immediately;
/// whatever was written so far stays in place.
fn copy_contents(
    walker: &mut Walker,
    source: &Path,
    dest: &Path,
    metadata: &Metadata,
) -> Result<(), Halt> {
    let mut reader = File::open(source).map_err(|e| Halt::io(source, "open", e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(metadata.mode() & 0o777)
        .open(dest)
        .map_err(|e| Halt::io(dest, "create", e))?;

    let mut buffer = vec![0u8; walker.config.chunk_size];
    loop {
        if walker.interrupted() {
            debug!(path = %dest.display(), "cancelled during copy");
            return Err(Halt::Cancelled);
        }

        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(Halt::io(source, "read", err)),
        };

        writer
            .write_all(&buffer[..read])
            .map_err(|e| Halt::io(dest, "write", e))?;
        walker.account(read as u64);
    }

    restore_mode(dest, metadata);
    Ok(())
}

/// Give `dest` the source's permission bits. Failure only loses metadata,
/// so it is logged rather than halting the job.
fn restore_mode(dest: &Path, metadata: &Metadata) {
    let permissions = Permissions::from_mode(metadata.mode() & 0o7777);
    if let Err(err) = fs::set_permissions(dest, permissions) {
        warn!(path = %dest.display(), error = %err, "could not preserve permissions");
    }
}
