//! Move support: device detection and the atomic rename fast path.

use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tracing::debug;

use crate::traversal::Halt;

/// Outcome of attempting an atomic rename.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RenameOutcome {
    /// The entry now lives at the destination.
    Renamed,
    /// The kernel refused to rename across file systems; copy instead.
    CrossDevice,
}

/// Check whether `source` and the destination directory share a device.
///
/// Decided once per top-level source.
pub(crate) fn same_device(source_meta: &Metadata, destination_dir: &Path) -> Result<bool, Halt> {
    let dest_meta = fs::metadata(destination_dir)
        .map_err(|e| Halt::io(destination_dir, "stat", e))?;
    Ok(source_meta.dev() == dest_meta.dev())
}

/// Rename `source` to `dest`, reporting a cross-device refusal instead of
/// failing so the caller can fall back to copying.
pub(crate) fn try_rename(source: &Path, dest: &Path) -> Result<RenameOutcome, Halt> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(RenameOutcome::Renamed),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            debug!(
                source = %source.display(),
                dest = %dest.display(),
                "rename crossed devices, falling back to copy"
            );
            Ok(RenameOutcome::CrossDevice)
        }
        Err(err) => Err(Halt::io(source, "rename", err)),
    }
}
