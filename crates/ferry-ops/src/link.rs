//! Symlink creation.

use std::fs::Metadata;
use std::os::unix::fs::symlink;
use std::path::Path;

use crate::conflict::{Resolution, clear_destination};
use crate::traversal::{Halt, ItemAction, Visit, Walker};

/// Places a symlink to each source in the destination directory.
///
/// Directories are linked as a whole, never descended.
#[derive(Debug, Default)]
pub(crate) struct LinkAction;

impl LinkAction {
    fn link(
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt> {
        let Some(dest) = dest else {
            return Ok(());
        };

        let dest = match walker.resolve_conflict(source, metadata, dest)? {
            Resolution::Proceed { dest, existing } => {
                if let Some(existing) = &existing {
                    clear_destination(&dest, existing, false)?;
                }
                dest
            }
            Resolution::Skip => {
                walker.account(own_bytes(metadata));
                return Ok(());
            }
        };

        symlink(source, &dest).map_err(|e| Halt::io(&dest, "create symlink", e))?;
        walker.account(own_bytes(metadata));
        walker.item_done();
        Ok(())
    }
}

impl ItemAction for LinkAction {
    fn enter_dir(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<Visit, Halt> {
        Self::link(walker, source, dest, metadata)?;
        Ok(Visit::Skip)
    }

    fn leaf(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt> {
        Self::link(walker, source, dest, metadata)
    }
}

/// Directories count nothing toward the total; a link to one accounts the
/// same.
fn own_bytes(metadata: &Metadata) -> u64 {
    if metadata.is_dir() { 0 } else { metadata.len() }
}
