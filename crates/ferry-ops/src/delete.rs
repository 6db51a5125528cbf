//! Depth-first removal.

use std::fs::{self, Metadata};
use std::path::Path;

use crate::traversal::{Halt, ItemAction, Visit, Walker};

/// Removes every visited entry, children before their directory.
///
/// The first failure halts the job: a directory that could not be emptied
/// makes further removal unsafe to reason about.
#[derive(Debug, Default)]
pub(crate) struct DeleteAction;

impl ItemAction for DeleteAction {
    fn enter_dir(
        &mut self,
        _walker: &mut Walker,
        _source: &Path,
        _dest: Option<&Path>,
        _metadata: &Metadata,
    ) -> Result<Visit, Halt> {
        Ok(Visit::Descend(None))
    }

    fn leave_dir(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        _dest: Option<&Path>,
        _metadata: &Metadata,
    ) -> Result<(), Halt> {
        fs::remove_dir(source).map_err(|e| Halt::io(source, "remove directory", e))?;
        walker.item_done();
        Ok(())
    }

    fn leaf(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        _dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt> {
        fs::remove_file(source).map_err(|e| Halt::io(source, "remove", e))?;
        walker.account(metadata.len());
        walker.item_done();
        Ok(())
    }
}
