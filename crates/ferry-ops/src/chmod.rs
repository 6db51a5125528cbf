//! Permission and ownership changes.

use std::fs::{self, Metadata, Permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown, lchown};
use std::path::Path;

use ferry_core::PermissionEdits;

use crate::traversal::{Halt, ItemAction, Visit, Walker};

/// Applies tri-state permission edits and ownership to each visited entry.
///
/// Directories are changed before their children. Symlinks only get their
/// own ownership changed; their mode is meaningless and chmod would follow
/// them.
#[derive(Debug)]
pub(crate) struct ChmodAction {
    edits: PermissionEdits,
    uid: Option<u32>,
    gid: Option<u32>,
}

impl ChmodAction {
    pub(crate) fn new(edits: PermissionEdits, uid: Option<u32>, gid: Option<u32>) -> Self {
        Self { edits, uid, gid }
    }

    fn apply(&self, path: &Path, metadata: &Metadata) -> Result<(), Halt> {
        let is_symlink = metadata.file_type().is_symlink();

        // chown first: it may clear setuid/setgid, which the edits then restore.
        if self.uid.is_some() || self.gid.is_some() {
            let result = if is_symlink {
                lchown(path, self.uid, self.gid)
            } else {
                chown(path, self.uid, self.gid)
            };
            result.map_err(|e| Halt::io(path, "change owner of", e))?;
        }

        if is_symlink || self.edits.is_empty() {
            return Ok(());
        }

        let mode = metadata.mode() & 0o7777;
        let updated = self.edits.apply(mode);
        let ownership_changed = self.uid.is_some() || self.gid.is_some();
        if updated != mode || ownership_changed {
            fs::set_permissions(path, Permissions::from_mode(updated))
                .map_err(|e| Halt::io(path, "change permissions of", e))?;
        }
        Ok(())
    }
}

impl ItemAction for ChmodAction {
    fn enter_dir(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        _dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<Visit, Halt> {
        self.apply(source, metadata)?;
        walker.item_done();
        Ok(Visit::Descend(None))
    }

    fn leaf(
        &mut self,
        walker: &mut Walker,
        source: &Path,
        _dest: Option<&Path>,
        metadata: &Metadata,
    ) -> Result<(), Halt> {
        self.apply(source, metadata)?;
        walker.account(metadata.len());
        walker.item_done();
        Ok(())
    }
}
