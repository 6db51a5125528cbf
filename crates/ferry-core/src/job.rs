//! Job descriptor types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{DescriptorError, PermissionEdits};

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Move,
    Copy,
    Delete,
    Link,
    #[strum(to_string = "Chmod/chown")]
    ChmodChown,
}

impl Operation {
    /// Check if this operation places entries into a destination directory.
    pub fn needs_destination(self) -> bool {
        matches!(self, Self::Move | Self::Copy | Self::Link)
    }

    /// Whether directories are descended when the caller does not say.
    pub fn recursive_by_default(self) -> bool {
        !matches!(self, Self::ChmodChown | Self::Link)
    }
}

/// Immutable description of one requested operation.
///
/// Built with [`JobDescriptor::builder`] or one of the shorthand
/// constructors; both validate the result. A deserialized descriptor must be
/// checked with [`JobDescriptor::validate`].
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawJobDescriptor")]
#[builder(
    setter(into),
    build_fn(private, name = "build_unchecked", error = "DescriptorError")
)]
pub struct JobDescriptor {
    /// What to do.
    pub operation: Operation,

    /// Paths to process, in order.
    #[builder(default)]
    pub sources: Vec<PathBuf>,

    /// Directory receiving new entries (Move, Copy and Link only).
    #[builder(default, setter(strip_option, into))]
    pub destination_dir: Option<PathBuf>,

    /// Whether directories are descended. Defaults per operation, see
    /// [`Operation::recursive_by_default`].
    #[builder(default = "self.default_recursive()")]
    pub recursive: bool,

    /// Tri-state permission edits (ChmodChown only).
    #[builder(default)]
    pub permission_edits: PermissionEdits,

    /// New owner, `None` leaves it unchanged.
    #[builder(default, setter(strip_option))]
    pub owner_uid: Option<u32>,

    /// New group, `None` leaves it unchanged.
    #[builder(default, setter(strip_option))]
    pub group_gid: Option<u32>,
}

/// Wire form of [`JobDescriptor`]; an absent `recursive` takes the
/// operation's default, same as the builder.
#[derive(Deserialize)]
struct RawJobDescriptor {
    operation: Operation,
    #[serde(default)]
    sources: Vec<PathBuf>,
    #[serde(default)]
    destination_dir: Option<PathBuf>,
    #[serde(default)]
    recursive: Option<bool>,
    #[serde(default)]
    permission_edits: PermissionEdits,
    #[serde(default)]
    owner_uid: Option<u32>,
    #[serde(default)]
    group_gid: Option<u32>,
}

impl From<RawJobDescriptor> for JobDescriptor {
    fn from(raw: RawJobDescriptor) -> Self {
        Self {
            recursive: raw
                .recursive
                .unwrap_or_else(|| raw.operation.recursive_by_default()),
            operation: raw.operation,
            sources: raw.sources,
            destination_dir: raw.destination_dir,
            permission_edits: raw.permission_edits,
            owner_uid: raw.owner_uid,
            group_gid: raw.group_gid,
        }
    }
}

impl JobDescriptorBuilder {
    fn default_recursive(&self) -> bool {
        self.operation
            .map(Operation::recursive_by_default)
            .unwrap_or(true)
    }

    /// Build and validate the descriptor.
    pub fn build(&self) -> Result<JobDescriptor, DescriptorError> {
        let descriptor = self.build_unchecked()?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

impl JobDescriptor {
    /// Create a new descriptor builder.
    pub fn builder() -> JobDescriptorBuilder {
        JobDescriptorBuilder::default()
    }

    /// Create a copy job.
    pub fn copy(
        sources: Vec<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<Self, DescriptorError> {
        Self::builder()
            .operation(Operation::Copy)
            .sources(sources)
            .destination_dir(destination)
            .build()
    }

    /// Create a move job.
    pub fn move_to(
        sources: Vec<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<Self, DescriptorError> {
        Self::builder()
            .operation(Operation::Move)
            .sources(sources)
            .destination_dir(destination)
            .build()
    }

    /// Create a delete job.
    pub fn delete(targets: Vec<PathBuf>) -> Result<Self, DescriptorError> {
        Self::builder()
            .operation(Operation::Delete)
            .sources(targets)
            .build()
    }

    /// Create a job that places symlinks to `sources` in `destination`.
    pub fn link(
        sources: Vec<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<Self, DescriptorError> {
        Self::builder()
            .operation(Operation::Link)
            .sources(sources)
            .destination_dir(destination)
            .build()
    }

    /// Create a chmod job without ownership changes.
    pub fn chmod(
        targets: Vec<PathBuf>,
        edits: PermissionEdits,
        recursive: bool,
    ) -> Result<Self, DescriptorError> {
        Self::builder()
            .operation(Operation::ChmodChown)
            .sources(targets)
            .permission_edits(edits)
            .recursive(recursive)
            .build()
    }

    /// Check the descriptor for consistency.
    ///
    /// Descriptors that arrive through serde bypass the builder, so
    /// controllers should call this before starting a deserialized job.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        match (&self.destination_dir, self.operation.needs_destination()) {
            (None, true) => {
                return Err(DescriptorError::MissingDestination {
                    operation: self.operation,
                });
            }
            (Some(_), false) => {
                return Err(DescriptorError::UnexpectedDestination {
                    operation: self.operation,
                });
            }
            _ => {}
        }

        let relative = self
            .sources
            .iter()
            .chain(self.destination_dir.iter())
            .find(|p| !p.is_absolute());
        if let Some(path) = relative {
            return Err(DescriptorError::RelativePath { path: path.clone() });
        }

        if self.operation == Operation::ChmodChown
            && self.permission_edits.is_empty()
            && self.owner_uid.is_none()
            && self.group_gid.is_none()
        {
            return Err(DescriptorError::EmptyChmod);
        }

        Ok(())
    }
}
