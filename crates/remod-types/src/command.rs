//! File commands: the mutation vocabulary.
//!
//! A [`FileCommand`] describes one proposed filesystem mutation. The core
//! never applies commands itself; it hands them to an external collaborator.
//!
//! # Invariants
//!
//! - `updateFile` always has `old_data != new_data`. [`FileCommand::update`]
//!   refuses to build a no-op and [`FileCommand::validate`] rejects one that
//!   was assembled by hand.
//! - Every command carries the [`TransformationId`] that produced it.
//!
//! # Wire format
//!
//! ```json
//! { "kind": "updateFile", "transformation": "…", "path": "index.ts",
//!   "oldData": "…", "newData": "…", "formatWithPrettier": true }
//! ```

use crate::error::ErrorCode;
use crate::id::TransformationId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One proposed filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FileCommand {
    /// Create a file that must not exist at apply time.
    CreateFile {
        transformation: TransformationId,
        path: PathBuf,
        new_data: String,
        format_with_prettier: bool,
    },
    /// Replace `old_data` (the snapshot the transformation saw) with `new_data`.
    UpdateFile {
        transformation: TransformationId,
        path: PathBuf,
        old_data: String,
        new_data: String,
        format_with_prettier: bool,
    },
    /// Delete a file whose content was `old_data` when observed.
    DeleteFile {
        transformation: TransformationId,
        path: PathBuf,
        old_data: String,
    },
    /// Rename `old_path` to `new_path`.
    MoveFile {
        transformation: TransformationId,
        old_path: PathBuf,
        new_path: PathBuf,
    },
    /// Copy `old_path` to `new_path`.
    CopyFile {
        transformation: TransformationId,
        old_path: PathBuf,
        new_path: PathBuf,
    },
}

/// Rejected command construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// An update whose old and new data are identical.
    #[error("update of '{path}' does not change its content")]
    NoOpUpdate { path: PathBuf },
}

impl ErrorCode for CommandError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoOpUpdate { .. } => "COMMAND_NO_OP_UPDATE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

impl FileCommand {
    /// Builds a `createFile` command.
    #[must_use]
    pub fn create(
        transformation: TransformationId,
        path: impl Into<PathBuf>,
        new_data: impl Into<String>,
        format_with_prettier: bool,
    ) -> Self {
        Self::CreateFile {
            transformation,
            path: path.into(),
            new_data: new_data.into(),
            format_with_prettier,
        }
    }

    /// Builds an `updateFile` command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NoOpUpdate`] when `old_data == new_data`.
    pub fn update(
        transformation: TransformationId,
        path: impl Into<PathBuf>,
        old_data: impl Into<String>,
        new_data: impl Into<String>,
        format_with_prettier: bool,
    ) -> Result<Self, CommandError> {
        let path = path.into();
        let old_data = old_data.into();
        let new_data = new_data.into();
        if old_data == new_data {
            return Err(CommandError::NoOpUpdate { path });
        }
        Ok(Self::UpdateFile {
            transformation,
            path,
            old_data,
            new_data,
            format_with_prettier,
        })
    }

    /// Builds a `deleteFile` command.
    #[must_use]
    pub fn delete(
        transformation: TransformationId,
        path: impl Into<PathBuf>,
        old_data: impl Into<String>,
    ) -> Self {
        Self::DeleteFile {
            transformation,
            path: path.into(),
            old_data: old_data.into(),
        }
    }

    /// Builds a `moveFile` command.
    #[must_use]
    pub fn moving(
        transformation: TransformationId,
        old_path: impl Into<PathBuf>,
        new_path: impl Into<PathBuf>,
    ) -> Self {
        Self::MoveFile {
            transformation,
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }

    /// Builds a `copyFile` command.
    #[must_use]
    pub fn copying(
        transformation: TransformationId,
        old_path: impl Into<PathBuf>,
        new_path: impl Into<PathBuf>,
    ) -> Self {
        Self::CopyFile {
            transformation,
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }

    /// Re-checks the invariants of a command that may have been built by hand.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NoOpUpdate`] for an update that changes nothing.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::UpdateFile {
                path,
                old_data,
                new_data,
                ..
            } if old_data == new_data => Err(CommandError::NoOpUpdate { path: path.clone() }),
            _ => Ok(()),
        }
    }

    /// Returns the wire name of this command's kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::CreateFile { .. } => "createFile",
            Self::UpdateFile { .. } => "updateFile",
            Self::DeleteFile { .. } => "deleteFile",
            Self::MoveFile { .. } => "moveFile",
            Self::CopyFile { .. } => "copyFile",
        }
    }

    /// Returns the path this command is about.
    ///
    /// For move and copy this is the source path.
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        match self {
            Self::CreateFile { path, .. }
            | Self::UpdateFile { path, .. }
            | Self::DeleteFile { path, .. } => path,
            Self::MoveFile { old_path, .. } | Self::CopyFile { old_path, .. } => old_path,
        }
    }

    /// Returns the transformation that produced this command.
    #[must_use]
    pub fn transformation(&self) -> TransformationId {
        match self {
            Self::CreateFile { transformation, .. }
            | Self::UpdateFile { transformation, .. }
            | Self::DeleteFile { transformation, .. }
            | Self::MoveFile { transformation, .. }
            | Self::CopyFile { transformation, .. } => *transformation,
        }
    }

    /// Returns the proposed new content for create and update commands.
    #[must_use]
    pub fn new_data(&self) -> Option<&str> {
        match self {
            Self::CreateFile { new_data, .. } | Self::UpdateFile { new_data, .. } => {
                Some(new_data)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::assert_error_code;

    fn id() -> TransformationId {
        TransformationId::named("test")
    }

    #[test]
    fn update_rejects_identical_data() {
        let err = FileCommand::update(id(), "a.ts", "same", "same", false)
            .expect_err("no-op must be rejected");
        assert_eq!(
            err,
            CommandError::NoOpUpdate {
                path: PathBuf::from("a.ts")
            }
        );
        assert_error_code(&err, "COMMAND_");
    }

    #[test]
    fn validate_catches_hand_built_noop() {
        let cmd = FileCommand::UpdateFile {
            transformation: id(),
            path: "a.ts".into(),
            old_data: "x".into(),
            new_data: "x".into(),
            format_with_prettier: false,
        };
        assert!(cmd.validate().is_err());
        assert!(FileCommand::create(id(), "b.ts", "", false).validate().is_ok());
    }

    #[test]
    fn wire_format_is_camel_case_tagged() {
        let cmd = FileCommand::update(id(), "index.ts", "a", "b", true).expect("differs");
        let json = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(json["kind"], "updateFile");
        assert_eq!(json["oldData"], "a");
        assert_eq!(json["newData"], "b");
        assert_eq!(json["formatWithPrettier"], true);
        assert_eq!(json["path"], "index.ts");

        let moved = FileCommand::moving(id(), "a", "b");
        let json = serde_json::to_value(&moved).expect("serialize");
        assert_eq!(json["kind"], "moveFile");
        assert_eq!(json["oldPath"], "a");
        assert_eq!(json["newPath"], "b");
    }

    #[test]
    fn accessors() {
        let cmd = FileCommand::copying(id(), "src.ts", "dst.ts");
        assert_eq!(cmd.kind_name(), "copyFile");
        assert_eq!(cmd.primary_path(), Path::new("src.ts"));
        assert_eq!(cmd.transformation(), id());
        assert_eq!(cmd.new_data(), None);

        let del = FileCommand::delete(id(), "gone.ts", "old");
        assert_eq!(del.kind_name(), "deleteFile");
        assert_eq!(del.primary_path(), Path::new("gone.ts"));
    }
}
