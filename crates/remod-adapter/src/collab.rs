//! Collaborator interfaces consumed downstream of the engines.
//!
//! The core only proposes [`FileCommand`]s. Formatting and persisting them
//! belong to collaborators supplied by the embedder.

use remod_types::{ErrorCode, FileCommand};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Code formatting service.
pub trait Formatter: Send + Sync {
    /// Formats `text` as the content of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] when the text cannot be formatted; callers
    /// fall back to the unformatted text.
    fn format(&self, path: &Path, text: &str) -> Result<String, FormatError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to format '{}': {message}", path.display())]
pub struct FormatError {
    pub path: PathBuf,
    pub message: String,
}

impl FormatError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for FormatError {
    fn code(&self) -> &'static str {
        "FORMAT_FAILED"
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

/// Persists accepted commands.
///
/// How a stale `oldData` snapshot is handled (reject, overwrite, merge) is
/// the implementor's policy.
pub trait ApplyCommands {
    /// Applies `commands` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] for the first command that could not be applied.
    fn apply(&mut self, commands: &[FileCommand]) -> Result<(), ApplyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("'{}' already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("'{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("'{}' changed since the transformation read it", path.display())]
    Stale { path: PathBuf },

    #[error("failed to apply to '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl ErrorCode for ApplyError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "APPLY_ALREADY_EXISTS",
            Self::NotFound { .. } => "APPLY_NOT_FOUND",
            Self::Stale { .. } => "APPLY_STALE",
            Self::Io { .. } => "APPLY_IO",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::Io { .. })
    }
}

/// Formats the new content of create and update commands.
///
/// Only commands with `format_with_prettier` set are touched. A formatter
/// failure keeps the unformatted text. An update whose formatted content
/// equals its `old_data` is dropped, so formatting never produces a no-op.
#[must_use]
pub fn format_commands(commands: Vec<FileCommand>, formatter: &dyn Formatter) -> Vec<FileCommand> {
    commands
        .into_iter()
        .filter_map(|command| match command {
            FileCommand::CreateFile {
                transformation,
                path,
                new_data,
                format_with_prettier: true,
            } => {
                let new_data = format_or_keep(formatter, &path, new_data);
                Some(FileCommand::CreateFile {
                    transformation,
                    path,
                    new_data,
                    format_with_prettier: true,
                })
            }
            FileCommand::UpdateFile {
                transformation,
                path,
                old_data,
                new_data,
                format_with_prettier: true,
            } => {
                let new_data = format_or_keep(formatter, &path, new_data);
                FileCommand::update(transformation, path, old_data, new_data, true).ok()
            }
            other => Some(other),
        })
        .collect()
}

fn format_or_keep(formatter: &dyn Formatter, path: &Path, text: String) -> String {
    match formatter.format(path, &text) {
        Ok(formatted) => formatted,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Formatting failed, keeping unformatted text");
            text
        }
    }
}
