//! Adapter errors.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | `Timeout` | `ADAPTER_TIMEOUT` | Yes |
//! | `Compile` | `ADAPTER_COMPILE` | No |
//! | `Runtime` | `ADAPTER_RUNTIME` | Yes |
//! | `MissingEntry` | `ADAPTER_MISSING_ENTRY` | No |
//! | `UnsupportedFile` | `ADAPTER_UNSUPPORTED_FILE` | Yes |
//! | `Parse` | `ADAPTER_PARSE` | Yes |
//! | `InvalidRule` | `ADAPTER_INVALID_RULE` | No |
//! | `InvalidOutput` | `ADAPTER_INVALID_OUTPUT` | Yes |
//! | `Edit` | `ADAPTER_EDIT` | Yes |
//!
//! "Recoverable" here means the lane can go on with the next file; every
//! adapter error is reported per file and never ends the lane.

use crate::edit::EditError;
use remod_types::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failure raised while running one transformation over one target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Wall-clock budget exhausted.
    #[error("timed out")]
    Timeout,

    /// Transformation source failed to compile.
    #[error("{0}")]
    Compile(String),

    /// Transformation raised an error while running.
    #[error("{0}")]
    Runtime(String),

    /// Transformation did not export a usable entry point.
    #[error("transformation does not export {0}")]
    MissingEntry(String),

    /// No grammar is registered for the target's extension.
    #[error("unsupported file type: {}", path.display())]
    UnsupportedFile { path: PathBuf },

    /// Target content could not be parsed.
    #[error("failed to parse {}", path.display())]
    Parse { path: PathBuf },

    /// Rule declaration is malformed.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Transformation returned something other than text or nothing.
    #[error("invalid transformation output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl ErrorCode for AdapterError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "ADAPTER_TIMEOUT",
            Self::Compile(_) => "ADAPTER_COMPILE",
            Self::Runtime(_) => "ADAPTER_RUNTIME",
            Self::MissingEntry(_) => "ADAPTER_MISSING_ENTRY",
            Self::UnsupportedFile { .. } => "ADAPTER_UNSUPPORTED_FILE",
            Self::Parse { .. } => "ADAPTER_PARSE",
            Self::InvalidRule(_) => "ADAPTER_INVALID_RULE",
            Self::InvalidOutput(_) => "ADAPTER_INVALID_OUTPUT",
            Self::Edit(_) => "ADAPTER_EDIT",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Compile(_) | Self::MissingEntry(_) | Self::InvalidRule(_)
        )
    }
}
