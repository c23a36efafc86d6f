//! Sandbox errors.

use remod_adapter::AdapterError;
use remod_types::ErrorCode;
use thiserror::Error;

/// Failure while building or running a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The VM or its environment could not be built.
    #[error("sandbox setup failed: {0}")]
    Setup(String),

    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Runtime(String),

    #[error("timed out")]
    Timeout,

    /// The transformation's exports lack the expected entry point.
    #[error("transformation does not export {0}")]
    MissingEntry(String),
}

impl ErrorCode for SandboxError {
    fn code(&self) -> &'static str {
        match self {
            Self::Setup(_) => "SANDBOX_SETUP",
            Self::Compile(_) => "SANDBOX_COMPILE",
            Self::Runtime(_) => "SANDBOX_RUNTIME",
            Self::Timeout => "SANDBOX_TIMEOUT",
            Self::MissingEntry(_) => "SANDBOX_MISSING_ENTRY",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Runtime(_) | Self::Timeout)
    }
}

impl From<mlua::Error> for SandboxError {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => {
                Self::Compile(format!("compile error: {message}"))
            }
            other => Self::Runtime(format_lua_error(&other)),
        }
    }
}

impl From<SandboxError> for AdapterError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Timeout => Self::Timeout,
            SandboxError::Compile(msg) => Self::Compile(msg),
            SandboxError::MissingEntry(what) => Self::MissingEntry(what),
            SandboxError::Runtime(msg) => Self::Runtime(msg),
            SandboxError::Setup(msg) => Self::Runtime(format!("sandbox setup failed: {msg}")),
        }
    }
}

/// Maps a host-side VM failure (building tables, converting values).
pub(crate) fn host(err: mlua::Error) -> AdapterError {
    SandboxError::from(err).into()
}

/// Renders an mlua error without its callback wrapping.
pub(crate) fn format_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::SyntaxError { message, .. } => format!("compile error: {message}"),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remod_types::assert_error_codes;
    use std::sync::Arc;

    #[test]
    fn codes() {
        assert_error_codes(
            &[
                SandboxError::Setup("x".into()),
                SandboxError::Compile("x".into()),
                SandboxError::Runtime("x".into()),
                SandboxError::Timeout,
                SandboxError::MissingEntry("x".into()),
            ],
            "SANDBOX_",
        );
    }

    #[test]
    fn callback_errors_unwrap_to_cause() {
        let err = mlua::Error::CallbackError {
            traceback: "stack".into(),
            cause: Arc::new(mlua::Error::RuntimeError("boom".into())),
        };
        assert_eq!(SandboxError::from(err), SandboxError::Runtime("boom".into()));
    }

    #[test]
    fn converts_to_adapter_error() {
        assert_eq!(AdapterError::from(SandboxError::Timeout).to_string(), "timed out");
        assert_eq!(
            AdapterError::from(SandboxError::MissingEntry("transform".into())),
            AdapterError::MissingEntry("transform".into())
        );
    }
}
