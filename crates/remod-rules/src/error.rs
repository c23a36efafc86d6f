//! Rule declaration errors.

use remod_adapter::AdapterError;
use remod_types::ErrorCode;
use thiserror::Error;

/// A rule document that cannot be turned into a matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Malformed YAML, a missing field or an unknown language.
    #[error("failed to parse rule document: {0}")]
    Parse(String),

    /// ast-grep rejected the rule (bad pattern, unknown kind, ...).
    #[error("rule '{id}': {message}")]
    Config { id: String, message: String },

    /// The matcher panicked while scanning a file.
    #[error("rule scan failed: {0}")]
    Scan(String),
}

impl RuleError {
    pub(crate) fn config(id: &str, err: &dyn std::error::Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Config {
            id: id.to_string(),
            message,
        }
    }
}

impl ErrorCode for RuleError {
    fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "RULE_PARSE",
            Self::Config { .. } => "RULE_CONFIG",
            Self::Scan(_) => "RULE_SCAN",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

impl From<RuleError> for AdapterError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Scan(message) => Self::Runtime(message),
            other => Self::InvalidRule(other.to_string()),
        }
    }
}
