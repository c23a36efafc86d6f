use serde::{Deserialize, Serialize};

/// Console method a transformation called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    Debug,
    Error,
    Info,
    Log,
    Trace,
    Warn,
}

impl ConsoleKind {
    pub const ALL: [ConsoleKind; 6] = [
        Self::Debug,
        Self::Error,
        Self::Info,
        Self::Log,
        Self::Trace,
        Self::Warn,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Error => "error",
            Self::Info => "info",
            Self::Log => "log",
            Self::Trace => "trace",
            Self::Warn => "warn",
        }
    }
}

impl std::fmt::Display for ConsoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub kind: ConsoleKind,
    pub message: String,
}

impl ConsoleEvent {
    pub fn new(kind: ConsoleKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
