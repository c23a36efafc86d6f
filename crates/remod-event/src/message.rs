use crate::console::ConsoleEvent;
use remod_types::{EngineKind, FileCommand, SafeArgumentRecord, TransformationId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One-time lane setup.
///
/// A lane keeps the first initialization it receives for its whole life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initialization {
    pub engine: EngineKind,
    pub transformation: TransformationId,
    pub transformation_source: String,
    pub safe_argument_record: SafeArgumentRecord,
    pub format_with_prettier: bool,
}

/// A file offered to the current transformation.
///
/// Built by the orchestrator, consumed exactly once by a lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub path: PathBuf,
    pub data: String,
}

impl ExecutionRequest {
    pub fn new(path: impl Into<PathBuf>, data: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Orchestrator → lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LaneInbound {
    Initialization(Initialization),
    ExecuteFile(ExecutionRequest),
    /// Whole-run request used by per-run engines.
    ExecuteWorkflow {
        root: PathBuf,
        files: Vec<ExecutionRequest>,
    },
    Exit,
}

/// Lane → orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LaneOutbound {
    /// Initialization accepted.
    Ready,
    Commands { items: Vec<FileCommand> },
    ConsoleEvent(ConsoleEvent),
    /// A failure; `path` is `None` for protocol errors.
    Error {
        message: String,
        path: Option<PathBuf>,
    },
}

impl LaneOutbound {
    /// Whether this message ends the current request.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Commands { .. } | Self::Error { .. })
    }
}
