use crate::console::ConsoleEvent;
use crate::message::LaneOutbound;
use remod_types::FileCommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What one execution request produced, as seen by the orchestrator.
///
/// `Console` is non-terminal and may repeat. `Commands` and `Failure` are
/// terminal and appear exactly once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionOutcome {
    Commands { items: Vec<FileCommand> },
    Console(ConsoleEvent),
    Failure {
        path: Option<PathBuf>,
        message: String,
    },
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Console(_))
    }
}

impl TryFrom<LaneOutbound> for ExecutionOutcome {
    type Error = LaneOutbound;

    /// Fails (returning the message back) for `Ready`, which is not part of
    /// any request.
    fn try_from(msg: LaneOutbound) -> Result<Self, Self::Error> {
        match msg {
            LaneOutbound::Commands { items } => Ok(Self::Commands { items }),
            LaneOutbound::ConsoleEvent(event) => Ok(Self::Console(event)),
            LaneOutbound::Error { message, path } => Ok(Self::Failure { path, message }),
            ready @ LaneOutbound::Ready => Err(ready),
        }
    }
}
