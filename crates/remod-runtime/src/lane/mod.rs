//! Worker lanes.
//!
//! A lane is one OS thread running a [`WorkerUnit`]: it is initialized
//! once with an engine and a transformation, then executes files one at a
//! time until told to exit.
//!
//! ```text
//!   Orchestrator                               lane thread
//!   ────────────                               ───────────
//!   LaneHandle::send(LaneInbound) ──mpsc──►  WorkerUnit::handle()
//!                                                 │ EngineAdapter::run()
//!   outbound rx  ◄──mpsc── (LaneId, LaneOutbound) ┘
//! ```

mod engines;
mod worker;

pub use engines::adapter_for;
pub use worker::{spawn_lane, LaneHandle, OutboundTx, WorkerState, WorkerUnit};
pub(crate) use worker::workflow_root;
