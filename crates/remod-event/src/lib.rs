//! Lane message protocol.
//!
//! The orchestrator and its worker lanes talk exclusively through the two
//! message families defined here.
//!
//! ```text
//!   Orchestrator                                   Worker lane
//!   ────────────                                   ───────────
//!        │  Initialization{engine, source, args, fmt}  │
//!        ├────────────────────────────────────────────►│
//!        │                                      Ready  │
//!        │◄────────────────────────────────────────────┤
//!        │  ExecuteFile{path, data}                    │
//!        ├────────────────────────────────────────────►│
//!        │          ConsoleEvent{kind, message}  (0..n)│
//!        │◄────────────────────────────────────────────┤
//!        │     Commands{items} | Error{message, path?} │
//!        │◄────────────────────────────────────────────┤
//!        │  Exit                                       │
//!        ├────────────────────────────────────────────►│
//! ```
//!
//! Exactly one terminal message (`Commands` or `Error`) answers each
//! execute request, and every console event for that request is sent
//! before it.

mod console;
mod message;
mod outcome;

pub use console::{ConsoleEvent, ConsoleKind};
pub use message::{ExecutionRequest, Initialization, LaneInbound, LaneOutbound};
pub use outcome::ExecutionOutcome;
