//! Engine adapter contract.
//!
//! Every transformation engine implements [`EngineAdapter`]: it takes the
//! transformation source, one target file and the validated argument record,
//! and returns the [`FileCommand`]s the transformation proposes. Worker lanes
//! and the orchestrator are written against this trait only.
//!
//! ```text
//!   Invocation{source, path, data, args}      ConsoleSink
//!                    │                             ▲
//!                    ▼                             │ console.log(...)
//!          ┌──────────────────────┐                │
//!          │  dyn EngineAdapter   │────────────────┘
//!          │  pattern-match       │
//!          │  structural-morph    │
//!          │  declarative-rule    │
//!          │  orchestration-wf    │
//!          └──────────┬───────────┘
//!                     ▼
//!          Result<Vec<FileCommand>, AdapterError>
//! ```
//!
//! The crate also carries what several engines share: range-based
//! [`TextEdit`]s applied in descending offset order, the extension →
//! grammar [`Dialect`] table, and the formatting / apply collaborator
//! interfaces consumed downstream.
//!
//! [`FileCommand`]: remod_types::FileCommand

mod adapter;
mod collab;
mod dialect;
mod edit;
mod error;
pub mod testing;

pub use adapter::{ConsoleSink, EngineAdapter, Invocation, NullConsole};
pub use collab::{format_commands, ApplyCommands, ApplyError, FormatError, Formatter};
pub use dialect::Dialect;
pub use edit::{apply_edits, EditError, TextEdit};
pub use error::AdapterError;
