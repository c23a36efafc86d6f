//! Worker lanes, orchestrator and configuration for remod.
//!
//! ```text
//!   caller
//!     │ initialize(RunSpec)          run(files, sink)
//!     ▼                                   │
//! ┌──────────────────────────────────────────────┐
//! │ Orchestrator                                 │
//! │   validate args ─► spawn lanes ─► await Ready│
//! │   work queue ──► idle lane ──► RunReport     │
//! └──────┬───────────────┬───────────────┬───────┘
//!        ▼               ▼               ▼
//!   remod-lane-0    remod-lane-1    remod-lane-N      (one OS thread each)
//!   WorkerUnit      WorkerUnit      WorkerUnit
//!   dyn EngineAdapter (pattern-match │ structural-morph │
//!                      declarative-rule │ orchestration-workflow)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use remod_adapter::NullConsole;
//! use remod_event::ExecutionRequest;
//! use remod_runtime::{Orchestrator, RunSpec};
//! use remod_types::EngineKind;
//!
//! # async fn demo() -> Result<(), remod_runtime::OrchestratorError> {
//! let mut orchestrator = Orchestrator::builder().threads(4).build();
//! orchestrator
//!     .initialize(RunSpec::new(
//!         EngineKind::StructuralMorph,
//!         "return function(file) return (file:full_text():gsub('var ', 'let ')) end",
//!     ))
//!     .await?;
//!
//! let files = vec![ExecutionRequest::new("a.ts", "var a = 1;")];
//! let report = orchestrator.run(files, &NullConsole).await?;
//! for command in report.all_commands() {
//!     println!("{} {}", command.kind_name(), command.primary_path().display());
//! }
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod lane;
pub mod logging;
mod orchestrator;

pub use error::OrchestratorError;
pub use orchestrator::{
    CancelHandle, ConsoleRecord, FileCommands, FileFailure, Orchestrator, OrchestratorBuilder,
    Progress, RunReport, RunSpec, CANCELLED,
};
