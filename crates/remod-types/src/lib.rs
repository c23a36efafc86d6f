//! Core data model for remod.
//!
//! This crate holds the types every other layer speaks: the mutation
//! vocabulary a transformation produces, the validated argument bag a
//! transformation receives, and the engine identifiers.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Model Layer                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  remod-types    : FileCommand, SafeArgumentRecord  ◄── HERE │
//! │  remod-event    : lane protocol, console events             │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Engine Layer                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  remod-adapter  : EngineAdapter trait, text edits, dialects │
//! │  remod-lua      : sandbox + pattern / morph / workflow      │
//! │  remod-rules    : declarative rules                         │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime Layer                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  remod-runtime  : worker lanes, orchestrator, config        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use remod_types::{FileCommand, TransformationId};
//!
//! let id = TransformationId::named("add-state-type");
//! let cmd = FileCommand::update(
//!     id,
//!     "index.ts",
//!     "function f(state) {}",
//!     "function f(state: State) {}",
//!     true,
//! )
//! .expect("data differs");
//! assert_eq!(cmd.kind_name(), "updateFile");
//!
//! // A no-op update is never constructed.
//! assert!(FileCommand::update(id, "index.ts", "x", "x", true).is_err());
//! ```

pub mod args;
pub mod command;
pub mod engine;
pub mod error;
pub mod id;

pub use args::{
    ArgumentDescriptor, ArgumentKind, ArgumentRecord, ArgumentSchema, ArgumentValue, RawValue,
    SafeArgumentRecord, ValidationError,
};
pub use command::{CommandError, FileCommand};
pub use engine::EngineKind;
pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{LaneId, TransformationId};
