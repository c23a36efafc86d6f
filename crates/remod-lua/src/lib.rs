//! Lua-hosted transformation engines.
//!
//! Transformation code is untrusted. Each invocation evaluates it inside a
//! fresh [`SandboxContext`]: its own Lua VM, a whitelist-only global
//! environment, a closed `require`, captured console output and a
//! wall-clock deadline. Nothing survives from one invocation to the next.
//!
//! Three engines are built on top of the sandbox:
//!
//! | Adapter | Entry point | Works on |
//! |---------|-------------|----------|
//! | [`PatternMatchAdapter`] | `transform(root, api)` | syntax-tree node handles |
//! | [`StructuralMorphAdapter`] | `transform(file, args, api)` | a mutable source-file handle |
//! | [`WorkflowAdapter`] | workflow table | the whole file set |
//!
//! ```no_run
//! use remod_adapter::{EngineAdapter, Invocation, NullConsole};
//! use remod_lua::PatternMatchAdapter;
//! use remod_types::{SafeArgumentRecord, TransformationId};
//! use std::path::Path;
//!
//! let args = SafeArgumentRecord::empty();
//! let source = r#"
//!     return function(root)
//!         root:find({ kind = "identifier", text = "state" }):insert_after(": State")
//!     end
//! "#;
//! let invocation = Invocation::new(
//!     TransformationId::named("add-state-type"),
//!     source,
//!     Path::new("index.ts"),
//!     "function mapStateToProps(state) {}",
//!     &args,
//! );
//! let commands = PatternMatchAdapter::default().run(&invocation, &NullConsole)?;
//! assert_eq!(commands.len(), 1);
//! # Ok::<(), remod_adapter::AdapterError>(())
//! ```

mod convert;
mod error;
mod limits;
mod morph;
mod pattern;
mod sandbox;
mod syntax;
mod workflow;

pub use error::SandboxError;
pub use morph::StructuralMorphAdapter;
pub use pattern::PatternMatchAdapter;
pub use sandbox::{
    ModuleBuilder, ModuleRegistry, SandboxContext, SandboxOptions, DEFAULT_CHECK_INTERVAL,
    DEFAULT_TIMEOUT,
};
pub use workflow::{WorkflowAdapter, MAX_PASSES};
