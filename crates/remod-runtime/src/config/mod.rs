//! Configuration management with layering.
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────┐
//! │  1. Environment Variables (REMOD_*)      │  Runtime override
//! ├──────────────────────────────────────────┤
//! │  2. Project Config (.remod/config.toml)  │  Project-specific
//! ├──────────────────────────────────────────┤
//! │  3. Default Values (compile-time)        │  Fallback
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `REMOD_THREADS` | `pool.threads` | usize |
//! | `REMOD_TIMEOUT_MS` | `sandbox.timeout_ms` | u64 |
//! | `REMOD_FORMAT` | `format.enabled` | bool |
//! | `REMOD_LOG` | `logging.level` | String |
//!
//! # Example Configuration
//!
//! ```toml
//! # .remod/config.toml
//!
//! [pool]
//! threads = 4
//!
//! [sandbox]
//! timeout_ms = 30000
//! instruction_check_interval = 1000
//!
//! [format]
//! enabled = true
//!
//! [logging]
//! level = "warn"
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{FormatConfig, LoggingConfig, PoolConfig, RemodConfig, SandboxConfig};

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".remod";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
