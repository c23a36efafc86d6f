//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use remod_lua::SandboxOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
///
/// The result of layering defaults, the project file and the environment.
///
/// # Example
///
/// ```
/// use remod_runtime::config::RemodConfig;
///
/// let config = RemodConfig::default();
/// assert_eq!(config.sandbox.timeout_ms, 30_000);
/// assert!(config.format.enabled);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemodConfig {
    /// Worker pool configuration.
    pub pool: PoolConfig,

    /// Sandbox limits.
    pub sandbox: SandboxConfig,

    /// Output formatting.
    pub format: FormatConfig,

    /// Log filter.
    pub logging: LoggingConfig,
}

impl RemodConfig {
    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker lanes. Defaults to the available parallelism.
    pub threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

impl PoolConfig {
    /// Lane count, never below one.
    #[must_use]
    pub fn lanes(&self) -> usize {
        self.threads.max(1)
    }
}

/// Sandbox limits applied to every invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit per file, in milliseconds.
    pub timeout_ms: u64,

    /// Number of VM instructions between deadline checks.
    pub instruction_check_interval: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            instruction_check_interval: 1_000,
        }
    }
}

impl SandboxConfig {
    /// Sandbox options for the Lua engines.
    #[must_use]
    pub fn options(&self) -> SandboxOptions {
        SandboxOptions::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_check_interval(self.instruction_check_interval.max(1))
    }
}

/// Formatting preference handed to every lane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormatConfig {
    /// Flag created and updated files for formatting.
    pub enabled: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = RemodConfig::default();
        assert!(config.pool.threads >= 1);
        assert_eq!(config.sandbox.timeout_ms, 30_000);
        assert_eq!(config.sandbox.instruction_check_interval, 1_000);
        assert!(config.format.enabled);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RemodConfig::from_toml("[sandbox]\ntimeout_ms = 500\n").expect("parse");
        assert_eq!(config.sandbox.timeout_ms, 500);
        assert_eq!(config.sandbox.instruction_check_interval, 1_000);
        assert!(config.format.enabled);
    }

    #[test]
    fn sandbox_options_from_config() {
        let sandbox = SandboxConfig {
            timeout_ms: 250,
            instruction_check_interval: 0,
        };
        let options = sandbox.options();
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.check_interval, 1);
    }

    #[test]
    fn zero_threads_still_one_lane() {
        assert_eq!(PoolConfig { threads: 0 }.lanes(), 1);
    }
}
