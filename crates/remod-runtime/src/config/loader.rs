//! Configuration loader.
//!
//! Defaults, then the project file (`.remod/config.toml`), then `REMOD_*`
//! environment variables. Each layer overrides the previous one.

use super::{ConfigError, RemodConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builds a [`RemodConfig`] from its layers.
///
/// ```no_run
/// use remod_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/path/to/project")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), remod_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    project_root: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `<project_root>/.remod/config.toml` if it exists.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Ignores `REMOD_*`, for deterministic tests.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] if the project file exists but cannot be read
    /// or parsed, or an environment variable holds an invalid value.
    pub fn load(&self) -> Result<RemodConfig, ConfigError> {
        let mut config = match &self.project_root {
            Some(root) => {
                let path = root.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE);
                let loaded = load_file(&path)?;
                if loaded.is_some() {
                    debug!(path = %path.display(), "loaded project config");
                }
                loaded.unwrap_or_default()
            }
            None => RemodConfig::default(),
        };

        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }
        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<Option<RemodConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    RemodConfig::from_toml(&content)
        .map(Some)
        .map_err(|e| ConfigError::parse_toml(path, e))
}

fn apply_env_vars(config: &mut RemodConfig) -> Result<(), ConfigError> {
    const NUMBER: &str = "expected a non-negative integer";

    if let Some(threads) = env_var("REMOD_THREADS", NUMBER, |v| v.parse().ok())? {
        config.pool.threads = threads;
    }
    if let Some(timeout) = env_var("REMOD_TIMEOUT_MS", NUMBER, |v| v.parse().ok())? {
        config.sandbox.timeout_ms = timeout;
    }
    if let Some(enabled) = env_var("REMOD_FORMAT", "expected bool", parse_bool)? {
        config.format.enabled = enabled;
    }
    if let Ok(level) = std::env::var("REMOD_LOG") {
        config.logging.level = level;
    }
    Ok(())
}

fn env_var<T>(
    name: &str,
    expected: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse(value.trim())
            .map(Some)
            .ok_or_else(|| ConfigError::invalid_env_var(name, expected)),
        Err(_) => Ok(None),
    }
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, ignoring case.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
