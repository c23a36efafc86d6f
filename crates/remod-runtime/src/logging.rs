//! Tracing subscriber bootstrap.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `config.level`; an unparsable level falls back to
/// `warn`. Returns `false` when a subscriber was already installed, so
/// repeated calls are harmless.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let config = LoggingConfig {
            level: "not a [valid filter".into(),
        };
        let _ = init(&config);
        assert!(!init(&LoggingConfig::default()));
    }
}
