//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured `log_level` so operators can raise
//! verbosity without touching the service config.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ServerConfig};

/// Builds the filter from `RUST_LOG`, falling back to `log_level`.
pub fn env_filter(config: &ServerConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Safe to call more than once.
pub fn init(config: &ServerConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_info_for_garbage_directives() {
        let config = ServerConfig {
            log_level: "[[[not a filter".to_string(),
            ..Default::default()
        };
        // Only checks that building a filter never panics.
        let _ = env_filter(&config);
    }

    #[test]
    fn init_twice_is_harmless() {
        let config = ServerConfig::default();
        init(&config);
        init(&config);
    }
}
