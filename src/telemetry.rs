use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `cfg.level` when set. Drift warnings are emitted on
/// the `visage::drift` target, so `visage::drift=warn` isolates them.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level).map_err(|e| TelemetryError::Filter {
            directive: cfg.level.clone(),
            message: e.to_string(),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if cfg.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| TelemetryError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_is_reported() {
        // Only meaningful when RUST_LOG does not take precedence.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let cfg = LoggingConfig {
            level: "visage=loudest".to_string(),
            json: false,
        };
        assert!(matches!(
            init_tracing(&cfg),
            Err(TelemetryError::Filter { .. })
        ));
    }
}
