//! Logging bootstrap.
//!
//! The runtime logs through `tracing` and reroutes the native library's
//! logger into it. Installing a subscriber is optional; embedding
//! applications that already have one can skip this module.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the bundled subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// Structured JSON lines.
    Json,
}

/// Errors from subscriber installation.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

/// Install a global subscriber. `filter` uses env-filter syntax, e.g.
/// `"info"` or `"kiln=debug,kiln::native=warn"`.
pub fn init_logging(format: LogFormat, filter: &str) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(filter).map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    result.map_err(|_| LogError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_is_rejected() {
        let err = init_logging(LogFormat::Pretty, "not[a(filter").unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter(_)));
    }
}
