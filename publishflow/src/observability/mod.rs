//! Observability utilities.

mod spans;
mod wide_events;

pub use spans::PhaseSpan;
pub use wide_events::RunEventEmitter;

use crate::errors::PublishError;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `tracing` subscriber.
///
/// `filter` uses `EnvFilter` directive syntax (e.g. `"publishflow=debug"`);
/// `RUST_LOG` takes precedence when set. With `json` every event is written
/// as one JSON object per line.
///
/// # Errors
///
/// Returns [`PublishError::Internal`] if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(filter: &str, json: bool) -> Result<(), PublishError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| PublishError::Internal(format!("Invalid log filter '{filter}': {e}")))?;

    let builder = fmt().with_env_filter(env_filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| PublishError::Internal(format!("Tracing already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_reported() {
        // Whichever call installs the subscriber, the other fails.
        let first = init_tracing("publishflow=debug", false);
        let second = init_tracing("publishflow=debug", true);
        assert!(first.is_err() || second.is_err());
    }
}
