//! Logging initialisation.

use tracing_subscriber::EnvFilter;

use crate::error::{NodeError, Result};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or by `filter` when
/// `RUST_LOG` is unset.
///
/// Fails instead of panicking if a subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter).map_err(|e| NodeError::Config(e.to_string()))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| NodeError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        // The first call may already have happened in another test.
        let _ = init_tracing("debug");
        assert!(matches!(init_tracing("debug"), Err(NodeError::Telemetry(_))));
    }
}
