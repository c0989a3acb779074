use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging for the conductor.
///
/// JSON output is meant for when the conductor runs under a supervisor that
/// collects logs; the plain formatter is for a human at a terminal. Either
/// way the filter honors RUST_LOG and falls back to the configured level.
pub fn init_telemetry(log_level: &str, json_logs: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(filter)
            .init();
    }

    tracing::debug!("Telemetry initialized");
    Ok(())
}
