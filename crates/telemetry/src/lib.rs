//! Logging facade for the bootstrapper.
//!
//! Log lines go to stderr so that `plan` and `verify` output on stdout stays
//! machine-readable. `RUST_LOG` takes precedence over `telemetry.log_level`.

use anyhow::anyhow;
use bootstrap_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(settings: &TelemetrySettings) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.log_level)
            .map_err(|err| anyhow!("invalid log level '{}': {}", settings.log_level, err)),
    }
}

/// Install the global tracing subscriber.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = env_filter(settings)?;

    let result = match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|err| anyhow!(err))?;

    tracing::debug!(
        target: "bootstrap-telemetry",
        format = ?settings.log_format,
        "telemetry initialized"
    );
    Ok(())
}
