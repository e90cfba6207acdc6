use mediabot_core::BoxError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset or invalid
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Records from the `log` facade, which the
/// core and plugins log through, are forwarded to it. Output goes to stderr
/// so command output on stdout stays parseable.
pub fn init(json: bool) -> Result<(), BoxError> {
    tracing_log::LogTracer::init().map_err(|e| format!("failed to bridge log records: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = Registry::default().with(filter);
    let installed = if json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_writer(std::io::stderr)))
    };
    installed.map_err(|e| format!("failed to install log subscriber: {}", e))?;
    Ok(())
}
