use crate::config::Config;
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use score_api::metrics_defs::ALL_METRICS;
use sentry::types::{Dsn, ParseDsnError};
use shared::metrics_defs::describe_all;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const METRICS_PREFIX: &str = "scoreboard";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("invalid sentry dsn: {0}")]
    Dsn(#[from] ParseDsnError),
    #[error("could not install log subscriber: {0}")]
    Subscriber(#[from] TryInitError),
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Keeps the sentry client alive; events are flushed when dropped.
pub struct Telemetry {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs logging, optional sentry reporting and the optional statsd
/// exporter. Must run before the tokio runtime starts.
pub fn init(config: &Config) -> Result<Telemetry, TelemetryError> {
    let sentry = match &config.logging {
        Some(logging) => {
            let dsn: Dsn = logging.sentry_dsn.parse()?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .try_init()?;

    if let Some(metrics_config) = &config.metrics {
        let recorder =
            StatsdBuilder::from(metrics_config.statsd_host.clone(), metrics_config.statsd_port)
                .build(Some(METRICS_PREFIX))?;
        metrics::set_global_recorder(recorder).map_err(|_| TelemetryError::RecorderInstalled)?;
        describe_all(ALL_METRICS);

        tracing::info!(
            "Sending metrics to {}:{}",
            metrics_config.statsd_host,
            metrics_config.statsd_port
        );
    }

    Ok(Telemetry { _sentry: sentry })
}
