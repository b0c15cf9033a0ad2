use std::{
    fmt::Write as _,
    sync::{Mutex, OnceLock, PoisonError},
    time::Instant,
};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use erp_search_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to install prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

/// The recorder is process-global; every caller after the first shares its handle.
static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static STARTED: OnceLock<Instant> = OnceLock::new();

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: pretty lines outside production, JSON in production.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let production = config.environment == Environment::Production;

    let pretty = (!production).then(|| {
        fmt::layer().event_format(
            fmt::format()
                .pretty()
                .with_target(false)
                .with_timer(UtcTime::rfc_3339()),
        )
    });
    let json = production.then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    tracing::info!(
        stage = "app",
        env = %config.environment.as_str(),
        version = VERSION,
        git_sha = git_sha(),
        "tracing initialized"
    );
    Ok(())
}

pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = recorder.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_gauge!("app_build_info", "Build metadata of the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since metrics were installed");
    describe_counter!(
        "search_requests_total",
        "Search and lookup requests by entity and result"
    );
    describe_histogram!(
        "search_latency_seconds",
        "Search and lookup latency in seconds by entity"
    );
    describe_counter!(
        "search_validation_failures_total",
        "Search filters rejected by validation, by entity"
    );
    STARTED.get_or_init(Instant::now);

    *recorder = Some(handle.clone());
    Ok(handle)
}

/// Prometheus text exposition plus the build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    let uptime = STARTED
        .get()
        .map(|started| started.elapsed().as_secs_f64())
        .unwrap_or_default();
    // Writing into a String cannot fail.
    let _ = writeln!(body, "# TYPE app_build_info gauge");
    let _ = writeln!(
        body,
        "app_build_info{{version=\"{VERSION}\",git=\"{}\"}} 1",
        git_sha()
    );
    let _ = writeln!(body, "# TYPE app_uptime_seconds gauge");
    let _ = writeln!(body, "app_uptime_seconds {uptime}");

    body
}
