mod problem;
mod router;
mod search;
mod tap;
mod telemetry;

use std::net::SocketAddr;

use tracing::info;

use erp_search_storage::Database;
use erp_search_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    if config.seed_demo {
        database.seed_demo().await?;
    }

    let state = router::AppState::new(metrics, tap::TapHub::new(), database);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
