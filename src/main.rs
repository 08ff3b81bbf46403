use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sky_metrics::{
    api::{self, AppState},
    config::Config,
    logging,
    query::MetricQueryEngine,
    store::{DuckDbStore, MetricBackend},
    MetricsError, Result,
};
use tokio::net::TcpListener;
use tracing::{error, info};

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = logging::init_logger(&config.log_level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("run failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let store = DuckDbStore::open(&config.db_path, &config.table_name)?
        .with_max_concurrent_queries(config.max_concurrent_queries);
    store.ensure_schema_ready().await?;

    let _sweep = match config.retention() {
        Some(retention) => {
            info!("Keeping {} days of samples", retention.num_days());
            Some(store.spawn_retention_sweep(retention, RETENTION_SWEEP_INTERVAL))
        }
        None => None,
    };

    let engine = MetricQueryEngine::new(Arc::new(store))
        .with_aggregate_timeout(config.query_timeout());
    info!(
        "Aggregations are bounded to {:?}, requests to {:?}",
        engine.aggregate_timeout(),
        config.request_timeout()
    );

    let app = api::create_router(AppState::new(engine), config.request_timeout());
    let listener = TcpListener::bind(config.listen_addr).await.map_err(|e| {
        MetricsError::Internal(format!("Failed to bind to {}: {}", config.listen_addr, e))
    })?;

    api::serve(listener, app).await
}
