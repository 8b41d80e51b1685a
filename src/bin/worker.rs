use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use ordermile::{carrier::NddClient, config::AppConfig, db, shipments, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        sync_interval_secs = config.sync_interval_secs,
        sync_batch_size = config.sync_batch_size,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let carrier = Arc::new(NddClient::new(
        config.ndd_base_url.clone(),
        &config.ndd_token,
        config.ndd_request_timeout(),
        config.ndd_offers_cache_ttl(),
    )?);
    let interval = Duration::from_secs(config.sync_interval_secs);
    let state = AppState::new(pool, config, carrier);

    tokio::select! {
        _ = run_sync_loop(state, interval) => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

async fn run_sync_loop(state: AppState, interval: Duration) {
    tracing::info!("status sync worker started");
    loop {
        match shipments::sync_statuses(&state).await {
            Ok(report) => {
                tracing::info!(total = report.total, changed = report.changed, "sync tick finished");
            }
            Err(err) => {
                tracing::error!(error = %err, "sync tick failed");
            }
        }
        sleep(interval).await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
