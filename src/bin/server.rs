use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ordermile::{
    carrier::NddClient, config::AppConfig, db, routes, state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        ndd_base_url = %config.ndd_base_url,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let carrier = Arc::new(NddClient::new(
        config.ndd_base_url.clone(),
        &config.ndd_token,
        config.ndd_request_timeout(),
        config.ndd_offers_cache_ttl(),
    )?);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(pool, config, carrier);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
