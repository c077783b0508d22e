use anyhow::Result;
use reqguard::config::Config;
use reqguard::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Invalid limits are a deployment error: refuse to start
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("reqguard={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reqguard service");
    tracing::info!(
        "Configuration: bind_addr={}, cache_ttl_ms={}, cache_capacity={}, rate_limit={}/{}ms, slow_threshold_ms={}",
        config.bind_addr,
        config.cache_ttl_ms,
        config.cache_capacity,
        config.rate_limit_max_requests,
        config.rate_limit_window_ms,
        config.slow_threshold_ms
    );

    let server = Server::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
