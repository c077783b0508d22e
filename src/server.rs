use crate::clock::{Clock, SystemClock};
use crate::compression::{compression_opt_out_middleware, CompressionPolicy};
use crate::config::Config;
use crate::error::Result;
use crate::handlers::{
    clear_cache, get_cache_stats, get_performance_report, get_performance_stats,
    get_rate_limit_status, health_check, reset_performance, service_status, AppState, SharedState,
};
use crate::middleware::{
    cache_middleware, performance_middleware, rate_limit_middleware, RateLimitState,
};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Operational routes: metrics, cache and limiter inspection, health.
pub fn ops_routes() -> Router<SharedState> {
    Router::new()
        .route("/admin/performance", get(get_performance_stats))
        .route("/admin/performance/report", get(get_performance_report))
        .route("/admin/performance/reset", post(reset_performance))
        .route("/admin/cache", get(get_cache_stats).delete(clear_cache))
        .route("/admin/rate-limit", get(get_rate_limit_status))
        .route("/health", get(health_check))
}

/// Mount `api` next to the operational routes and wrap everything in the
/// middleware pipeline. Outermost first: trace, CORS, compression, timing,
/// mobile rate limiting, response cache.
pub fn create_app(state: SharedState, api: Router<SharedState>) -> Router {
    let rate_limit_state = RateLimitState::new(
        Arc::clone(&state.mobile_limiter),
        Arc::clone(&state.clock),
    );
    let compression = CompressionLayer::new()
        .compress_when(CompressionPolicy::new(state.config.compression_min_bytes));

    Router::new()
        .merge(api)
        .merge(ops_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(compression)
                .layer(middleware::from_fn(compression_opt_out_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    performance_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    rate_limit_state,
                    rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(state.clone(), cache_middleware)),
        )
        .with_state(state)
}

/// Routes served by the binary itself.
pub fn default_api_routes() -> Router<SharedState> {
    Router::new().route("/api/status", get(service_status))
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validated()?;
        let bind_addr = config.bind_addr;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let state = AppState::new(config, clock);
        let app = create_app(state, default_api_routes());

        Ok(Self { app, bind_addr })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("reqguard server listening on {}", self.bind_addr);
        tracing::info!("Performance stats available at /admin/performance");
        tracing::info!("Health check available at /health");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
