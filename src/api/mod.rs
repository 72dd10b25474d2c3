//! HTTP request surface
//!
//! Stateless handlers over the shared [`AppState`], built with Axum.
//!
//! # Endpoints
//!
//! - `GET /metrics/list/` - all known metric names
//! - `GET /metrics/find/` - glob expansion
//! - `GET /render/` - windowed point fetch
//! - `GET /info/` - retention schema for one metric
//! - `GET /robots.txt` - crawler opt-out
//!
//! Every request is timed into the latency histogram. A panic anywhere in a
//! handler is caught at the service layer and answered with a 500 instead of
//! taking the process down.

pub mod encode;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics/list/", get(routes::list::list_metrics))
        .route("/metrics/find/", get(routes::find::find_metrics))
        .route("/render/", get(routes::render::render_metrics))
        .route("/info/", get(routes::info::metric_info))
        .route("/robots.txt", get(robots))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            time_request,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Bind and serve until SIGINT/SIGTERM; in-flight requests finish.
pub async fn serve(
    state: Arc<AppState>,
    addr: &str,
    request_timeout: Duration,
) -> Result<(), ApiError> {
    let router = build_router(state).layer(TimeoutLayer::new(request_timeout));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "granary listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("server error: {e}")))?;

    tracing::info!("granary shut down gracefully");
    Ok(())
}

async fn robots() -> &'static str {
    "User-agent: *\nDisallow: /\n"
}

/// Feed the latency histogram from every served request.
async fn time_request(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    state.stats.bucket_request_time(&path, start.elapsed());
    response
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
