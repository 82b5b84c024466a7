mod generate_routes;
mod http_layers;
pub mod metrics;
mod resolve_routes;
pub mod state;

pub use state::AppState;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the API router. Exposed separately so tests can drive it without
/// binding a socket.
pub fn make_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(generate_routes::generate_routes())
        .merge(resolve_routes::resolve_routes());

    let router = Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    #[cfg(feature = "slowdown")]
    let router = router.layer(axum::middleware::from_fn(http_layers::slowdown_request));

    router
}

/// Serve the API on `port` and the Prometheus exposition on `metrics_port`
/// until the shutdown token fires.
pub async fn run_server(
    state: AppState,
    port: u16,
    metrics_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = make_router(state);
    let metrics_app =
        Router::new().route("/metrics", get(|| async { metrics::render_metrics() }));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", metrics_port)).await?;
    info!("Listening on port {} (metrics on {})", port, metrics_port);

    let api_shutdown = shutdown.clone();
    let metrics_shutdown = shutdown.clone();
    tokio::try_join!(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await }),
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await }),
    )?;
    Ok(())
}
