//! HTTP front-end
//!
//! Three routes: the upload form at `/`, the upload endpoint at
//! `/process_image`, and the latest composite under `/NoBackImages/`.

pub mod handlers;
pub mod state;
pub mod templates;

pub use state::AppState;

use crate::config::{ServerConfig, OUTPUT_ROUTE_PREFIX};
use crate::error::{NoBackError, Result};
use crate::processor::SegmentationPipeline;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the application router around shared state
pub fn build_router(state: AppState) -> Router {
    // Multipart framing needs some room on top of the file itself
    let body_limit = state.config().max_upload_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/", get(handlers::index))
        .route("/process_image", post(handlers::process_image))
        .route(
            &format!("{OUTPUT_ROUTE_PREFIX}/:file_name"),
            get(handlers::output_image),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.host:config.port` and serve until the process is stopped
///
/// # Errors
/// - Invalid bind address
/// - Port already in use
/// - Server I/O failures
pub async fn serve(pipeline: SegmentationPipeline) -> Result<()> {
    let config: ServerConfig = pipeline.config().clone();
    let addr = config.socket_addr()?;
    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NoBackError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(
        address = %addr,
        upload = %config.upload_path().display(),
        output = %config.output_path().display(),
        "Listening on http://{addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(NoBackError::Io)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
