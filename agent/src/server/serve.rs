//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::BotError;
use crate::server::handlers::{
    active_connectors_handler, cancel_deployment_handler, create_connector_handler,
    delete_connector_handler, export_store_handler, get_connector_handler,
    get_deployment_handler, health_handler, import_store_handler, ingest_deployment_handler,
    list_connectors_handler, list_deployments_handler, process_handler,
    update_connector_handler, update_deployment_handler, version_handler,
};
use crate::server::state::ServerState;

/// Routes of the control surface
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route(
            "/api/deployments",
            get(list_deployments_handler).post(ingest_deployment_handler),
        )
        .route("/api/deployments/process", post(process_handler))
        .route(
            "/api/deployments/{id}",
            get(get_deployment_handler).put(update_deployment_handler),
        )
        .route("/api/deployments/{id}/cancel", post(cancel_deployment_handler))
        // Store
        .route("/api/store/export", get(export_store_handler))
        .route("/api/store/import", post(import_store_handler))
        // Connectors
        .route(
            "/api/connectors",
            get(list_connectors_handler).post(create_connector_handler),
        )
        .route("/api/connectors/active", get(active_connectors_handler))
        .route(
            "/api/connectors/{id}",
            get(get_connector_handler)
                .put(update_connector_handler)
                .delete(delete_connector_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), BotError>>, BotError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BotError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| BotError::ServerError(e.to_string()))
    });

    Ok(handle)
}
