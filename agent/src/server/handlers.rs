//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use openapi_server::models::{
    ConnectorRequest, DeploymentUpdateRequest, HealthResponse, ImportResponse, IngestRequest,
    MessageResponse, ProcessResponse, VersionResponse,
};
use serde_json::Value;
use tracing::{error, info};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::BotError;
use crate::models::connector::{ConnectorType, GitConnector};
use crate::models::deployment::Deployment;
use crate::server::state::ServerState;
use crate::storage::connectors::ConnectorInput;
use crate::storage::deployments::{Candidate, DeploymentUpdate};
use crate::utils::{generate_uuid, version_info};

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "mepbot".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================ DEPLOYMENTS ==================================== //

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<Deployment>>, BotError> {
    Ok(Json(state.deployments.list().await?))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Deployment>, BotError> {
    Ok(Json(state.deployments.require(&id).await?))
}

/// Manually ingest a trigger message
pub async fn ingest_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, BotError> {
    if request.content.trim().is_empty() {
        return Err(BotError::ValidationError("content is required".to_string()));
    }

    let deployment = state
        .deployments
        .ingest_candidate(Candidate {
            id: request
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(generate_uuid),
            content: request.content,
            from: request.from,
            channel_id: request.channel_id,
            created_at: request.created_at,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn update_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(request): Json<DeploymentUpdateRequest>,
) -> Result<Json<Deployment>, BotError> {
    let status = request
        .status
        .as_deref()
        .map(str::parse::<DeploymentStatus>)
        .transpose()?;

    let update = DeploymentUpdate {
        status,
        approved: request.approved,
        blacklisted_branches: request.blacklisted_branches,
    };
    Ok(Json(state.deployments.apply_update(&id, update).await?))
}

pub async fn cancel_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Deployment>, BotError> {
    Ok(Json(state.deployments.cancel(&id).await?))
}

/// Start a processing pass in the background
pub async fn process_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let Some(lease) = state.orchestrator.try_lease() else {
        return (
            StatusCode::CONFLICT,
            Json(ProcessResponse {
                started: false,
                message: "Deployment processing already in progress".to_string(),
            }),
        );
    };

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        match orchestrator.run_pass(lease).await {
            Ok(report) => info!(
                processed = report.processed.len(),
                failed = report.failed.len(),
                "Requested processing pass finished"
            ),
            Err(e) => error!("Requested processing pass failed: {}", e),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(ProcessResponse {
            started: true,
            message: "Deployment processing started".to_string(),
        }),
    )
}

// =================================== STORE ======================================= //

pub async fn export_store_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, BotError> {
    Ok(Json(state.documents.export().await?))
}

pub async fn import_store_handler(
    State(state): State<Arc<ServerState>>,
    Json(document): Json<Value>,
) -> Result<Json<ImportResponse>, BotError> {
    let collections = state.documents.import(document).await?;
    Ok(Json(ImportResponse {
        success: true,
        collections,
    }))
}

// ================================= CONNECTORS ==================================== //

fn connector_input(request: ConnectorRequest) -> Result<ConnectorInput, BotError> {
    let connector_type = request
        .connector_type
        .as_deref()
        .map(str::parse::<ConnectorType>)
        .transpose()
        .map_err(BotError::ValidationError)?;

    Ok(ConnectorInput {
        name: request.name,
        connector_type,
        url: request.url,
        access_token: request.access_token,
        active: request.active,
    })
}

fn masked(connectors: Vec<GitConnector>) -> Vec<GitConnector> {
    connectors.iter().map(GitConnector::masked).collect()
}

pub async fn list_connectors_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<GitConnector>>, BotError> {
    Ok(Json(masked(state.connectors.list().await?)))
}

pub async fn active_connectors_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<GitConnector>>, BotError> {
    Ok(Json(masked(state.connectors.list_active().await?)))
}

pub async fn get_connector_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<GitConnector>, BotError> {
    let connector = state
        .connectors
        .get(&id)
        .await?
        .ok_or_else(|| BotError::NotFound(format!("connector {}", id)))?;
    Ok(Json(connector.masked()))
}

pub async fn create_connector_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ConnectorRequest>,
) -> Result<impl IntoResponse, BotError> {
    let connector = state.connectors.create(connector_input(request)?).await?;
    Ok((StatusCode::CREATED, Json(connector.masked())))
}

pub async fn update_connector_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(request): Json<ConnectorRequest>,
) -> Result<Json<GitConnector>, BotError> {
    let connector = state
        .connectors
        .update(&id, connector_input(request)?)
        .await?;
    Ok(Json(connector.masked()))
}

pub async fn delete_connector_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, BotError> {
    state.connectors.delete(&id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Connector {} deleted", id),
    }))
}
