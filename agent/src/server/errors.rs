//! HTTP mapping of bot errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openapi_server::models::ErrorResponse;
use tracing::error;

use crate::errors::BotError;

impl BotError {
    /// Short machine-readable kind, returned as `error` in response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::IoError(_) => "io",
            BotError::JsonError(_) => "json",
            BotError::HttpError(_) => "http",
            BotError::StoreCorrupted(_) => "store_corrupted",
            BotError::ClassifierError(_) => "classifier",
            BotError::GitError(_) => "git",
            BotError::ChatError(_) => "chat",
            BotError::InvalidTransition(_) => "invalid_transition",
            BotError::ServerError(_) => "server",
            BotError::ShutdownError(_) => "shutdown",
            BotError::ConfigError(_) => "config",
            BotError::ValidationError(_) => "validation",
            BotError::NotFound(_) => "not_found",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BotError::NotFound(_) => StatusCode::NOT_FOUND,
            BotError::ValidationError(_) => StatusCode::BAD_REQUEST,
            BotError::InvalidTransition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            message: self.to_string(),
            error: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
