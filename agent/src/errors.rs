//! Error types for mepbot

use thiserror::Error;

/// Main error type for mepbot
#[derive(Error, Debug)]
pub enum BotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Store document is corrupted: {0}")]
    StoreCorrupted(String),

    #[error("Classifier error: {0}")]
    ClassifierError(String),

    #[error("Git error: {0}")]
    GitError(String),

    #[error("Chat source error: {0}")]
    ChatError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
