//! Chat trigger sources

pub mod graph;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::BotError;

/// A chat message as delivered by a source
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Native message id, used as the deployment id
    pub id: String,
    pub content: String,
    pub from: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Fetches the latest messages of a channel
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn latest_messages(&self, channel_id: &str, top: u32) -> Result<Vec<ChatMessage>, BotError>;
}
