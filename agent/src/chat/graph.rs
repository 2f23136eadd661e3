//! Microsoft Graph chat source

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error};

use crate::chat::{ChatMessage, MessageSource};
use crate::errors::BotError;

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<GraphBody>,
    #[serde(default)]
    from: Option<GraphFrom>,
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphFrom {
    #[serde(default)]
    user: Option<GraphUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    #[serde(default)]
    display_name: Option<String>,
}

impl From<GraphMessage> for ChatMessage {
    fn from(message: GraphMessage) -> Self {
        ChatMessage {
            id: message.id,
            content: message.body.and_then(|b| b.content).unwrap_or_default(),
            from: message
                .from
                .and_then(|f| f.user)
                .and_then(|u| u.display_name),
            created_at: message.created_date_time,
        }
    }
}

/// Reads chat messages with a bearer token
pub struct GraphMessageSource {
    client: Client,
    base_url: String,
    access_token: SecretString,
}

impl GraphMessageSource {
    pub fn new(base_url: &str, access_token: SecretString) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }
}

#[async_trait]
impl MessageSource for GraphMessageSource {
    async fn latest_messages(&self, channel_id: &str, top: u32) -> Result<Vec<ChatMessage>, BotError> {
        let url = format!("{}/chats/{}/messages", self.base_url, channel_id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("$top", top.to_string())])
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.access_token.expose_secret()),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Fetching chat messages failed: {} - {}", status, body);
            return Err(BotError::ChatError(format!("{}: {}", status, body)));
        }

        let body = response.text().await?;
        parse_page(&body)
    }
}

/// Messages of one Graph `chatMessage` collection page
pub fn parse_page(body: &str) -> Result<Vec<ChatMessage>, BotError> {
    let page: MessagePage = serde_json::from_str(body)?;
    Ok(page.value.into_iter().map(ChatMessage::from).collect())
}
