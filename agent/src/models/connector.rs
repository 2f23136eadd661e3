//! Git connector models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store collection holding git connectors
pub const CONNECTORS_COLLECTION: &str = "gitConnectors";

/// Placeholder returned instead of stored access tokens
pub const MASKED_TOKEN: &str = "••••••••";

/// Git hosting provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    #[default]
    Gitlab,
    Github,
}

impl std::str::FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitlab" => Ok(ConnectorType::Gitlab),
            "github" => Ok(ConnectorType::Github),
            _ => Err(format!("Unsupported connector type: {}", s)),
        }
    }
}

/// A connection to a git hosting provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConnector {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "type")]
    pub connector_type: ConnectorType,

    /// Base URL of the provider, e.g. `https://gitlab.example.com`
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl GitConnector {
    /// Missing required fields, one message each
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Name is required".to_string());
        }
        if self.url.trim().is_empty() {
            errors.push("URL is required".to_string());
        }
        if self.access_token.trim().is_empty() {
            errors.push("Access token is required".to_string());
        }
        errors
    }

    /// Copy safe to return from the API
    pub fn masked(&self) -> Self {
        let mut connector = self.clone();
        if !connector.access_token.is_empty() {
            connector.access_token = MASKED_TOKEN.to_string();
        }
        connector
    }
}
