//! Git connector management on top of the document store

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::BotError;
use crate::models::connector::{ConnectorType, GitConnector, CONNECTORS_COLLECTION, MASKED_TOKEN};
use crate::storage::document::DocumentStore;
use crate::utils::generate_uuid;

/// Fields supplied when creating or updating a connector
#[derive(Debug, Clone, Default)]
pub struct ConnectorInput {
    pub name: Option<String>,
    pub connector_type: Option<ConnectorType>,
    pub url: Option<String>,
    pub access_token: Option<String>,
    pub active: Option<bool>,
}

fn has_id(item: &Value, id: &str) -> bool {
    item.get("id").and_then(Value::as_str) == Some(id)
}

fn parse(value: Value) -> Result<GitConnector, BotError> {
    serde_json::from_value(value)
        .map_err(|e| BotError::StoreCorrupted(format!("invalid connector document: {}", e)))
}

fn ensure_valid(connector: &GitConnector) -> Result<(), BotError> {
    let errors = connector.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BotError::ValidationError(errors.join(", ")))
    }
}

/// Git connector repository
pub struct ConnectorStore {
    documents: Arc<DocumentStore>,
}

impl ConnectorStore {
    pub fn new(documents: Arc<DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn list(&self) -> Result<Vec<GitConnector>, BotError> {
        self.documents
            .collection(CONNECTORS_COLLECTION)
            .await?
            .into_iter()
            .map(parse)
            .collect()
    }

    pub async fn list_active(&self) -> Result<Vec<GitConnector>, BotError> {
        Ok(self.list().await?.into_iter().filter(|c| c.active).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<GitConnector>, BotError> {
        Ok(self.list().await?.into_iter().find(|c| c.id == id))
    }

    /// First active connector of the given provider type
    pub async fn first_active(
        &self,
        connector_type: ConnectorType,
    ) -> Result<Option<GitConnector>, BotError> {
        Ok(self
            .list_active()
            .await?
            .into_iter()
            .find(|c| c.connector_type == connector_type))
    }

    pub async fn create(&self, input: ConnectorInput) -> Result<GitConnector, BotError> {
        let now = Utc::now();
        let connector = GitConnector {
            id: generate_uuid(),
            name: input.name.unwrap_or_default(),
            connector_type: input.connector_type.unwrap_or_default(),
            url: input.url.unwrap_or_default(),
            access_token: input.access_token.unwrap_or_default(),
            active: input.active.unwrap_or(true),
            created_at: Some(now),
            updated_at: Some(now),
        };
        ensure_valid(&connector)?;

        let doc = serde_json::to_value(&connector)?;
        let id = connector.id.clone();
        self.documents
            .insert_if_absent(CONNECTORS_COLLECTION, doc, |item| has_id(item, &id))
            .await?;

        info!(connector_id = %connector.id, name = %connector.name, "Git connector created");
        Ok(connector)
    }

    /// Update a connector. A masked or empty token keeps the stored one.
    pub async fn update(&self, id: &str, input: ConnectorInput) -> Result<GitConnector, BotError> {
        let updated = self
            .documents
            .update_collection(CONNECTORS_COLLECTION, |items| {
                let slot = items
                    .iter_mut()
                    .find(|item| has_id(item, id))
                    .ok_or_else(|| BotError::NotFound(format!("connector {}", id)))?;

                let mut connector = parse(slot.clone())?;
                if let Some(name) = input.name {
                    connector.name = name;
                }
                if let Some(connector_type) = input.connector_type {
                    connector.connector_type = connector_type;
                }
                if let Some(url) = input.url {
                    connector.url = url;
                }
                if let Some(token) = input.access_token {
                    if !token.is_empty() && token != MASKED_TOKEN {
                        connector.access_token = token;
                    }
                }
                if let Some(active) = input.active {
                    connector.active = active;
                }
                connector.updated_at = Some(Utc::now());
                ensure_valid(&connector)?;

                *slot = serde_json::to_value(&connector)?;
                Ok(connector)
            })
            .await?;

        info!(connector_id = %id, "Git connector updated");
        Ok(updated)
    }

    /// Delete a connector; the last active connector cannot be deleted
    pub async fn delete(&self, id: &str) -> Result<(), BotError> {
        self.documents
            .update_collection(CONNECTORS_COLLECTION, |items| {
                let connectors = items
                    .iter()
                    .cloned()
                    .map(parse)
                    .collect::<Result<Vec<_>, _>>()?;

                let target = connectors
                    .iter()
                    .find(|c| c.id == id)
                    .ok_or_else(|| BotError::NotFound(format!("connector {}", id)))?;

                let active = connectors.iter().filter(|c| c.active).count();
                if target.active && active <= 1 {
                    return Err(BotError::ValidationError(
                        "cannot delete the last active connector".to_string(),
                    ));
                }

                items.retain(|item| !has_id(item, id));
                Ok(())
            })
            .await?;

        info!(connector_id = %id, "Git connector deleted");
        Ok(())
    }

    /// Seed a default GitLab connector when none exist.
    ///
    /// Returns the created connector, if any.
    pub async fn init_default(
        &self,
        base_url: Option<&str>,
        access_token: Option<&SecretString>,
    ) -> Result<Option<GitConnector>, BotError> {
        if !self.list().await?.is_empty() {
            return Ok(None);
        }
        let (Some(url), Some(token)) = (base_url, access_token) else {
            warn!("No git connectors configured and no git host credentials in settings");
            return Ok(None);
        };

        let connector = self
            .create(ConnectorInput {
                name: Some("Default GitLab".to_string()),
                connector_type: Some(ConnectorType::Gitlab),
                url: Some(url.to_string()),
                access_token: Some(token.expose_secret().to_string()),
                active: Some(true),
            })
            .await?;
        Ok(Some(connector))
    }
}
