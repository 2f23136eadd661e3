//! Classifier answer caches

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BotError;
use crate::storage::document::DocumentStore;

/// Store collection holding durable classifier answers
pub const BRANCH_CACHE_COLLECTION: &str = "branchDetectionCache";

#[derive(Debug, Clone)]
struct CacheEntry {
    branches: Vec<String>,
    cached_at: DateTime<Utc>,
}

/// In-memory classifier cache, bounded; the oldest entry is evicted first
pub struct BranchCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl BranchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| e.branches.clone())
    }

    pub fn insert(&self, key: &str, branches: Vec<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if !entries.contains_key(key) && entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.cached_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                branches,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BranchCache {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One durable cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDetection {
    pub key: String,
    pub branches: Vec<String>,
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
}

/// Classifier answers persisted in the document store
pub struct DurableBranchCache {
    documents: Arc<DocumentStore>,
}

impl DurableBranchCache {
    pub fn new(documents: Arc<DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<String>>, BotError> {
        Ok(self
            .documents
            .collection(BRANCH_CACHE_COLLECTION)
            .await?
            .into_iter()
            .filter_map(|item| serde_json::from_value::<CachedDetection>(item).ok())
            .find(|entry| entry.key == key)
            .map(|entry| entry.branches))
    }

    pub async fn insert(&self, key: &str, branches: &[String]) -> Result<(), BotError> {
        let entry = CachedDetection {
            key: key.to_string(),
            branches: branches.to_vec(),
            cached_at: Some(Utc::now()),
        };
        self.documents
            .insert_if_absent(
                BRANCH_CACHE_COLLECTION,
                serde_json::to_value(&entry)?,
                |item| item.get("key").and_then(Value::as_str) == Some(key),
            )
            .await?;
        Ok(())
    }
}
