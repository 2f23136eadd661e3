//! Whole-document JSON store
//!
//! The store is one JSON object on disk mapping collection names to arrays of
//! documents (plus a few plain keys such as cached lookups). Every write
//! re-reads the document, mutates it in memory and rewrites it atomically.
//! Writers inside the process are serialized by a write lock; nothing guards
//! against a second process writing the same file.

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::BotError;
use crate::filesys::file::File;

/// Result of [`DocumentStore::merge_update_if_present`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An existing element was shallow-merged
    Updated,
    /// No element matched, the partial document was appended as-is
    Appended,
}

/// Single-writer whole-document store
pub struct DocumentStore {
    file: File,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Create a store backed by `file`
    pub fn new(file: File) -> Self {
        Self {
            file,
            write_lock: Mutex::new(()),
        }
    }

    /// Create an empty document if the file does not exist yet.
    ///
    /// An existing file is validated, never replaced.
    pub async fn ensure(&self) -> Result<(), BotError> {
        let _guard = self.write_lock.lock().await;
        if self.file.exists().await {
            self.read_document().await?;
            return Ok(());
        }
        info!("Creating data store at {}", self.file.path().display());
        self.write_document(&Map::new()).await
    }

    async fn read_document(&self) -> Result<Map<String, Value>, BotError> {
        if !self.file.exists().await {
            return Ok(Map::new());
        }

        let contents = self.file.read_string().await.map_err(|e| {
            BotError::StoreCorrupted(format!("{}: {}", self.file.path().display(), e))
        })?;

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(BotError::StoreCorrupted(format!(
                "{}: top-level value is {}, expected an object",
                self.file.path().display(),
                json_kind(&other)
            ))),
            Err(e) => Err(BotError::StoreCorrupted(format!(
                "{}: {}",
                self.file.path().display(),
                e
            ))),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<(), BotError> {
        self.file.write_json(document).await
    }

    /// Full document, as stored
    pub async fn export(&self) -> Result<Value, BotError> {
        Ok(Value::Object(self.read_document().await?))
    }

    /// Replace the full document. Returns the imported top-level keys.
    pub async fn import(&self, document: Value) -> Result<Vec<String>, BotError> {
        let Value::Object(map) = document else {
            return Err(BotError::ValidationError(format!(
                "imported document must be an object, got {}",
                json_kind(&document)
            )));
        };

        let _guard = self.write_lock.lock().await;
        let keys: Vec<String> = map.keys().cloned().collect();
        self.write_document(&map).await?;
        info!("Imported store document with keys {:?}", keys);
        Ok(keys)
    }

    /// Read a top-level key
    pub async fn get(&self, key: &str) -> Result<Option<Value>, BotError> {
        let document = self.read_document().await?;
        Ok(document.get(key).filter(|v| !v.is_null()).cloned())
    }

    /// Write a top-level key
    pub async fn set(&self, key: &str, value: Value) -> Result<(), BotError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(&document).await
    }

    /// Elements of a collection; a missing collection is empty
    pub async fn collection(&self, name: &str) -> Result<Vec<Value>, BotError> {
        let document = self.read_document().await?;
        collection_of(&document, name)
    }

    /// Append `doc` unless an element already satisfies `matches`.
    ///
    /// Returns whether the document was inserted.
    pub async fn insert_if_absent<F>(
        &self,
        name: &str,
        doc: Value,
        matches: F,
    ) -> Result<bool, BotError>
    where
        F: Fn(&Value) -> bool,
    {
        self.update_collection(name, |items| {
            if items.iter().any(|item| matches(item)) {
                return Ok(false);
            }
            items.push(doc);
            Ok(true)
        })
        .await
    }

    /// Shallow-merge `partial` onto the first element satisfying `matches`.
    ///
    /// When nothing matches, `partial` itself is appended to the collection.
    pub async fn merge_update_if_present<F>(
        &self,
        name: &str,
        partial: Value,
        matches: F,
    ) -> Result<MergeOutcome, BotError>
    where
        F: Fn(&Value) -> bool,
    {
        let Value::Object(fields) = partial else {
            return Err(BotError::ValidationError(format!(
                "partial update for '{}' must be an object",
                name
            )));
        };

        let outcome = self
            .update_collection(name, |items| {
                match items.iter_mut().find(|item| matches(item)) {
                    Some(Value::Object(existing)) => {
                        for (key, value) in fields {
                            existing.insert(key, value);
                        }
                        Ok(MergeOutcome::Updated)
                    }
                    Some(other) => {
                        *other = Value::Object(fields);
                        Ok(MergeOutcome::Updated)
                    }
                    None => {
                        items.push(Value::Object(fields));
                        Ok(MergeOutcome::Appended)
                    }
                }
            })
            .await?;

        if outcome == MergeOutcome::Appended {
            warn!(collection = name, "Merge update matched nothing, partial document appended");
        }
        Ok(outcome)
    }

    /// Read-modify-write a collection under the write lock
    pub async fn update_collection<F, T>(&self, name: &str, f: F) -> Result<T, BotError>
    where
        F: FnOnce(&mut Vec<Value>) -> Result<T, BotError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        let mut items = collection_of(&document, name)?;

        let result = f(&mut items)?;

        document.insert(name.to_string(), Value::Array(items));
        self.write_document(&document).await?;
        debug!(collection = name, "Collection written");
        Ok(result)
    }

    /// Drop later elements whose `id_key` repeats an earlier one.
    ///
    /// Returns the number of removed elements.
    pub async fn prune_duplicates(&self, name: &str, id_key: &str) -> Result<usize, BotError> {
        self.update_collection(name, |items| {
            let before = items.len();
            let mut seen = std::collections::HashSet::new();
            items.retain(|item| match item.get(id_key) {
                Some(id) => seen.insert(id.to_string()),
                None => true,
            });
            Ok(before - items.len())
        })
        .await
    }
}

fn collection_of(document: &Map<String, Value>, name: &str) -> Result<Vec<Value>, BotError> {
    match document.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(BotError::StoreCorrupted(format!(
            "collection '{}' is {}, expected an array",
            name,
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
