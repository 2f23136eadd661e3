//! Branch extraction from trigger text

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::errors::BotError;
use crate::extract::cache::{BranchCache, DurableBranchCache};
use crate::extract::classifier::{Classifier, PrefixConvention};
use crate::utils::char_prefix;

/// Turns raw message text into a deduplicated list of branch names.
///
/// A direct `<PREFIX>-<digits>` scan runs first; the classifier is consulted
/// only when that finds nothing. Classifier answers are cached in memory and
/// in the store, keyed by the first `cache_key_len` characters of the text.
pub struct BranchExtractor {
    pattern: Option<Regex>,
    conventions: PrefixConvention,
    classifier: Option<Arc<dyn Classifier>>,
    memory: BranchCache,
    durable: Option<DurableBranchCache>,
    cache_key_len: usize,
}

impl BranchExtractor {
    pub fn new(conventions: PrefixConvention, cache_key_len: usize) -> Result<Self, BotError> {
        Ok(Self {
            pattern: prefix_pattern(&conventions.prefixes)?,
            conventions,
            classifier: None,
            memory: BranchCache::default(),
            durable: None,
            cache_key_len,
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_durable_cache(mut self, durable: DurableBranchCache) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Branch names found directly in `text`, first occurrence order
    pub fn direct_matches(&self, text: &str) -> Vec<String> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        dedup(pattern.find_iter(text).map(|m| m.as_str().to_string()))
    }

    /// Extract branch names. Classifier failures yield an empty list.
    pub async fn extract(&self, text: &str) -> Vec<String> {
        let direct = self.direct_matches(text);
        if !direct.is_empty() {
            debug!(branches = ?direct, "Branches matched directly");
            return direct;
        }

        let Some(classifier) = &self.classifier else {
            debug!("No direct branch match and no classifier configured");
            return Vec::new();
        };

        let key = char_prefix(text, self.cache_key_len);
        if let Some(branches) = self.memory.get(key) {
            debug!("Classifier answer served from memory cache");
            return branches;
        }

        if let Some(durable) = &self.durable {
            match durable.get(key).await {
                Ok(Some(branches)) => {
                    debug!("Classifier answer served from store cache");
                    self.memory.insert(key, branches.clone());
                    return branches;
                }
                Ok(None) => {}
                Err(e) => warn!("Reading classifier cache failed: {}", e),
            }
        }

        let branches = match classifier.classify(text, &self.conventions).await {
            Ok(raw) => dedup(
                raw.into_iter()
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty()),
            ),
            Err(e) => {
                warn!("Branch classification failed: {}", e);
                return Vec::new();
            }
        };

        info!(branches = ?branches, "Branches found by classifier");
        self.memory.insert(key, branches.clone());
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.insert(key, &branches).await {
                warn!("Writing classifier cache failed: {}", e);
            }
        }
        branches
    }
}

fn prefix_pattern(prefixes: &[String]) -> Result<Option<Regex>, BotError> {
    let alternatives: Vec<String> = prefixes
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }

    let pattern = format!(r"(?:{})-\d+", alternatives.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| BotError::ConfigError(format!("invalid branch prefix pattern: {}", e)))
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
