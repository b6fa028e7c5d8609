//! Decomposition cache.
//!
//! Stage 1 is the expensive call. When a caller retries a whole transcription
//! (after a store failure, say) the candidate list for an unchanged summary
//! is served from here instead of decomposing again.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use groundwork_core::Candidate;

use crate::config::CacheConfig;
use crate::prompts::PROMPT_VERSION;

/// Summary hash plus everything that changes decomposition output.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DecompositionKey {
    summary_hash: u64,
    prompt_version: &'static str,
    model: String,
}

impl DecompositionKey {
    pub fn new(summary: &str, model: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        summary.trim().hash(&mut hasher);
        Self {
            summary_hash: hasher.finish(),
            prompt_version: PROMPT_VERSION,
            model: model.to_string(),
        }
    }
}

pub struct DecompositionCache {
    cache: Cache<DecompositionKey, Vec<Candidate>>,
}

impl DecompositionCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    pub async fn get(&self, key: &DecompositionKey) -> Option<Vec<Candidate>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: DecompositionKey, candidates: Vec<Candidate>) {
        self.cache.insert(key, candidates).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for DecompositionCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = DecompositionCache::default();
        let key = DecompositionKey::new("User has a headache.", "model-a");

        assert!(cache.get(&key).await.is_none());

        cache
            .insert(key.clone(), vec![Candidate::new("User has a headache.")])
            .await;

        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached[0].text, "User has a headache.");
    }

    #[test]
    fn test_key_ignores_surrounding_whitespace() {
        assert_eq!(
            DecompositionKey::new("  User has a headache.\n", "m"),
            DecompositionKey::new("User has a headache.", "m")
        );
    }

    #[test]
    fn test_key_depends_on_model() {
        assert_ne!(
            DecompositionKey::new("User has a headache.", "model-a"),
            DecompositionKey::new("User has a headache.", "model-b")
        );
    }
}
