//! Opt-in `facts` field for digest responses.
//!
//! A digest without the request flag is returned untouched. Facts are
//! additive: a store failure marks the digest `facts_omitted` instead of
//! failing it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::store::{FactStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactsRequest {
    pub include_facts: bool,

    /// Generation to read. `None` means the latest stored one.
    pub version: Option<u32>,
}

impl FactsRequest {
    pub fn latest() -> Self {
        Self {
            include_facts: true,
            version: None,
        }
    }

    pub fn at_version(version: u32) -> Self {
        Self {
            include_facts: true,
            version: Some(version),
        }
    }
}

pub async fn attach_facts(
    digest: Value,
    transcription_id: &str,
    request: &FactsRequest,
    store: &dyn FactStore,
) -> Value {
    if !request.include_facts {
        return digest;
    }
    let Value::Object(mut fields) = digest else {
        return digest;
    };

    match read_facts(transcription_id, request, store).await {
        Ok((version, facts)) => {
            fields.insert("facts".to_string(), facts);
            fields.insert("facts_version".to_string(), json!(version));
        }
        Err(e) => {
            warn!(
                transcription_id,
                store = store.name(),
                error = %e,
                "Facts omitted from digest"
            );
            fields.insert("facts_omitted".to_string(), Value::Bool(true));
        }
    }

    Value::Object(fields)
}

async fn read_facts(
    transcription_id: &str,
    request: &FactsRequest,
    store: &dyn FactStore,
) -> Result<(Option<u32>, Value), StoreError> {
    let version = match request.version {
        Some(v) => Some(v),
        None => store.latest_version(transcription_id).await?,
    };

    let facts = match version {
        Some(v) => store.get_facts(transcription_id, v).await?,
        None => Vec::new(),
    };

    let facts = serde_json::to_value(&facts).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok((version, facts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFactStore;
    use async_trait::async_trait;
    use groundwork_core::{ExtractionMethod, Fact, SourceSpan};

    struct BrokenStore;

    #[async_trait]
    impl FactStore for BrokenStore {
        async fn store_facts(&self, _facts: &[Fact]) -> Result<usize, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }
        async fn get_facts(&self, _tid: &str, _version: u32) -> Result<Vec<Fact>, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
        async fn latest_version(&self, _tid: &str) -> Result<Option<u32>, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
        async fn versions(&self, _tid: &str) -> Result<Vec<u32>, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    fn digest() -> Value {
        json!({"transcription_id": "t-1", "summary": "User has a headache."})
    }

    #[tokio::test]
    async fn test_not_requested_is_untouched() {
        let out = attach_facts(digest(), "t-1", &FactsRequest::default(), &BrokenStore).await;
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            serde_json::to_string(&digest()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_attaches_latest_generation() {
        let store = MemoryFactStore::new();
        let span = SourceSpan::from_transcript("I have a headache.", 0, 18).unwrap();
        let fact = Fact::new(
            "t-1",
            "User has a headache.",
            span,
            0.9,
            ExtractionMethod::LlmDecomposition,
            1,
        );
        store.store_facts(std::slice::from_ref(&fact)).await.unwrap();

        let out = attach_facts(digest(), "t-1", &FactsRequest::latest(), &store).await;
        assert_eq!(out["facts_version"], json!(1));
        assert_eq!(out["facts"][0]["fact_text"], json!("User has a headache."));
        assert_eq!(out["summary"], json!("User has a headache."));
    }

    #[tokio::test]
    async fn test_no_generation_yields_empty_list() {
        let store = MemoryFactStore::new();
        let out = attach_facts(digest(), "t-1", &FactsRequest::latest(), &store).await;
        assert_eq!(out["facts"], json!([]));
        assert_eq!(out["facts_version"], Value::Null);
    }

    #[tokio::test]
    async fn test_store_failure_omits_facts() {
        let out = attach_facts(digest(), "t-1", &FactsRequest::at_version(1), &BrokenStore).await;
        assert_eq!(out["facts_omitted"], json!(true));
        assert!(out.get("facts").is_none());
        assert_eq!(out["transcription_id"], json!("t-1"));
    }
}
