//! In-memory append log.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

use groundwork_core::{ExtractionMethod, Fact, FactId};

use super::{check_fact, FactStore, StoreError};

struct Row {
    seq: u64,
    fact: Fact,
}

#[derive(Default)]
struct Log {
    rows: Vec<Row>,
    next_seq: u64,
    /// (transcription_id, version) -> row indexes
    by_generation: BTreeMap<(String, u32), Vec<usize>>,
    ids: HashSet<FactId>,
}

/// Append-only fact log held in memory. Data is lost on drop.
#[derive(Default)]
pub struct MemoryFactStore {
    log: RwLock<Log>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.log.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn store_facts(&self, facts: &[Fact]) -> Result<usize, StoreError> {
        for fact in facts {
            check_fact(fact)?;
        }

        // One write lock for check and append, so the batch lands whole
        let mut log = self.log.write();

        let mut batch_ids = HashSet::with_capacity(facts.len());
        for fact in facts {
            let id = fact.fact_id();
            if log.ids.contains(&id) || !batch_ids.insert(id) {
                return Err(StoreError::DuplicateFact(id));
            }
        }

        for fact in facts {
            let seq = log.next_seq;
            log.next_seq += 1;
            let index = log.rows.len();
            log.rows.push(Row {
                seq,
                fact: fact.clone(),
            });
            log.ids.insert(fact.fact_id());
            log.by_generation
                .entry((fact.transcription_id().to_string(), fact.fact_version()))
                .or_default()
                .push(index);
        }

        tracing::debug!(count = facts.len(), total = log.rows.len(), "Facts appended");
        Ok(facts.len())
    }

    async fn get_facts(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<Vec<Fact>, StoreError> {
        let log = self.log.read();
        let Some(indexes) = log.by_generation.get(&(transcription_id.to_string(), version)) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&Row> = indexes.iter().map(|&i| &log.rows[i]).collect();
        rows.sort_by(|a, b| {
            a.fact
                .timestamp()
                .cmp(&b.fact.timestamp())
                .then(a.seq.cmp(&b.seq))
        });
        Ok(rows.into_iter().map(|r| r.fact.clone()).collect())
    }

    async fn latest_version(&self, transcription_id: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.versions(transcription_id).await?.last().copied())
    }

    async fn versions(&self, transcription_id: &str) -> Result<Vec<u32>, StoreError> {
        let log = self.log.read();
        // BTreeMap keys are ordered, so versions come out ascending
        Ok(log
            .by_generation
            .keys()
            .filter(|(tid, _)| tid == transcription_id)
            .map(|(_, version)| *version)
            .collect())
    }

    async fn has_generation(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<bool, StoreError> {
        Ok(self
            .log
            .read()
            .by_generation
            .contains_key(&(transcription_id.to_string(), version)))
    }

    async fn has_extraction(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<bool, StoreError> {
        let log = self.log.read();
        Ok(log
            .by_generation
            .get(&(transcription_id.to_string(), version))
            .is_some_and(|indexes| {
                indexes.iter().any(|&i| {
                    log.rows[i].fact.extraction_method() == ExtractionMethod::LlmDecomposition
                })
            }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_round_trip() {
        contract::round_trip(&MemoryFactStore::new()).await;
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = MemoryFactStore::new();
        contract::batch_is_atomic(&store).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        contract::duplicates_rejected(&MemoryFactStore::new()).await;
    }

    #[tokio::test]
    async fn test_corrections_append() {
        let store = MemoryFactStore::new();
        contract::corrections_append(&store).await;
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_corrections_rejected() {
        let store = MemoryFactStore::new();
        contract::invalid_corrections_rejected(&store).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_correction_keeps_advisories() {
        contract::correction_keeps_advisories(&MemoryFactStore::new()).await;
    }

    #[tokio::test]
    async fn test_concurrent_batches_do_not_mix() {
        let store = Arc::new(MemoryFactStore::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let tid = format!("t-{}", i);
                    let batch = vec![
                        contract::fact(&tid, "User has a headache.", 0, 18, 1),
                        contract::fact(&tid, "User took ibuprofen.", 19, 43, 1),
                    ];
                    store.store_facts(&batch).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..8 {
            let tid = format!("t-{}", i);
            let facts = store.get_facts(&tid, 1).await.unwrap();
            assert_eq!(facts.len(), 2);
            assert!(facts.iter().all(|f| f.transcription_id() == tid));
        }
    }
}
