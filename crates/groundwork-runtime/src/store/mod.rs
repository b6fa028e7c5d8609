//! Fact Store.
//!
//! Append-only: there is no update and no delete. A correction is a new fact
//! with a bumped `fact_version`, validated like any extracted fact before it
//! is written. Each `store_facts` call is one transaction; the whole batch
//! becomes visible or none of it does.
//!
//! ## Versions
//!
//! Extraction writes generation `extraction_version`. A correction of a fact
//! at version `v` lands at `v + 1`, so one version may hold both extracted
//! facts and corrections. Reuse checks look at extracted rows only
//! ([`FactStore::has_extraction`]).
//!
//! Backends:
//! - [`MemoryFactStore`]: append log, for tests and single-process use
//! - [`SqliteFactStore`] (feature `sqlite`): durable, `UPDATE` refused by trigger

use async_trait::async_trait;
use thiserror::Error;

use groundwork_core::{
    ExtractionMethod, Fact, FactId, FactValidator, SourceSpan, ValidationContext,
};

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryFactStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFactStore;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Invalid fact {fact_id}: {reason}")]
    InvalidFact { fact_id: FactId, reason: String },

    #[error("Fact {0} already stored")]
    DuplicateFact(FactId),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait FactStore: Send + Sync {
    /// Append a batch atomically. Returns the number of facts written.
    async fn store_facts(&self, facts: &[Fact]) -> Result<usize, StoreError>;

    /// Facts of one generation, ordered by creation time.
    async fn get_facts(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<Vec<Fact>, StoreError>;

    /// Highest stored version for a transcription.
    async fn latest_version(&self, transcription_id: &str) -> Result<Option<u32>, StoreError>;

    /// All stored versions for a transcription, ascending.
    async fn versions(&self, transcription_id: &str) -> Result<Vec<u32>, StoreError>;

    async fn has_generation(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<bool, StoreError> {
        Ok(self.versions(transcription_id).await?.contains(&version))
    }

    /// Whether extracted facts (not corrections) exist at this version.
    async fn has_extraction(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<bool, StoreError> {
        Ok(self
            .get_facts(transcription_id, version)
            .await?
            .iter()
            .any(|f| f.extraction_method() == ExtractionMethod::LlmDecomposition))
    }

    fn name(&self) -> &str;
}

/// Row-level checks applied to every fact before a batch is written.
pub(crate) fn check_fact(fact: &Fact) -> Result<(), StoreError> {
    let invalid = |reason: String| StoreError::InvalidFact {
        fact_id: fact.fact_id(),
        reason,
    };

    if fact.transcription_id().trim().is_empty() {
        return Err(invalid("empty transcription_id".to_string()));
    }
    if fact.fact_text().trim().is_empty() {
        return Err(invalid("empty fact_text".to_string()));
    }
    if fact.fact_version() == 0 {
        return Err(invalid("fact_version must be at least 1".to_string()));
    }
    fact.source_span()
        .check_shape()
        .map_err(|e| invalid(e.to_string()))
}

/// Store a correction of `original` as a new fact at the next version.
///
/// `ctx` must carry the transcript of `original.transcription_id()`. The
/// correction runs through the full validator set: any HIGH violation is
/// returned as [`StoreError::InvalidFact`], MEDIUM findings are attached as
/// advisories.
pub async fn store_correction(
    store: &dyn FactStore,
    ctx: &ValidationContext<'_>,
    original: &Fact,
    fact_text: &str,
    source_span: SourceSpan,
    confidence: f64,
) -> Result<Fact, StoreError> {
    let correction = original.corrected(fact_text, source_span, confidence);

    let result = FactValidator::new().validate_fact(&correction, ctx);
    if let Some(violation) = result.blocking() {
        tracing::warn!(
            original = %original.fact_id(),
            validator = %violation.validator_name,
            "Correction rejected"
        );
        return Err(StoreError::InvalidFact {
            fact_id: correction.fact_id(),
            reason: format!("{}: {}", violation.validator_name, violation.message),
        });
    }

    let correction = correction.with_advisories(result.advisories());
    store.store_facts(std::slice::from_ref(&correction)).await?;
    tracing::info!(
        original = %original.fact_id(),
        correction = %correction.fact_id(),
        version = correction.fact_version(),
        "Correction appended"
    );
    Ok(correction)
}
