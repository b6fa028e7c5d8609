//! End-to-end fact pipeline.
//!
//! Extract → Validate → Verify (optional) → Store, for one transcription.
//!
//! - Extraction and verification are the suspension points; both abort when
//!   the cancellation token fires.
//! - Validation is CPU work on scoped threads, moved off the async runtime.
//! - Storage is the commit point. Nothing upstream is written, and nothing
//!   stored is rolled back.
//! - A generation whose extracted facts are already stored is returned as is.
//!   Corrections sharing its version are left out of the reused report.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use groundwork_core::{
    partition_valid, ExtractionMethod, Fact, FactConfig, FactValidator, SourceDocument,
    ValidationContext,
};

use crate::cache::DecompositionCache;
use crate::capability::{ResilientGenerator, TextGenerator};
use crate::config::RuntimeConfig;
use crate::extractor::{ExtractionError, FactExtractor};
use crate::resilience::{BudgetTracker, CircuitBreaker, GenerationUsage};
use crate::source::{SourceError, SourceRepository};
use crate::store::{FactStore, StoreError};
use crate::verification::VerificationPipeline;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("Source unavailable: {0}")]
    Source(#[from] SourceError),

    #[error("Validation task failed: {0}")]
    Validation(String),

    #[error("Cancelled before facts were stored")]
    Cancelled,
}

impl PipelineError {
    /// Whether the caller may retry the whole transcription.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Extraction(_) | PipelineError::Store(StoreError::Backend(_))
        )
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PipelineStats {
    pub candidates: usize,
    pub discarded: usize,
    pub rejected_by_validation: usize,
    pub rejected_by_verification: usize,
    pub unverified: usize,
    pub stored: usize,
    pub malformed_output: bool,
    pub from_cache: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineReport {
    pub transcription_id: String,
    pub version: u32,
    pub facts: Vec<Fact>,
    pub stats: PipelineStats,

    /// The generation was already stored; nothing was extracted
    pub reused: bool,
}

pub struct FactPipeline {
    generator: Arc<ResilientGenerator>,
    extractor: FactExtractor,
    validator: Arc<FactValidator>,
    verifier: Option<VerificationPipeline>,
    store: Arc<dyn FactStore>,
    config: FactConfig,
    validation_workers: usize,
}

impl FactPipeline {
    /// Build a pipeline. The generator is wrapped with the configured
    /// timeouts, retries, circuit breaker and budgets.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn FactStore>,
        config: &RuntimeConfig,
    ) -> Self {
        let generator = Arc::new(
            ResilientGenerator::new(generator, config.timeouts.clone(), config.retry.clone())
                .with_circuit_breaker(Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())))
                .with_budget(Arc::new(BudgetTracker::new(&config.budgets))),
        );

        let mut extractor = FactExtractor::new(generator.clone(), config.facts.clone());
        if config.cache.enabled {
            let cache = DecompositionCache::from_config(&config.cache);
            extractor = extractor.with_cache(Arc::new(cache));
        }

        let verifier = config.facts.enable_verification.then(|| {
            VerificationPipeline::new(
                generator.clone(),
                config.facts.clone(),
                config.verification_pool_size,
            )
        });

        Self {
            generator,
            extractor,
            validator: Arc::new(FactValidator::new()),
            verifier,
            store,
            config: config.facts.clone(),
            validation_workers: config.validation_workers,
        }
    }

    /// Replace the default validator set.
    pub fn with_validator(mut self, validator: FactValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    pub fn verification_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    /// Generation usage across every run of this pipeline.
    pub fn usage(&self) -> GenerationUsage {
        self.generator.usage()
    }

    /// Fetch the source and process it.
    pub async fn process_transcription(
        &self,
        sources: &dyn SourceRepository,
        transcription_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let source = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            source = sources.fetch(transcription_id) => source?,
        };
        self.process(&source, cancel).await
    }

    pub async fn process(
        &self,
        source: &SourceDocument,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let tid = source.transcription_id.as_str();
        let version = self.config.extraction_version;

        // Corrections at this version do not make it a stored generation
        if self.store.has_extraction(tid, version).await? {
            let facts: Vec<Fact> = self
                .store
                .get_facts(tid, version)
                .await?
                .into_iter()
                .filter(|f| f.extraction_method() == ExtractionMethod::LlmDecomposition)
                .collect();
            info!(
                transcription_id = tid,
                version,
                facts = facts.len(),
                "Generation already stored"
            );
            return Ok(PipelineReport {
                transcription_id: tid.to_string(),
                version,
                stats: PipelineStats {
                    stored: facts.len(),
                    ..PipelineStats::default()
                },
                facts,
                reused: true,
            });
        }

        info!(transcription_id = tid, version, "Processing transcription");
        let mut stats = PipelineStats::default();

        // Extract
        let extraction = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = self
                .extractor
                .extract_with_stats(&source.summary, &source.transcript, tid) => result?,
        };
        stats.candidates = extraction.candidate_count;
        stats.discarded = extraction.discarded.len();
        stats.malformed_output = extraction.malformed;
        stats.from_cache = extraction.from_cache;

        // Validate
        let (mut facts, rejected) = self.validate(extraction.facts, &source.transcript).await?;
        stats.rejected_by_validation = rejected.len();
        for result in &rejected {
            if let Some(violation) = result.blocking() {
                debug!(
                    fact_id = %result.fact_id,
                    validator = %violation.validator_name,
                    message = %violation.message,
                    "Fact rejected by validation"
                );
            }
        }

        // Verify
        if let Some(verifier) = &self.verifier {
            if !facts.is_empty() {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    outcome = verifier.verify_facts(facts, &source.transcript) => outcome,
                };
                stats.rejected_by_verification = outcome.rejected.len();
                stats.unverified = outcome.unverified;
                facts = outcome.facts;
            }
        }

        // Store
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !facts.is_empty() {
            self.store.store_facts(&facts).await?;
        }
        stats.stored = facts.len();

        info!(
            transcription_id = tid,
            version,
            candidates = stats.candidates,
            discarded = stats.discarded,
            rejected_by_validation = stats.rejected_by_validation,
            rejected_by_verification = stats.rejected_by_verification,
            stored = stats.stored,
            "Transcription processed"
        );

        Ok(PipelineReport {
            transcription_id: tid.to_string(),
            version,
            facts,
            stats,
            reused: false,
        })
    }

    async fn validate(
        &self,
        facts: Vec<Fact>,
        transcript: &str,
    ) -> Result<(Vec<Fact>, Vec<groundwork_core::ValidationResult>), PipelineError> {
        if facts.is_empty() {
            return Ok((facts, Vec::new()));
        }

        let validator = self.validator.clone();
        let transcript = transcript.to_string();
        let config = self.config.clone();
        let workers = self.validation_workers;

        tokio::task::spawn_blocking(move || {
            let ctx = ValidationContext::new(&transcript, &config);
            let results = validator.validate_facts(&facts, &ctx, workers);
            partition_valid(facts, &results)
        })
        .await
        .map_err(|e| PipelineError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CallSite;
    use crate::config::RetryConfig;
    use crate::source::MemorySourceRepository;
    use crate::store::{store_correction, MemoryFactStore};
    use crate::testing::ScriptedGenerator;
    use std::time::Duration;

    const TRANSCRIPT: &str = "I have a headache. I took ibuprofen for it.";
    const SUMMARY: &str = "User has a headache. User took ibuprofen.";
    const CANDIDATES: &str =
        r#"{"facts": [{"text": "User has a headache."}, {"text": "User took ibuprofen."}]}"#;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            retry: RetryConfig {
                max_retries: 2,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..RuntimeConfig::default()
        }
    }

    fn pipeline(generator: Arc<ScriptedGenerator>, store: Arc<MemoryFactStore>) -> FactPipeline {
        FactPipeline::new(generator, store, &config())
    }

    #[tokio::test]
    async fn test_process_stores_valid_facts() {
        let generator = Arc::new(ScriptedGenerator::new().on(CallSite::Decompose, "", CANDIDATES));
        let store = Arc::new(MemoryFactStore::new());
        let pipeline = pipeline(generator, store.clone());

        let report = pipeline
            .process(&SourceDocument::new("t-1", TRANSCRIPT, SUMMARY), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.reused);
        assert_eq!(report.stats.candidates, 2);
        assert_eq!(report.stats.stored, 2);
        assert_eq!(store.get_facts("t-1", 1).await.unwrap(), report.facts);
        assert_eq!(pipeline.usage().calls_by_site[&CallSite::Decompose], 1);
    }

    #[tokio::test]
    async fn test_rerun_reuses_stored_generation() {
        let generator = Arc::new(ScriptedGenerator::new().on(CallSite::Decompose, "", CANDIDATES));
        let store = Arc::new(MemoryFactStore::new());
        let pipeline = pipeline(generator.clone(), store.clone());
        let source = SourceDocument::new("t-1", TRANSCRIPT, SUMMARY);

        let first = pipeline.process(&source, &CancellationToken::new()).await.unwrap();
        let second = pipeline.process(&source, &CancellationToken::new()).await.unwrap();

        assert!(second.reused);
        assert_eq!(first.facts, second.facts);
        assert_eq!(generator.call_count(CallSite::Decompose), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_correction_does_not_mark_next_generation_stored() {
        let generator = Arc::new(ScriptedGenerator::new().on(CallSite::Decompose, "", CANDIDATES));
        let store = Arc::new(MemoryFactStore::new());
        let source = SourceDocument::new("t-1", TRANSCRIPT, SUMMARY);

        let first = pipeline(generator.clone(), store.clone())
            .process(&source, &CancellationToken::new())
            .await
            .unwrap();
        let original = first
            .facts
            .iter()
            .find(|f| f.fact_text() == "User has a headache.")
            .unwrap();

        let fact_config = FactConfig::default();
        let ctx = ValidationContext::new(TRANSCRIPT, &fact_config);
        let span = original.source_span().clone();
        let correction =
            store_correction(&*store, &ctx, original, "User has a headache.", span, 0.95)
                .await
                .unwrap();
        assert_eq!(correction.fact_version(), 2);

        let mut next = config();
        next.facts.extraction_version = 2;
        let second = FactPipeline::new(generator.clone(), store.clone(), &next)
            .process(&source, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!second.reused);
        assert_eq!(second.stats.stored, 2);
        assert_eq!(generator.call_count(CallSite::Decompose), 2);
        assert_eq!(store.get_facts("t-1", 2).await.unwrap().len(), 3);

        let third = FactPipeline::new(generator.clone(), store.clone(), &next)
            .process(&source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(third.reused);
        assert_eq!(third.facts, second.facts);
        assert_eq!(generator.call_count(CallSite::Decompose), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_write_nothing() {
        let generator = Arc::new(ScriptedGenerator::new().fail_times(CallSite::Decompose, 10));
        let store = Arc::new(MemoryFactStore::new());
        let pipeline = pipeline(generator.clone(), store.clone());

        let result = pipeline
            .process(&SourceDocument::new("t-1", TRANSCRIPT, SUMMARY), &CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert!(err.is_retryable());
        assert_eq!(generator.call_count(CallSite::Decompose), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let generator = Arc::new(ScriptedGenerator::new().on(CallSite::Decompose, "", CANDIDATES));
        let store = Arc::new(MemoryFactStore::new());
        let pipeline = pipeline(generator.clone(), store.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pipeline
            .process(&SourceDocument::new("t-1", TRANSCRIPT, SUMMARY), &cancel)
            .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let pipeline = pipeline(
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryFactStore::new()),
        );
        let sources = MemorySourceRepository::new();
        let result = pipeline
            .process_transcription(&sources, "t-404", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PipelineError::Source(SourceError::NotFound(_)))));
    }
}
