//! Fact Extractor.
//!
//! Stage 1 makes one decomposition call; Stage 2 grounds each candidate in
//! the transcript locally (see [`groundwork_core::ground_candidates`]).
//! A generation failure that survives the call-site retries fails the whole
//! extraction; malformed output only yields zero candidates.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use groundwork_core::{ground_candidates, Candidate, Discard, Fact, FactConfig};

use crate::cache::{DecompositionCache, DecompositionKey};
use crate::capability::{CallSite, GenerationContext, GenerationError, TextGenerator};
use crate::prompts::{decompose_prompt, DECOMPOSE_SYSTEM_PROMPT};
use crate::response::parse_candidates;

#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("Decomposition failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Facts plus what happened on the way.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub facts: Vec<Fact>,
    pub discarded: Vec<Discard>,
    pub candidate_count: usize,
    pub from_cache: bool,

    /// The decomposition output could not be parsed
    pub malformed: bool,
}

pub struct FactExtractor {
    generator: Arc<dyn TextGenerator>,
    config: FactConfig,
    cache: Option<Arc<DecompositionCache>>,
}

impl FactExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, config: FactConfig) -> Self {
        Self {
            generator,
            config,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<DecompositionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &FactConfig {
        &self.config
    }

    /// `extract_facts(summary, transcript) -> [Fact]`
    pub async fn extract_facts(
        &self,
        summary: &str,
        transcript: &str,
        transcription_id: &str,
    ) -> Result<Vec<Fact>, ExtractionError> {
        Ok(self
            .extract_with_stats(summary, transcript, transcription_id)
            .await?
            .facts)
    }

    pub async fn extract_with_stats(
        &self,
        summary: &str,
        transcript: &str,
        transcription_id: &str,
    ) -> Result<ExtractionOutput, ExtractionError> {
        if summary.trim().is_empty() || transcript.trim().is_empty() {
            debug!(transcription_id, "Empty summary or transcript, nothing to extract");
            return Ok(ExtractionOutput::default());
        }

        let (candidates, from_cache, malformed) = self.decompose(summary, transcription_id).await?;
        let grounded = ground_candidates(&candidates, transcription_id, transcript, &self.config);

        info!(
            transcription_id,
            candidates = candidates.len(),
            grounded = grounded.facts.len(),
            discarded = grounded.discarded.len(),
            from_cache,
            "Extraction complete"
        );

        Ok(ExtractionOutput {
            facts: grounded.facts,
            discarded: grounded.discarded,
            candidate_count: candidates.len(),
            from_cache,
            malformed,
        })
    }

    /// Stage 1. Returns (candidates, from_cache, malformed).
    async fn decompose(
        &self,
        summary: &str,
        transcription_id: &str,
    ) -> Result<(Vec<Candidate>, bool, bool), ExtractionError> {
        let key = DecompositionKey::new(summary, self.generator.name());
        if let Some(cache) = &self.cache {
            if let Some(candidates) = cache.get(&key).await {
                debug!(transcription_id, "Decomposition served from cache");
                return Ok((candidates, true, false));
            }
        }

        let ctx = GenerationContext::new(CallSite::Decompose).with_system(DECOMPOSE_SYSTEM_PROMPT);
        let generation = self
            .generator
            .generate_text(&decompose_prompt(summary), &ctx)
            .await?;

        match parse_candidates(&generation.text) {
            Ok(candidates) => {
                if let Some(cache) = &self.cache {
                    cache.insert(key, candidates.clone()).await;
                }
                Ok((candidates, false, false))
            }
            Err(e) => {
                warn!(
                    transcription_id,
                    error = %e,
                    "Malformed decomposition output, no candidates"
                );
                Ok((Vec::new(), false, true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    const TRANSCRIPT: &str = "I have a headache. I took ibuprofen for it.";
    const SUMMARY: &str = "User has a headache and took ibuprofen.";

    fn extractor(generator: Arc<ScriptedGenerator>) -> FactExtractor {
        FactExtractor::new(generator, FactConfig::default())
    }

    #[tokio::test]
    async fn test_two_clause_summary() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            CallSite::Decompose,
            "",
            r#"{"facts": [{"text": "User has a headache."}, {"text": "User took ibuprofen."}]}"#,
        ));
        let facts = extractor(generator)
            .extract_facts(SUMMARY, TRANSCRIPT, "t-1")
            .await
            .unwrap();

        assert_eq!(facts.len(), 2);
        assert!(facts[0].source_span().overlaps(0, 18));
        assert!(facts[1].source_span().overlaps(19, 43));
        for fact in &facts {
            assert!(fact.confidence_score() > 0.7);
            assert_eq!(fact.transcription_id(), "t-1");
        }
    }

    #[tokio::test]
    async fn test_empty_summary_makes_no_call() {
        let generator = Arc::new(ScriptedGenerator::new());
        let output = extractor(generator.clone())
            .extract_with_stats("   ", TRANSCRIPT, "t-1")
            .await
            .unwrap();

        assert!(output.facts.is_empty());
        assert_eq!(generator.call_count(CallSite::Decompose), 0);
    }

    #[tokio::test]
    async fn test_malformed_output_is_not_fatal() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            CallSite::Decompose,
            "",
            "The user has a headache and also took ibuprofen.",
        ));
        let output = extractor(generator)
            .extract_with_stats(SUMMARY, TRANSCRIPT, "t-1")
            .await
            .unwrap();

        assert!(output.malformed);
        assert_eq!(output.candidate_count, 0);
        assert!(output.facts.is_empty());
    }

    #[tokio::test]
    async fn test_ungrounded_candidate_is_discarded() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            CallSite::Decompose,
            "",
            r#"{"facts": [{"text": "User has a headache."}, {"text": "User visited a cardiologist."}]}"#,
        ));
        let output = extractor(generator)
            .extract_with_stats(SUMMARY, TRANSCRIPT, "t-1")
            .await
            .unwrap();

        assert_eq!(output.facts.len(), 1);
        assert_eq!(output.discarded.len(), 1);
        assert_eq!(output.discarded[0].text, "User visited a cardiologist.");
    }

    #[tokio::test]
    async fn test_generation_failure_is_an_error() {
        let generator = Arc::new(ScriptedGenerator::new().fail_times(CallSite::Decompose, 1));
        let result = extractor(generator).extract_facts(SUMMARY, TRANSCRIPT, "t-1").await;
        assert!(matches!(result, Err(ExtractionError::Generation(_))));
    }

    #[tokio::test]
    async fn test_cache_skips_second_call() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            CallSite::Decompose,
            "",
            r#"{"facts": [{"text": "User has a headache."}]}"#,
        ));
        let extractor =
            extractor(generator.clone()).with_cache(Arc::new(DecompositionCache::default()));

        let first = extractor.extract_with_stats(SUMMARY, TRANSCRIPT, "t-1").await.unwrap();
        let second = extractor.extract_with_stats(SUMMARY, TRANSCRIPT, "t-1").await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.facts.len(), 1);
        assert_eq!(generator.call_count(CallSite::Decompose), 1);
        // Fresh ids on every extraction
        assert_ne!(first.facts[0].fact_id(), second.facts[0].fact_id());
    }
}
