//! Chain-of-verification.
//!
//! For each fact: Plan a closed question, Execute it against the transcript
//! alone, then apply the decision policy from [`groundwork_core::decision`].
//! An unanswered question is rephrased for another round, up to
//! `max_verification_rounds`.
//!
//! Verification refines confidence; it never gates storage on failure. Any
//! generation or parse error leaves the fact at its pre-verification
//! confidence, without a CoVe result.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use groundwork_core::text::normalize_whitespace;
use groundwork_core::{
    conclude, CoVeDecision, CoVeResult, Fact, FactConfig, Verdict, VerificationEvidence,
    VerifyOutcome,
};

use crate::capability::{CallSite, GenerationContext, GenerationError, TextGenerator};
use crate::prompts::{plan_prompt, PLAN_SYSTEM_PROMPT};
use crate::response::{parse_answer, parse_question, AnswerKind, ResponseError, SourceAnswer};

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Verification call failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Unusable verification response: {0}")]
    Response(#[from] ResponseError),
}

#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    /// Facts to store, annotated unless they failed open
    pub facts: Vec<Fact>,

    /// Results of facts dropped on REJECT
    pub rejected: Vec<CoVeResult>,

    /// Facts that failed open
    pub unverified: usize,
}

pub struct VerificationPipeline {
    generator: Arc<dyn TextGenerator>,
    config: FactConfig,
    pool_size: usize,
}

impl VerificationPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>, config: FactConfig, pool_size: usize) -> Self {
        Self {
            generator,
            config,
            pool_size: pool_size.max(1),
        }
    }

    /// `verify_facts(facts, context) -> [Fact]`. Output keeps input order.
    pub async fn verify_facts(&self, facts: Vec<Fact>, transcript: &str) -> VerificationOutcome {
        let total = facts.len();
        let verdicts: Vec<(Fact, Result<Verdict, VerificationError>)> = stream::iter(facts)
            .map(|fact| async move {
                let verdict = self.verify_fact(&fact, transcript).await;
                (fact, verdict)
            })
            .buffered(self.pool_size)
            .collect()
            .await;

        let mut outcome = VerificationOutcome::default();
        for (fact, verdict) in verdicts {
            match verdict {
                Ok(verdict) if verdict.decision() == CoVeDecision::Reject => {
                    debug!(fact_id = %fact.fact_id(), "Fact rejected by verification");
                    outcome.rejected.push(verdict.result);
                }
                Ok(verdict) => {
                    debug!(
                        fact_id = %fact.fact_id(),
                        decision = ?verdict.decision(),
                        confidence = verdict.confidence,
                        "Fact verified"
                    );
                    outcome.facts.extend(verdict.apply(fact));
                }
                Err(e) => {
                    warn!(fact_id = %fact.fact_id(), error = %e, "Verification failed open");
                    outcome.unverified += 1;
                    outcome.facts.push(fact);
                }
            }
        }

        info!(
            total,
            kept = outcome.facts.len(),
            rejected = outcome.rejected.len(),
            unverified = outcome.unverified,
            "Verification complete"
        );
        outcome
    }

    /// Plan, Execute and decide for one fact.
    pub async fn verify_fact(
        &self,
        fact: &Fact,
        transcript: &str,
    ) -> Result<Verdict, VerificationError> {
        let max_rounds = self.config.max_verification_rounds.max(1);
        let mut previous: Option<String> = None;
        let mut round = 1;

        loop {
            let question = self.plan(fact, previous.as_deref()).await?;
            let answer = self.execute(&question, transcript).await?;
            let outcome = classify(&answer, transcript);

            if outcome != VerifyOutcome::NotStated || round >= max_rounds {
                let evidence = VerificationEvidence {
                    question,
                    answer: answer.render(),
                    outcome,
                    rounds: round,
                };
                return Ok(conclude(fact, evidence, &self.config));
            }

            debug!(fact_id = %fact.fact_id(), round, "Question not answered by source, rephrasing");
            previous = Some(question);
            round += 1;
        }
    }

    async fn plan(&self, fact: &Fact, previous: Option<&str>) -> Result<String, VerificationError> {
        let ctx = GenerationContext::new(CallSite::Plan).with_system(PLAN_SYSTEM_PROMPT);
        let generation = self
            .generator
            .generate_text(&plan_prompt(fact.fact_text(), previous), &ctx)
            .await?;
        Ok(parse_question(&generation.text)?)
    }

    async fn execute(
        &self,
        question: &str,
        transcript: &str,
    ) -> Result<SourceAnswer, VerificationError> {
        let generation = self.generator.answer_from_context(question, transcript).await?;
        Ok(parse_answer(&generation.text)?)
    }
}

/// Map a source answer to a Verify outcome. A yes/no backed by a quote the
/// transcript does not contain counts as not stated.
pub fn classify(answer: &SourceAnswer, transcript: &str) -> VerifyOutcome {
    let outcome = match answer.answer {
        AnswerKind::Yes => VerifyOutcome::Consistent,
        AnswerKind::No => VerifyOutcome::Inconsistent,
        AnswerKind::NotStated => return VerifyOutcome::NotStated,
    };

    match answer.quote.as_deref() {
        Some(quote) if !quote_in_transcript(quote, transcript) => VerifyOutcome::NotStated,
        _ => outcome,
    }
}

fn quote_in_transcript(quote: &str, transcript: &str) -> bool {
    let needle = normalize_whitespace(
        quote
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '…')
            .trim(),
    )
    .to_lowercase();
    if needle.is_empty() {
        return true;
    }
    normalize_whitespace(transcript).to_lowercase().contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use groundwork_core::{ExtractionMethod, SourceSpan, VerificationStatus, Violation};

    const TRANSCRIPT: &str = "I have a headache. I took ibuprofen for it. I never had a fever.";

    fn fact(text: &str, start: usize, end: usize, confidence: f64) -> Fact {
        let span = SourceSpan::from_transcript(TRANSCRIPT, start, end).unwrap();
        Fact::new("t-1", text, span, confidence, ExtractionMethod::LlmDecomposition, 1)
    }

    fn pipeline(generator: ScriptedGenerator) -> (Arc<ScriptedGenerator>, VerificationPipeline) {
        let generator = Arc::new(generator);
        let pipeline = VerificationPipeline::new(generator.clone(), FactConfig::default(), 2);
        (generator, pipeline)
    }

    #[test]
    fn test_classify() {
        let yes = SourceAnswer {
            answer: AnswerKind::Yes,
            quote: Some("I have a  headache".to_string()),
        };
        assert_eq!(classify(&yes, TRANSCRIPT), VerifyOutcome::Consistent);

        let invented = SourceAnswer {
            answer: AnswerKind::Yes,
            quote: Some("my head was pounding".to_string()),
        };
        assert_eq!(classify(&invented, TRANSCRIPT), VerifyOutcome::NotStated);

        let no = SourceAnswer {
            answer: AnswerKind::No,
            quote: None,
        };
        assert_eq!(classify(&no, TRANSCRIPT), VerifyOutcome::Inconsistent);
    }

    #[tokio::test]
    async fn test_consistent_fact_passes_with_boost() {
        let (_, pipeline) = pipeline(
            ScriptedGenerator::new()
                .on(
                    CallSite::Plan,
                    "headache",
                    r#"{"question": "Does the speaker have a headache?"}"#,
                )
                .on(
                    CallSite::Execute,
                    "headache?",
                    r#"{"answer": "yes", "quote": "I have a headache."}"#,
                ),
        );

        let outcome = pipeline
            .verify_facts(vec![fact("User has a headache.", 0, 18, 0.8)], TRANSCRIPT)
            .await;

        assert_eq!(outcome.facts.len(), 1);
        let verified = &outcome.facts[0];
        assert_eq!(verified.verification_status(), VerificationStatus::Passed);
        assert!((verified.confidence_score() - 0.96).abs() < 1e-9);
        assert_eq!(verified.verification().unwrap().rounds, 1);
    }

    #[tokio::test]
    async fn test_inconsistent_fact_is_rejected() {
        let (_, pipeline) = pipeline(
            ScriptedGenerator::new()
                .on(
                    CallSite::Plan,
                    "fever",
                    r#"{"question": "Did the speaker have a fever?"}"#,
                )
                .on(
                    CallSite::Execute,
                    "fever?",
                    r#"{"answer": "no", "quote": "I never had a fever"}"#,
                ),
        );

        let outcome = pipeline
            .verify_facts(vec![fact("User had a fever.", 44, 64, 0.8)], TRANSCRIPT)
            .await;

        assert!(outcome.facts.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].decision, CoVeDecision::Reject);
        assert!((outcome.rejected[0].adjusted_confidence - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_not_stated_rephrases_then_concludes() {
        let (generator, pipeline) = pipeline(ScriptedGenerator::new());

        let outcome = pipeline
            .verify_facts(vec![fact("User took ibuprofen.", 19, 43, 0.8)], TRANSCRIPT)
            .await;

        assert_eq!(generator.call_count(CallSite::Plan), 2);
        assert_eq!(generator.call_count(CallSite::Execute), 2);
        let plans: Vec<_> = generator
            .calls()
            .into_iter()
            .filter(|c| c.site == CallSite::Plan)
            .collect();
        assert!(plans[1].prompt.contains("Rephrase"));

        let result = outcome.facts[0].verification().unwrap();
        assert_eq!(result.outcome, VerifyOutcome::NotStated);
        assert_eq!(result.rounds, 2);
        assert!((outcome.facts[0].confidence_score() - 0.56).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failure_is_fail_open() {
        let (_, pipeline) = pipeline(ScriptedGenerator::new().fail_on(CallSite::Plan, "ibuprofen"));

        let original = fact("User took ibuprofen.", 19, 43, 0.8);
        let outcome = pipeline.verify_facts(vec![original.clone()], TRANSCRIPT).await;

        assert_eq!(outcome.unverified, 1);
        assert_eq!(outcome.facts, vec![original]);
        assert_eq!(outcome.facts[0].verification_status(), VerificationStatus::Unverified);
    }

    #[tokio::test]
    async fn test_malformed_answer_is_fail_open() {
        let (_, pipeline) = pipeline(
            ScriptedGenerator::new().on(CallSite::Execute, "", "Yes, the speaker said so."),
        );

        let outcome = pipeline
            .verify_facts(vec![fact("User has a headache.", 0, 18, 0.8)], TRANSCRIPT)
            .await;

        assert_eq!(outcome.unverified, 1);
        assert_eq!(outcome.facts[0].confidence_score(), 0.8);
    }

    #[tokio::test]
    async fn test_needs_revision_with_advisories() {
        let (_, pipeline) = pipeline(
            ScriptedGenerator::new()
                .on(CallSite::Execute, "", r#"{"answer": "yes"}"#),
        );
        let advisories = (0..3)
            .map(|i| Violation::medium("specificity", format!("vague {}", i)))
            .collect();
        let f = fact("User has a headache.", 0, 18, 0.9).with_advisories(advisories);

        let outcome = pipeline.verify_facts(vec![f], TRANSCRIPT).await;

        let kept = &outcome.facts[0];
        assert_eq!(kept.verification_status(), VerificationStatus::NeedsRevision);
        assert!(kept.confidence_score() < FactConfig::default().verification_confidence_threshold);
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let (_, pipeline) = pipeline(
            ScriptedGenerator::new().on(CallSite::Execute, "", r#"{"answer": "yes"}"#),
        );
        let facts = vec![
            fact("User has a headache.", 0, 18, 0.8),
            fact("User took ibuprofen.", 19, 43, 0.8),
            fact("User has a headache today.", 0, 18, 0.8),
        ];
        let ids: Vec<_> = facts.iter().map(|f| f.fact_id()).collect();

        let outcome = pipeline.verify_facts(facts, TRANSCRIPT).await;
        let out_ids: Vec<_> = outcome.facts.iter().map(|f| f.fact_id()).collect();
        assert_eq!(out_ids, ids);
    }
}
