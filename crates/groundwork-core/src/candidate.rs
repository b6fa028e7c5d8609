//! Stage-1 candidates and their conversion into grounded facts.
//!
//! A candidate is a sentence proposed by the decomposition step. It must pass
//! the lexical pre-check (length, atomicity) and then ground in the
//! transcript before it becomes a [`Fact`]. Every rejected candidate is kept
//! as a [`Discard`] with its reason.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FactConfig;
use crate::grounding::{initial_confidence, Grounder};
use crate::text::normalize_whitespace;
use crate::types::{ExtractionMethod, Fact};
use crate::validators::is_compound;

/// One atomic sentence proposed by decomposition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub text: String,

    /// Self-reported certainty in [0, 1], if the generator gave one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
}

impl Candidate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            certainty: None,
        }
    }

    pub fn with_certainty(mut self, certainty: f64) -> Self {
        self.certainty = Some(certainty);
        self
    }
}

/// Why a candidate never became a fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    TooShort { length: usize, min: usize },
    TooLong { length: usize, max: usize },
    Compound,
    Duplicate,
    Ungrounded { best_score: f64 },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::TooShort { length, min } => {
                write!(f, "too short ({} < {} chars)", length, min)
            }
            DiscardReason::TooLong { length, max } => {
                write!(f, "too long ({} > {} chars)", length, max)
            }
            DiscardReason::Compound => write!(f, "compound claim"),
            DiscardReason::Duplicate => write!(f, "duplicate candidate"),
            DiscardReason::Ungrounded { best_score } => {
                write!(f, "no span clears the threshold (best {:.3})", best_score)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Discard {
    pub text: String,
    #[serde(flatten)]
    pub reason: DiscardReason,
}

/// Facts built from a candidate list, plus everything that was dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundingOutcome {
    pub facts: Vec<Fact>,
    pub discarded: Vec<Discard>,
}

/// Length and atomicity pre-check applied before grounding.
pub fn precheck(text: &str, config: &FactConfig) -> Result<(), DiscardReason> {
    let length = text.chars().count();
    if length < config.min_fact_length {
        return Err(DiscardReason::TooShort {
            length,
            min: config.min_fact_length,
        });
    }
    if length > config.max_fact_length {
        return Err(DiscardReason::TooLong {
            length,
            max: config.max_fact_length,
        });
    }
    if is_compound(text) {
        return Err(DiscardReason::Compound);
    }
    Ok(())
}

/// Stage 2: ground every surviving candidate in the transcript.
///
/// Pure local computation. Facts come back in candidate order, all sharing
/// `config.extraction_version`.
pub fn ground_candidates(
    candidates: &[Candidate],
    transcription_id: &str,
    transcript: &str,
    config: &FactConfig,
) -> GroundingOutcome {
    let grounder = Grounder::new(transcript, config.max_window_sentences);
    let mut seen = HashSet::new();
    let mut outcome = GroundingOutcome::default();

    for candidate in candidates {
        let text = normalize_whitespace(&candidate.text);

        let verdict = precheck(&text, config).and_then(|()| {
            if !seen.insert(text.to_lowercase()) {
                return Err(DiscardReason::Duplicate);
            }
            match grounder.best(&text) {
                Some(m) if m.score >= config.grounding_threshold => Ok(m),
                other => Err(DiscardReason::Ungrounded {
                    best_score: other.map(|m| m.score).unwrap_or(0.0),
                }),
            }
        });

        match verdict {
            Ok(m) => {
                let confidence =
                    initial_confidence(m.score, candidate.certainty, config.confidence_prior);
                outcome.facts.push(Fact::new(
                    transcription_id,
                    text,
                    m.span,
                    confidence,
                    ExtractionMethod::LlmDecomposition,
                    config.extraction_version,
                ));
            }
            Err(reason) => {
                debug!(candidate = %text, reason = %reason, "Candidate discarded");
                outcome.discarded.push(Discard { text, reason });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "I have a headache. I took ibuprofen for it.";

    #[test]
    fn test_two_clause_summary() {
        let candidates = vec![
            Candidate::new("User has a headache."),
            Candidate::new("User took ibuprofen."),
        ];
        let outcome = ground_candidates(&candidates, "t-1", TRANSCRIPT, &FactConfig::default());

        assert_eq!(outcome.facts.len(), 2);
        assert!(outcome.discarded.is_empty());
        for fact in &outcome.facts {
            assert!(fact.confidence_score() > 0.7);
            assert!(fact.source_span().verify(TRANSCRIPT).is_ok());
            assert_eq!(fact.fact_version(), 1);
        }
        assert!(outcome.facts[0].source_span().overlaps(0, 18));
        assert!(outcome.facts[1].source_span().overlaps(19, 43));
    }

    #[test]
    fn test_discard_reasons() {
        let candidates = vec![
            Candidate::new("Headache."),
            Candidate::new("User has a headache and took ibuprofen."),
            Candidate::new("User bought a new car."),
            Candidate::new("User has a headache."),
            Candidate::new("User  has a   headache."),
        ];
        let outcome = ground_candidates(&candidates, "t-1", TRANSCRIPT, &FactConfig::default());

        assert_eq!(outcome.facts.len(), 1);
        let reasons: Vec<_> = outcome.discarded.iter().map(|d| &d.reason).collect();
        assert!(matches!(reasons[0], DiscardReason::TooShort { .. }));
        assert_eq!(reasons[1], &DiscardReason::Compound);
        assert!(matches!(reasons[2], DiscardReason::Ungrounded { .. }));
        assert_eq!(reasons[3], &DiscardReason::Duplicate);
    }

    #[test]
    fn test_certainty_feeds_confidence() {
        let candidates = vec![Candidate::new("User has a headache.").with_certainty(0.5)];
        let outcome = ground_candidates(&candidates, "t-1", TRANSCRIPT, &FactConfig::default());
        assert!((outcome.facts[0].confidence_score() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_json_shape() {
        let c: Candidate = serde_json::from_str(r#"{"text": "User has a headache."}"#).unwrap();
        assert_eq!(c.certainty, None);

        let d = Discard {
            text: "x".to_string(),
            reason: DiscardReason::Compound,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["reason"], "compound");
    }
}
