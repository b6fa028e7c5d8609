//! Consistency: no polarity mismatch between a fact and its source context.
//!
//! ## Severity
//!
//! Polarity is compared per sentence of the span, against the sentences that
//! share a topic with the fact.
//!
//! | Condition | Severity |
//! |-----------|----------|
//! | Fact disagrees on negation with every on-topic span sentence | HIGH |
//! | Same disagreement, but the span is hedged ("not sure", "maybe") | MEDIUM |
//! | A neighboring sentence on the same topic has the opposite polarity | MEDIUM |

use std::collections::HashSet;

use crate::text::{char_slice, is_hedged, is_negated, sentences, topic_tokens};
use crate::types::{Fact, Violation};

use super::{ValidationContext, Validator};

const NAME: &str = "consistency";

pub struct ConsistencyValidator;

impl ConsistencyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Sentences adjacent to (but not overlapping) the span.
    fn neighbors<'t>(&self, fact: &Fact, transcript: &'t str, width: usize) -> Vec<&'t str> {
        if width == 0 {
            return Vec::new();
        }

        let span = fact.source_span();
        let all = sentences(transcript);
        let Some(first) = all.iter().position(|s| span.overlaps(s.start, s.end)) else {
            return Vec::new();
        };
        let last = all
            .iter()
            .rposition(|s| span.overlaps(s.start, s.end))
            .unwrap_or(first);

        let before = first.saturating_sub(width)..first;
        let after = (last + 1)..(last + 1 + width).min(all.len());

        before
            .chain(after)
            .filter_map(|i| char_slice(transcript, all[i].start, all[i].end))
            .collect()
    }
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Span sentences that share a topic token with the claim.
///
/// Polarity is judged per sentence, so two negated sentences in one span do
/// not cancel out. Falls back to every sentence when none share a topic.
fn relevant_sentences<'s>(source: &'s str, topic: &HashSet<String>) -> Vec<&'s str> {
    let all: Vec<&str> = sentences(source)
        .iter()
        .filter_map(|s| char_slice(source, s.start, s.end))
        .collect();

    let on_topic: Vec<&str> = all
        .iter()
        .copied()
        .filter(|sentence| !topic_tokens(sentence).is_disjoint(topic))
        .collect();

    if on_topic.is_empty() {
        all
    } else {
        on_topic
    }
}

impl Validator for ConsistencyValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn check(&self, fact: &Fact, ctx: &ValidationContext<'_>) -> Vec<Violation> {
        let claim = fact.fact_text();
        let source = &fact.source_span().text;
        let claim_negated = is_negated(claim);
        let topic = topic_tokens(claim);

        let relevant = relevant_sentences(source, &topic);
        let disagree = !relevant.is_empty()
            && relevant
                .iter()
                .all(|sentence| is_negated(sentence) != claim_negated);

        if disagree {
            let (asserts, source_asserts) = if claim_negated {
                ("absence", "presence")
            } else {
                ("presence", "absence")
            };

            let message = format!(
                "fact asserts {} but source asserts {}: '{}'",
                asserts, source_asserts, source
            );
            if relevant.iter().any(|sentence| is_hedged(sentence)) {
                return vec![Violation::medium(NAME, format!("{} (hedged)", message))];
            }
            return vec![Violation::high(NAME, message)];
        }

        if topic.is_empty() {
            return Vec::new();
        }

        self.neighbors(fact, ctx.transcript, ctx.config.consistency_window_sentences)
            .into_iter()
            .find(|sentence| {
                is_negated(sentence) != claim_negated
                    && !topic_tokens(sentence).is_disjoint(&topic)
            })
            .map(|sentence| {
                vec![Violation::medium(
                    NAME,
                    format!("nearby source sentence has opposite polarity: '{}'", sentence),
                )]
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactConfig;
    use crate::grounding::Grounder;
    use crate::types::{ExtractionMethod, Severity, SourceSpan};

    fn check(transcript: &str, claim: &str) -> Vec<Violation> {
        let span = Grounder::new(transcript, 1).best(claim).unwrap().span;
        let fact = Fact::new("t", claim, span, 0.9, ExtractionMethod::LlmDecomposition, 1);
        let config = FactConfig::default();
        ConsistencyValidator::new().check(&fact, &ValidationContext::new(transcript, &config))
    }

    #[test]
    fn test_matching_polarity_passes() {
        assert!(check("I definitely have a fever.", "User has a fever.").is_empty());
        assert!(check("I don't have a fever.", "User has no fever.").is_empty());
    }

    #[test]
    fn test_clear_mismatch_is_high() {
        let violations = check("I definitely have a fever.", "User has no fever.");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::High);
        assert!(violations[0].message.contains("absence"));
    }

    #[test]
    fn test_hedged_mismatch_is_medium() {
        let violations = check("I'm not sure I have a fever.", "User has a fever.");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Medium);
    }

    #[test]
    fn test_contradicting_neighbor_is_medium() {
        let transcript = "I had a fever on Monday. Actually, I never had a fever at all. I slept.";
        let violations = check(transcript, "User had a fever on Monday.");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Medium);
        assert!(violations[0].message.contains("opposite polarity"));
    }

    #[test]
    fn test_unrelated_neighbor_ignored() {
        let transcript = "I have a headache. I don't like coffee.";
        assert!(check(transcript, "User has a headache.").is_empty());
    }

    fn check_span(transcript: &str, claim: &str, start: usize, end: usize) -> Vec<Violation> {
        let span = SourceSpan::from_transcript(transcript, start, end).unwrap();
        let fact = Fact::new("t", claim, span, 0.9, ExtractionMethod::LlmDecomposition, 1);
        let config = FactConfig::default();
        ConsistencyValidator::new().check(&fact, &ValidationContext::new(transcript, &config))
    }

    #[test]
    fn test_negated_sentences_do_not_cancel() {
        let transcript = "I don't have a fever. I don't have chills.";
        let end = transcript.chars().count();
        assert!(check_span(transcript, "User has no fever or chills.", 0, end).is_empty());
    }

    #[test]
    fn test_off_topic_sentence_ignored_in_span() {
        let transcript = "I have a headache. I don't have a fever.";
        let end = transcript.chars().count();
        assert!(check_span(transcript, "User has no fever.", 0, end).is_empty());
    }

    #[test]
    fn test_every_on_topic_sentence_disagreeing_is_high() {
        let transcript = "I have a fever. I have chills.";
        let end = transcript.chars().count();
        let violations = check_span(transcript, "User has no fever or chills.", 0, end);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::High);
    }
}
