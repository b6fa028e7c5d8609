//! Atomicity: a fact expresses exactly one assertion.
//!
//! A text is compound when two clauses are joined by a semicolon, or when a
//! conjunction is followed (after optional adverbs) by a new subject or a
//! finite verb. Coordinated objects such as "headache and nausea" stay atomic.

use crate::text::words;
use crate::types::{Fact, Violation};

use super::patterns::has_semicolon_clauses;
use super::{ValidationContext, Validator};

const NAME: &str = "atomicity";

const CONJUNCTIONS: &[&str] = &[
    "and", "but", "or", "nor", "so", "yet", "because", "although", "though", "while", "whereas",
    "since", "whilst",
];

/// Adverbs that may sit between a conjunction and the verb it introduces.
const ADVERBS: &[&str] = &[
    "also", "then", "later", "still", "never", "not", "just", "now", "often", "always",
    "sometimes", "usually", "recently", "afterwards", "again", "even", "eventually", "finally",
];

const SUBJECTS: &[&str] = &[
    "i", "he", "she", "they", "we", "you", "it", "there", "user", "speaker", "patient", "caller",
    "client", "customer", "participant",
];

const FINITE_VERBS: &[&str] = &[
    "has", "had", "have", "is", "was", "are", "were", "am", "does", "did", "do", "took", "takes",
    "felt", "feels", "went", "goes", "said", "says", "told", "tells", "got", "gets", "made",
    "makes", "saw", "sees", "ate", "eats", "slept", "sleeps", "bought", "buys", "thought",
    "thinks", "wants", "needs", "likes", "can", "could", "will", "would", "should", "may",
    "might", "must",
];

/// Participles that usually read as adjectives after "and".
const ADJECTIVAL_PARTICIPLES: &[&str] = &[
    "tired", "scared", "worried", "stressed", "bored", "excited", "interested", "confused",
    "annoyed", "relaxed", "exhausted", "frustrated", "concerned", "embarrassed", "depressed",
    "overwhelmed", "motivated", "surprised", "satisfied", "disappointed", "isolated", "related",
    "red", "bed", "shed",
];

fn is_finite_verb(word: &str) -> bool {
    FINITE_VERBS.contains(&word)
        || (word.len() > 4 && word.ends_with("ed") && !ADJECTIVAL_PARTICIPLES.contains(&word))
}

/// Whether the text joins two independent clauses.
pub fn is_compound(text: &str) -> bool {
    if has_semicolon_clauses(text) {
        return true;
    }

    let tokens = words(text);
    for (i, token) in tokens.iter().enumerate() {
        // A leading conjunction opens the sentence, it does not join clauses
        if i == 0 || !CONJUNCTIONS.contains(&token.as_str()) {
            continue;
        }

        let next = tokens[i + 1..]
            .iter()
            .find(|w| !ADVERBS.contains(&w.as_str()));

        if let Some(next) = next {
            if SUBJECTS.contains(&next.as_str()) || is_finite_verb(next) {
                return true;
            }
        }
    }

    false
}

/// Rejects compound claims and out-of-bounds lengths.
pub struct AtomicityValidator;

impl AtomicityValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AtomicityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for AtomicityValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn check(&self, fact: &Fact, ctx: &ValidationContext<'_>) -> Vec<Violation> {
        let mut violations = Vec::new();
        let text = fact.fact_text();

        if !ctx.config.length_in_bounds(text) {
            violations.push(Violation::high(
                NAME,
                format!(
                    "fact_text length {} outside [{}, {}]",
                    text.chars().count(),
                    ctx.config.min_fact_length,
                    ctx.config.max_fact_length
                ),
            ));
        }

        if is_compound(text) {
            violations.push(Violation::high(NAME, "compound claim joins two assertions"));
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactConfig;
    use crate::types::{ExtractionMethod, Severity, SourceSpan};

    #[test]
    fn test_single_assertions() {
        assert!(!is_compound("User has a headache."));
        assert!(!is_compound("User took ibuprofen for a headache and nausea."));
        assert!(!is_compound("User was tired and scared."));
        assert!(!is_compound("And then the user left."));
    }

    #[test]
    fn test_compound_claims() {
        assert!(is_compound("User feels great and also mentioned something vague."));
        assert!(is_compound("User has a headache and took ibuprofen."));
        assert!(is_compound("User slept badly but she feels fine."));
        assert!(is_compound("User slept badly; woke at five."));
        assert!(is_compound("User stayed home because it was raining."));
    }

    #[test]
    fn test_validator_reports_high() {
        let transcript = "I have a headache and I took ibuprofen.";
        let span = SourceSpan::from_transcript(transcript, 0, 39).unwrap();
        let fact = Fact::new(
            "t",
            "User has a headache and took ibuprofen.",
            span,
            0.9,
            ExtractionMethod::LlmDecomposition,
            1,
        );
        let config = FactConfig::default();
        let ctx = ValidationContext::new(transcript, &config);

        let violations = AtomicityValidator::new().check(&fact, &ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::High);
        assert_eq!(violations[0].validator_name, "atomicity");
    }

    #[test]
    fn test_validator_reports_length() {
        let transcript = "I'm ok.";
        let span = SourceSpan::from_transcript(transcript, 0, 7).unwrap();
        let fact = Fact::new("t", "User ok.", span, 0.9, ExtractionMethod::LlmDecomposition, 1);
        let config = FactConfig::default();
        let ctx = ValidationContext::new(transcript, &config);

        let violations = AtomicityValidator::new().check(&fact, &ctx);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("length"));
    }
}
