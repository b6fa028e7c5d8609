//! Grounding: the cited span still supports the fact.
//!
//! Re-checks the span against the transcript (offsets and literal text),
//! then recomputes similarity against `grounding_threshold`.

use crate::grounding::span_score;
use crate::types::{Fact, Violation};

use super::{ValidationContext, Validator};

const NAME: &str = "grounding";

pub struct GroundingValidator;

impl GroundingValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GroundingValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for GroundingValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn check(&self, fact: &Fact, ctx: &ValidationContext<'_>) -> Vec<Violation> {
        let span = fact.source_span();

        if let Err(e) = span.verify(ctx.transcript) {
            return vec![Violation::high(NAME, format!("source span invalid: {}", e))];
        }

        let score = span_score(fact.fact_text(), span);
        if score < ctx.config.grounding_threshold {
            return vec![Violation::high(
                NAME,
                format!(
                    "similarity {:.3} below grounding threshold {:.2}",
                    score, ctx.config.grounding_threshold
                ),
            )];
        }

        Vec::new()
    }
}
