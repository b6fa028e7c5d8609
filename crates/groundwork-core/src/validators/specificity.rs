//! Specificity: a fact names what it is about.
//!
//! Vague referents ("something", "various matters") carry no checkable
//! content. Each matched pattern is one MEDIUM violation.

use crate::types::{Fact, Violation};

use super::patterns::vague_referents;
use super::{ValidationContext, Validator};

const NAME: &str = "specificity";

pub struct SpecificityValidator;

impl SpecificityValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpecificityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for SpecificityValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn check(&self, fact: &Fact, _ctx: &ValidationContext<'_>) -> Vec<Violation> {
        vague_referents(fact.fact_text())
            .into_iter()
            .map(|label| Violation::medium(NAME, format!("vague referent: {}", label)))
            .collect()
    }
}
