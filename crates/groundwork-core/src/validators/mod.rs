//! Fact validators.
//!
//! Each validator answers one question about a fact and reports
//! [`Violation`]s. Validators are stateless and read-only over the fact and
//! the transcript, so they run independently and in parallel.
//!
//! | Validator | Question | Severity |
//! |-----------|----------|----------|
//! | [`AtomicityValidator`] | Is this a single assertion of acceptable length? | HIGH |
//! | [`GroundingValidator`] | Does the cited span still support the text? | HIGH |
//! | [`ConsistencyValidator`] | Does the source assert the same polarity? | HIGH / MEDIUM |
//! | [`SpecificityValidator`] | Does the fact avoid vague referents? | MEDIUM |
//!
//! A fact is valid only with zero HIGH violations.

pub mod atomicity;
pub mod consistency;
pub mod grounding;
pub mod patterns;
pub mod specificity;

pub use atomicity::{is_compound, AtomicityValidator};
pub use consistency::ConsistencyValidator;
pub use grounding::GroundingValidator;
pub use specificity::SpecificityValidator;

use tracing::debug;

use crate::config::FactConfig;
use crate::types::{Fact, ValidationResult, Violation};

/// Read-only inputs shared by every validator in a run.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// The transcript named by the facts' transcription_id.
    pub transcript: &'a str,
    pub config: &'a FactConfig,
}

impl<'a> ValidationContext<'a> {
    pub fn new(transcript: &'a str, config: &'a FactConfig) -> Self {
        Self { transcript, config }
    }
}

/// Trait implemented by all validators.
pub trait Validator: Send + Sync {
    /// Name recorded on every violation this validator reports.
    fn name(&self) -> &'static str;

    /// Check one fact. An empty list means the fact passed.
    fn check(&self, fact: &Fact, ctx: &ValidationContext<'_>) -> Vec<Violation>;
}

/// Runs every registered validator over facts.
pub struct FactValidator {
    validators: Vec<Box<dyn Validator>>,
}

impl FactValidator {
    /// The four standard checks.
    pub fn new() -> Self {
        Self {
            validators: vec![
                Box::new(AtomicityValidator::new()),
                Box::new(GroundingValidator::new()),
                Box::new(ConsistencyValidator::new()),
                Box::new(SpecificityValidator::new()),
            ],
        }
    }

    /// Use a custom validator set.
    pub fn with_validators(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub fn validator_names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Validate a single fact.
    pub fn validate_fact(&self, fact: &Fact, ctx: &ValidationContext<'_>) -> ValidationResult {
        let violations: Vec<Violation> = self
            .validators
            .iter()
            .flat_map(|v| v.check(fact, ctx))
            .collect();

        let result = ValidationResult::from_violations(fact.fact_id(), violations);
        if !result.is_valid {
            debug!(
                fact_id = %fact.fact_id(),
                violations = result.violations.len(),
                "Fact failed validation"
            );
        }
        result
    }

    /// Validate a batch on up to `workers` scoped threads.
    ///
    /// Results come back in input order.
    pub fn validate_facts(
        &self,
        facts: &[Fact],
        ctx: &ValidationContext<'_>,
        workers: usize,
    ) -> Vec<ValidationResult> {
        let workers = workers.max(1);
        if facts.len() <= 1 || workers == 1 {
            return facts.iter().map(|f| self.validate_fact(f, ctx)).collect();
        }

        let chunk_size = facts.len().div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = facts
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|f| self.validate_fact(f, ctx))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

impl Default for FactValidator {
    fn default() -> Self {
        Self::new()
    }
}
