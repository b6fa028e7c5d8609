//! # groundwork-core
//!
//! Deterministic fact grounding and validation engine.
//!
//! This crate turns decomposed summary sentences into atomic facts pinned to
//! exact transcript offsets, and answers:
//! - Is this fact a single assertion?
//! - Does the cited transcript span actually support it?
//! - Does the source say the same thing, with the same polarity?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No LLM calls**: Grounding and validation are lexical
//! 3. **Traceable**: Every fact carries the literal span that evidences it
//! 4. **Parallel-safe**: Validators share no mutable state
//!
//! ## Example
//!
//! ```rust,ignore
//! use groundwork_core::{
//!     ground_candidates, Candidate, FactConfig, FactValidator, ValidationContext,
//! };
//!
//! let transcript = "I have a headache. I took ibuprofen for it.";
//! let config = FactConfig::default();
//! let candidates = [Candidate::new("User has a headache.")];
//! let outcome = ground_candidates(&candidates, "t-1", transcript, &config);
//!
//! let ctx = ValidationContext::new(transcript, &config);
//! for result in FactValidator::new().validate_facts(&outcome.facts, &ctx, 4) {
//!     println!("{} valid={}", result.fact_id, result.is_valid);
//! }
//! ```

pub mod candidate;
pub mod config;
pub mod decision;
pub mod grounding;
pub mod metrics;
pub mod text;
pub mod types;
pub mod validators;

// Re-export main types at crate root
pub use candidate::{
    ground_candidates, precheck, Candidate, Discard, DiscardReason, GroundingOutcome,
};
pub use config::{ConfigError, FactConfig};
pub use decision::{conclude, Verdict, VerificationEvidence};
pub use grounding::{Grounder, GroundingMatch};
pub use metrics::QualityReport;
pub use types::{
    CoVeDecision, CoVeResult, ExtractionMethod, Fact, FactId, Severity, SourceDocument,
    SourceSpan, SpanError, ValidationResult, VerificationStatus, VerifyOutcome, Violation,
};
pub use validators::{
    AtomicityValidator, ConsistencyValidator, FactValidator, GroundingValidator,
    SpecificityValidator, ValidationContext, Validator,
};

/// Split validation results into storable facts and rejections.
///
/// Valid facts carry their MEDIUM/LOW findings as advisories. Results are
/// matched to facts by id.
pub fn partition_valid(
    facts: Vec<Fact>,
    results: &[ValidationResult],
) -> (Vec<Fact>, Vec<ValidationResult>) {
    let mut accepted = Vec::with_capacity(facts.len());
    let mut rejected = Vec::new();

    for fact in facts {
        match results.iter().find(|r| r.fact_id == fact.fact_id()) {
            Some(result) if result.is_valid => {
                accepted.push(fact.with_advisories(result.advisories()));
            }
            Some(result) => rejected.push(result.clone()),
            // A fact nobody validated is never stored
            None => rejected.push(ValidationResult::from_violations(
                fact.fact_id(),
                vec![Violation::high("validator", "fact was not validated")],
            )),
        }
    }

    (accepted, rejected)
}
