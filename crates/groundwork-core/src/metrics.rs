//! Quality metrics over stored facts.
//!
//! - **Citation coverage**: fraction of facts whose span is a valid,
//!   literal slice of the transcript.
//! - **Hallucination rate**: fraction of facts their cited span does not
//!   support (grounding or consistency reports HIGH).
//!
//! An empty fact set has full coverage and no hallucinations.

use serde::{Deserialize, Serialize};

use crate::types::{Fact, Severity, VerificationStatus};
use crate::validators::{ConsistencyValidator, GroundingValidator, ValidationContext, Validator};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub total_facts: usize,
    pub cited_facts: usize,
    pub unsupported_facts: usize,
    pub unverified: usize,
    pub passed: usize,
    pub needs_revision: usize,
    pub mean_confidence: f64,
}

impl QualityReport {
    /// Measure the facts of one transcript.
    pub fn compute(facts: &[Fact], ctx: &ValidationContext<'_>) -> Self {
        let grounding = GroundingValidator::new();
        let consistency = ConsistencyValidator::new();

        let mut report = Self {
            total_facts: facts.len(),
            ..Default::default()
        };

        let mut confidence_sum = 0.0;
        for fact in facts {
            confidence_sum += fact.confidence_score();

            if fact.source_span().verify(ctx.transcript).is_ok() {
                report.cited_facts += 1;
            }

            let unsupported = grounding
                .check(fact, ctx)
                .into_iter()
                .chain(consistency.check(fact, ctx))
                .any(|v| v.severity == Severity::High);
            if unsupported {
                report.unsupported_facts += 1;
            }

            match fact.verification_status() {
                VerificationStatus::Unverified => report.unverified += 1,
                VerificationStatus::Passed => report.passed += 1,
                VerificationStatus::NeedsRevision => report.needs_revision += 1,
                VerificationStatus::Rejected => {}
            }
        }

        if !facts.is_empty() {
            report.mean_confidence = confidence_sum / facts.len() as f64;
        }
        report
    }

    pub fn citation_coverage(&self) -> f64 {
        if self.total_facts == 0 {
            return 1.0;
        }
        self.cited_facts as f64 / self.total_facts as f64
    }

    pub fn hallucination_rate(&self) -> f64 {
        if self.total_facts == 0 {
            return 0.0;
        }
        self.unsupported_facts as f64 / self.total_facts as f64
    }

    /// Combine reports from several transcripts.
    pub fn merge(&mut self, other: &QualityReport) {
        let total = self.total_facts + other.total_facts;
        if total > 0 {
            self.mean_confidence = (self.mean_confidence * self.total_facts as f64
                + other.mean_confidence * other.total_facts as f64)
                / total as f64;
        }
        self.total_facts = total;
        self.cited_facts += other.cited_facts;
        self.unsupported_facts += other.unsupported_facts;
        self.unverified += other.unverified;
        self.passed += other.passed;
        self.needs_revision += other.needs_revision;
    }
}
