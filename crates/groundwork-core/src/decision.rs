//! Verification decision policy.
//!
//! Turns the outcome of a chain-of-verification run into a decision and a
//! recalibrated confidence. The rules are fixed:
//!
//! 1. Verify: consistent ×1.2 (capped at 1.0), inconsistent ×0.5, not stated ×0.7
//! 2. Final: inconsistent → REJECT
//! 3. Else ≥3 MEDIUM advisories → NEEDS_REVISION, confidence depressed below
//!    `verification_confidence_threshold`
//! 4. Else → PASS with the adjusted confidence

use crate::config::FactConfig;
use crate::types::{CoVeDecision, CoVeResult, Fact, VerifyOutcome};

pub const CONSISTENT_MULTIPLIER: f64 = 1.2;
pub const INCONSISTENT_MULTIPLIER: f64 = 0.5;
pub const NOT_STATED_MULTIPLIER: f64 = 0.7;

/// MEDIUM advisories at which a fact needs revision.
pub const NEEDS_REVISION_MEDIUM_COUNT: usize = 3;

/// Factor applied below the threshold for NEEDS_REVISION facts.
const REVISION_DEPRESSION: f64 = 0.8;

/// Verify stage: scale confidence by the source's answer.
pub fn adjust_confidence(confidence: f64, outcome: VerifyOutcome) -> f64 {
    let multiplier = match outcome {
        VerifyOutcome::Consistent => CONSISTENT_MULTIPLIER,
        VerifyOutcome::Inconsistent => INCONSISTENT_MULTIPLIER,
        VerifyOutcome::NotStated => NOT_STATED_MULTIPLIER,
    };
    (confidence * multiplier).clamp(0.0, 1.0)
}

/// Final stage: combine the Verify outcome with accumulated MEDIUM advisories.
pub fn decide(outcome: VerifyOutcome, medium_count: usize) -> CoVeDecision {
    if outcome == VerifyOutcome::Inconsistent {
        CoVeDecision::Reject
    } else if medium_count >= NEEDS_REVISION_MEDIUM_COUNT {
        CoVeDecision::NeedsRevision
    } else {
        CoVeDecision::Pass
    }
}

/// Confidence a fact carries after the decision.
///
/// NEEDS_REVISION lands strictly below `threshold` so consumers filtering on
/// it drop the fact.
pub fn final_confidence(decision: CoVeDecision, adjusted: f64, threshold: f64) -> f64 {
    match decision {
        CoVeDecision::NeedsRevision => adjusted.min(threshold) * REVISION_DEPRESSION,
        CoVeDecision::Pass | CoVeDecision::Reject => adjusted,
    }
}

/// Everything the Plan and Execute stages learned about one fact.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationEvidence {
    pub question: String,
    pub answer: String,
    pub outcome: VerifyOutcome,
    pub rounds: u32,
}

/// Decision for one fact, with the confidence it should carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub result: CoVeResult,
    pub confidence: f64,
}

impl Verdict {
    pub fn decision(&self) -> CoVeDecision {
        self.result.decision
    }

    /// Annotate the fact, or drop it on REJECT.
    pub fn apply(self, fact: Fact) -> Option<Fact> {
        match self.result.decision {
            CoVeDecision::Reject => None,
            _ => Some(fact.with_verification(self.result, self.confidence)),
        }
    }
}

/// Run the Verify and Final stages for a fact.
pub fn conclude(fact: &Fact, evidence: VerificationEvidence, config: &FactConfig) -> Verdict {
    let adjusted = adjust_confidence(fact.confidence_score(), evidence.outcome);
    let decision = decide(evidence.outcome, fact.medium_advisories());
    let confidence = final_confidence(
        decision,
        adjusted,
        config.verification_confidence_threshold,
    );

    Verdict {
        result: CoVeResult {
            fact_id: fact.fact_id(),
            verification_question: evidence.question,
            answer_from_source: evidence.answer,
            outcome: evidence.outcome,
            decision,
            adjusted_confidence: adjusted,
            rounds: evidence.rounds,
        },
        confidence,
    }
}
