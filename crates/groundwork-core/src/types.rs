//! Core types for fact grounding.
//!
//! A [`Fact`] is an atomic claim extracted from a conversation summary and
//! pinned to the exact transcript characters that support it. Facts are
//! values: once built, their text, span and identity are never editable.
//! Annotations (validator advisories, verification results) produce a new
//! value, and corrections produce a new fact with a bumped version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::text::char_slice;

/// Errors raised when building or checking a [`SourceSpan`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpanError {
    #[error("Empty or inverted span [{start}:{end})")]
    EmptyRange { start: usize, end: usize },

    #[error("Span [{start}:{end}) out of bounds for transcript of {length} chars")]
    OutOfBounds {
        start: usize,
        end: usize,
        length: usize,
    },

    #[error("Span text drifted from transcript at [{start}:{end}): expected '{expected}', found '{actual}'")]
    TextMismatch {
        start: usize,
        end: usize,
        expected: String,
        actual: String,
    },
}

/// The exact transcript substring evidencing a fact.
///
/// Offsets count chars (Unicode scalar values), half-open `[start_char, end_char)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

impl SourceSpan {
    /// Slice a span out of the transcript.
    pub fn from_transcript(transcript: &str, start: usize, end: usize) -> Result<Self, SpanError> {
        if end <= start {
            return Err(SpanError::EmptyRange { start, end });
        }

        let text = char_slice(transcript, start, end).ok_or_else(|| SpanError::OutOfBounds {
            start,
            end,
            length: transcript.chars().count(),
        })?;

        Ok(Self {
            start_char: start,
            end_char: end,
            text: text.to_string(),
        })
    }

    /// Number of chars covered by the span.
    pub fn len(&self) -> usize {
        self.end_char.saturating_sub(self.start_char)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the structural invariant that needs no transcript.
    pub fn check_shape(&self) -> Result<(), SpanError> {
        if self.end_char <= self.start_char {
            return Err(SpanError::EmptyRange {
                start: self.start_char,
                end: self.end_char,
            });
        }
        let actual_len = self.text.chars().count();
        if actual_len != self.len() {
            return Err(SpanError::TextMismatch {
                start: self.start_char,
                end: self.end_char,
                expected: self.text.clone(),
                actual: format!("<{} chars>", actual_len),
            });
        }
        Ok(())
    }

    /// Re-check both span invariants against the transcript.
    pub fn verify(&self, transcript: &str) -> Result<(), SpanError> {
        if self.end_char <= self.start_char {
            return Err(SpanError::EmptyRange {
                start: self.start_char,
                end: self.end_char,
            });
        }

        let actual = char_slice(transcript, self.start_char, self.end_char).ok_or_else(|| {
            SpanError::OutOfBounds {
                start: self.start_char,
                end: self.end_char,
                length: transcript.chars().count(),
            }
        })?;

        if actual != self.text {
            return Err(SpanError::TextMismatch {
                start: self.start_char,
                end: self.end_char,
                expected: self.text.clone(),
                actual: actual.to_string(),
            });
        }

        Ok(())
    }

    /// True when the two spans share at least one char.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start_char < end && start < self.end_char
    }
}

/// Unique fact identifier (UUID v7, so ids sort by creation time).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct FactId(Uuid);

impl FactId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a fact came into existence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Decomposed from the summary by the text-generation capability.
    LlmDecomposition,

    /// Appended as a correction of an earlier fact.
    ManualCorrection,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::LlmDecomposition => "llm_decomposition",
            ExtractionMethod::ManualCorrection => "manual_correction",
        }
    }
}

/// Severity of a validator violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// A single finding from one validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub validator_name: String,
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    pub fn new(validator_name: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            validator_name: validator_name.to_string(),
            severity,
            message: message.into(),
        }
    }

    pub fn high(validator_name: &str, message: impl Into<String>) -> Self {
        Self::new(validator_name, Severity::High, message)
    }

    pub fn medium(validator_name: &str, message: impl Into<String>) -> Self {
        Self::new(validator_name, Severity::Medium, message)
    }
}

/// Outcome of running every validator over one fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub fact_id: FactId,
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    /// Build a result; valid only with zero HIGH violations.
    pub fn from_violations(fact_id: FactId, violations: Vec<Violation>) -> Self {
        let is_valid = !violations.iter().any(|v| v.severity == Severity::High);
        Self {
            fact_id,
            is_valid,
            violations,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    /// Violations that do not block storage (MEDIUM and LOW).
    pub fn advisories(&self) -> Vec<Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity != Severity::High)
            .cloned()
            .collect()
    }

    /// First HIGH violation, if any.
    pub fn blocking(&self) -> Option<&Violation> {
        self.violations.iter().find(|v| v.severity == Severity::High)
    }
}

/// Final decision of the chain-of-verification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoVeDecision {
    Pass,
    NeedsRevision,
    Reject,
}

/// How the source answered a verification question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    Consistent,
    Inconsistent,
    NotStated,
}

/// Chain-of-verification result attached to a fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoVeResult {
    pub fact_id: FactId,
    pub verification_question: String,
    pub answer_from_source: String,
    pub outcome: VerifyOutcome,
    pub decision: CoVeDecision,
    pub adjusted_confidence: f64,
    pub rounds: u32,
}

/// Verification state visible to consumers of stored facts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Verification disabled or failed open.
    Unverified,
    Passed,
    NeedsRevision,
    Rejected,
}

/// An atomic, source-grounded claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    fact_id: FactId,
    transcription_id: String,
    fact_text: String,
    confidence_score: f64,
    extraction_method: ExtractionMethod,
    source_span: SourceSpan,
    fact_version: u32,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    advisories: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification: Option<CoVeResult>,
}

impl Fact {
    /// Create a new fact with a fresh id and the current timestamp.
    pub fn new(
        transcription_id: impl Into<String>,
        fact_text: impl Into<String>,
        source_span: SourceSpan,
        confidence_score: f64,
        extraction_method: ExtractionMethod,
        fact_version: u32,
    ) -> Self {
        Self {
            fact_id: FactId::new(),
            transcription_id: transcription_id.into(),
            fact_text: fact_text.into(),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            extraction_method,
            source_span,
            fact_version,
            timestamp: Utc::now(),
            advisories: Vec::new(),
            verification: None,
        }
    }

    pub fn fact_id(&self) -> FactId {
        self.fact_id
    }

    pub fn transcription_id(&self) -> &str {
        &self.transcription_id
    }

    pub fn fact_text(&self) -> &str {
        &self.fact_text
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn extraction_method(&self) -> ExtractionMethod {
        self.extraction_method
    }

    pub fn source_span(&self) -> &SourceSpan {
        &self.source_span
    }

    pub fn fact_version(&self) -> u32 {
        self.fact_version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn advisories(&self) -> &[Violation] {
        &self.advisories
    }

    pub fn verification(&self) -> Option<&CoVeResult> {
        self.verification.as_ref()
    }

    /// Number of MEDIUM advisories carried from validation.
    pub fn medium_advisories(&self) -> usize {
        self.advisories
            .iter()
            .filter(|v| v.severity == Severity::Medium)
            .count()
    }

    pub fn verification_status(&self) -> VerificationStatus {
        match self.verification.as_ref().map(|v| v.decision) {
            None => VerificationStatus::Unverified,
            Some(CoVeDecision::Pass) => VerificationStatus::Passed,
            Some(CoVeDecision::NeedsRevision) => VerificationStatus::NeedsRevision,
            Some(CoVeDecision::Reject) => VerificationStatus::Rejected,
        }
    }

    /// Attach the non-blocking validator findings.
    pub fn with_advisories(mut self, advisories: Vec<Violation>) -> Self {
        self.advisories = advisories;
        self
    }

    /// Attach a verification result and take its recalibrated confidence.
    ///
    /// Text, span and id are carried over untouched.
    pub fn with_verification(mut self, result: CoVeResult, confidence: f64) -> Self {
        self.confidence_score = confidence.clamp(0.0, 1.0);
        self.verification = Some(result);
        self
    }

    /// Build the correction of this fact: new id, same transcription, next version.
    pub fn corrected(
        &self,
        fact_text: impl Into<String>,
        source_span: SourceSpan,
        confidence_score: f64,
    ) -> Self {
        Self::new(
            self.transcription_id.clone(),
            fact_text,
            source_span,
            confidence_score,
            ExtractionMethod::ManualCorrection,
            self.fact_version + 1,
        )
    }
}

/// The finalized inputs of one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    pub transcription_id: String,
    pub transcript: String,
    pub summary: String,
}

impl SourceDocument {
    pub fn new(
        transcription_id: impl Into<String>,
        transcript: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            transcription_id: transcription_id.into(),
            transcript: transcript.into(),
            summary: summary.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "I have a headache. I took ibuprofen for it.";

    #[test]
    fn test_span_from_transcript() {
        let span = SourceSpan::from_transcript(TRANSCRIPT, 0, 18).unwrap();
        assert_eq!(span.text, "I have a headache.");
        assert!(span.verify(TRANSCRIPT).is_ok());
    }

    #[test]
    fn test_span_rejects_empty_range() {
        let result = SourceSpan::from_transcript(TRANSCRIPT, 5, 5);
        assert!(matches!(result, Err(SpanError::EmptyRange { .. })));
    }

    #[test]
    fn test_span_rejects_out_of_bounds() {
        let result = SourceSpan::from_transcript(TRANSCRIPT, 0, 500);
        assert!(matches!(result, Err(SpanError::OutOfBounds { .. })));
    }

    #[test]
    fn test_span_counts_chars_not_bytes() {
        let transcript = "Café visit. I felt fine.";
        let span = SourceSpan::from_transcript(transcript, 0, 11).unwrap();
        assert_eq!(span.text, "Café visit.");
        assert!(span.check_shape().is_ok());
    }

    #[test]
    fn test_span_detects_drift() {
        let mut span = SourceSpan::from_transcript(TRANSCRIPT, 0, 18).unwrap();
        span.text = "I have a migraine.".to_string();
        assert!(matches!(
            span.verify(TRANSCRIPT),
            Err(SpanError::TextMismatch { .. })
        ));
    }

    #[test]
    fn test_validation_result_validity() {
        let id = FactId::new();
        let medium_only = ValidationResult::from_violations(
            id,
            vec![Violation::medium("specificity", "vague referent")],
        );
        assert!(medium_only.is_valid);
        assert_eq!(medium_only.advisories().len(), 1);

        let high = ValidationResult::from_violations(
            id,
            vec![Violation::high("atomicity", "compound claim")],
        );
        assert!(!high.is_valid);
        assert!(high.blocking().is_some());
    }

    #[test]
    fn test_correction_is_new_fact() {
        let span = SourceSpan::from_transcript(TRANSCRIPT, 0, 18).unwrap();
        let original = Fact::new(
            "t-1",
            "User has a headache.",
            span.clone(),
            0.9,
            ExtractionMethod::LlmDecomposition,
            1,
        );
        let correction = original.corrected("User has a mild headache.", span, 0.8);

        assert_ne!(original.fact_id(), correction.fact_id());
        assert_eq!(correction.transcription_id(), "t-1");
        assert_eq!(correction.fact_version(), 2);
        assert_eq!(correction.extraction_method(), ExtractionMethod::ManualCorrection);
        assert_eq!(original.fact_text(), "User has a headache.");
    }

    fn headache_fact(confidence: f64) -> Fact {
        let span = SourceSpan::from_transcript(TRANSCRIPT, 0, 18).unwrap();
        Fact::new(
            "t",
            "User has a headache.",
            span,
            confidence,
            ExtractionMethod::LlmDecomposition,
            1,
        )
    }

    #[test]
    fn test_confidence_is_clamped() {
        let fact = headache_fact(1.7);
        assert_eq!(fact.confidence_score(), 1.0);
    }

    #[test]
    fn test_status_defaults_to_unverified() {
        let fact = headache_fact(0.9);
        assert_eq!(fact.verification_status(), VerificationStatus::Unverified);
    }

    #[test]
    fn test_fact_serde_shape() {
        let fact = headache_fact(0.9);
        let json = serde_json::to_value(&fact).unwrap();

        assert_eq!(json["extraction_method"], "llm_decomposition");
        assert_eq!(json["source_span"]["start_char"], 0);
        assert!(json.get("verification").is_none());

        let back: Fact = serde_json::from_value(json).unwrap();
        assert_eq!(back, fact);
    }
}
