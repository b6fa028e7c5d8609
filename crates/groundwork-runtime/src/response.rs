//! Parsing structured generator output.
//!
//! Output is JSON, optionally inside a Markdown code fence. It is checked
//! against its [`ResponseSchema`] and only then deserialized; anything else
//! is a [`ResponseError`], never a best-effort guess.

use serde::Deserialize;
use thiserror::Error;

use groundwork_core::Candidate;

use crate::schema::ResponseSchema;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    #[error("Response is not JSON: {0}")]
    NotJson(String),

    #[error("Response violates schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),
}

/// Strip a surrounding ```json fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_checked<T: for<'de> Deserialize<'de>>(
    raw: &str,
    schema: ResponseSchema,
) -> Result<T, ResponseError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ResponseError::NotJson(e.to_string()))?;
    schema.validate(&value).map_err(ResponseError::SchemaViolation)?;
    serde_json::from_value(value).map_err(|e| ResponseError::SchemaViolation(vec![e.to_string()]))
}

#[derive(Deserialize)]
struct CandidateList {
    facts: Vec<Candidate>,
}

#[derive(Deserialize)]
struct PlannedQuestion {
    question: String,
}

/// Decomposition output.
pub fn parse_candidates(raw: &str) -> Result<Vec<Candidate>, ResponseError> {
    parse_checked::<CandidateList>(raw, ResponseSchema::Candidates).map(|list| list.facts)
}

/// Plan output.
pub fn parse_question(raw: &str) -> Result<String, ResponseError> {
    parse_checked::<PlannedQuestion>(raw, ResponseSchema::Plan)
        .map(|p| p.question.trim().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Yes,
    No,
    NotStated,
}

/// Execute output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceAnswer {
    pub answer: AnswerKind,
    #[serde(default)]
    pub quote: Option<String>,
}

impl SourceAnswer {
    /// Human-readable answer stored on the CoVe result.
    pub fn render(&self) -> String {
        let label = match self.answer {
            AnswerKind::Yes => "yes",
            AnswerKind::No => "no",
            AnswerKind::NotStated => "not_stated",
        };
        match self.quote.as_deref().filter(|q| !q.trim().is_empty()) {
            Some(quote) => format!("{}: \"{}\"", label, quote.trim()),
            None => label.to_string(),
        }
    }
}

pub fn parse_answer(raw: &str) -> Result<SourceAnswer, ResponseError> {
    parse_checked(raw, ResponseSchema::Answer)
}
