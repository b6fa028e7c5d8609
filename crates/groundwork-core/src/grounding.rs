//! Source grounding: locate the transcript span that best supports a claim.
//!
//! Candidates are compared against every run of 1..=`max_window_sentences`
//! consecutive transcript sentences. The best scoring run becomes the
//! fact's [`SourceSpan`] when its score meets `grounding_threshold`
//! (inclusive). No qualifying run means the claim is discarded.

use std::collections::HashSet;

use crate::config::FactConfig;
use crate::text::{content_tokens, sentences, token_similarity, Sentence};
use crate::types::{SourceSpan, SpanError};

/// Weight of the match score in the initial confidence.
const SCORE_WEIGHT: f64 = 0.6;

/// The best span found for a claim.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingMatch {
    pub span: SourceSpan,
    pub score: f64,
}

/// Pre-segmented transcript, reusable across every candidate of a run.
pub struct Grounder<'a> {
    transcript: &'a str,
    sentences: Vec<Sentence>,
    windows: Vec<Window>,
}

struct Window {
    start: usize,
    end: usize,
    tokens: HashSet<String>,
}

impl<'a> Grounder<'a> {
    /// Segment the transcript and precompute window token sets.
    pub fn new(transcript: &'a str, max_window_sentences: usize) -> Self {
        let sentences = sentences(transcript);
        let chars: Vec<char> = transcript.chars().collect();
        let width = max_window_sentences.max(1);

        let mut windows = Vec::new();
        for first in 0..sentences.len() {
            for last in first..sentences.len().min(first + width) {
                let start = sentences[first].start;
                let end = sentences[last].end;
                let text: String = chars[start..end].iter().collect();
                windows.push(Window {
                    start,
                    end,
                    tokens: content_tokens(&text).into_iter().collect(),
                });
            }
        }

        Self {
            transcript,
            sentences,
            windows,
        }
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Best scoring window regardless of threshold.
    pub fn best(&self, claim: &str) -> Option<GroundingMatch> {
        let claim_tokens: HashSet<String> = content_tokens(claim).into_iter().collect();
        if claim_tokens.is_empty() {
            return None;
        }

        let mut best: Option<(&Window, f64)> = None;
        for window in &self.windows {
            let score = token_similarity(&claim_tokens, &window.tokens);
            // Windows are ordered by start then length, so strict `>` keeps
            // the earliest, shortest window on ties.
            let better = match best {
                None => score > 0.0,
                Some((_, current_score)) => score > current_score,
            };
            if better {
                best = Some((window, score));
            }
        }

        let (window, score) = best?;
        let span = SourceSpan::from_transcript(self.transcript, window.start, window.end).ok()?;
        Some(GroundingMatch { span, score })
    }

    /// Best window whose score meets the threshold (inclusive).
    pub fn ground(&self, claim: &str, threshold: f64) -> Option<GroundingMatch> {
        self.best(claim).filter(|m| m.score >= threshold)
    }
}

/// Ground a single claim against a transcript.
pub fn ground(claim: &str, transcript: &str, config: &FactConfig) -> Option<GroundingMatch> {
    Grounder::new(transcript, config.max_window_sentences).ground(claim, config.grounding_threshold)
}

/// Recompute the similarity between a fact and its recorded span text.
pub fn span_score(claim: &str, span: &SourceSpan) -> f64 {
    crate::text::similarity(claim, &span.text)
}

/// Re-slice a span from the transcript, failing on drift.
pub fn reslice(span: &SourceSpan, transcript: &str) -> Result<SourceSpan, SpanError> {
    span.verify(transcript)?;
    SourceSpan::from_transcript(transcript, span.start_char, span.end_char)
}

/// Initial fact confidence from the match score and the generator's certainty.
///
/// Falls back to `prior` when the generator reported no certainty.
pub fn initial_confidence(score: f64, certainty: Option<f64>, prior: f64) -> f64 {
    let certainty = certainty
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(prior);
    (SCORE_WEIGHT * score + (1.0 - SCORE_WEIGHT) * certainty).clamp(0.0, 1.0)
}
