//! The text-generation capability.
//!
//! Extraction and verification depend on [`TextGenerator`] only. Concrete
//! backends are adapted into it ([`LlmGenerator`]) and wrapped with timeouts,
//! retries, a circuit breaker and budgets ([`ResilientGenerator`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::prompts;
use crate::providers::{ProviderError, TokenUsage};

mod llm;
mod resilient;

pub use llm::LlmGenerator;
pub use resilient::ResilientGenerator;

/// Where in the pipeline a generation call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSite {
    /// Stage 1: summary decomposition
    Decompose,
    /// CoVe Plan: verification question
    Plan,
    /// CoVe Execute: answer from the transcript
    Execute,
}

impl CallSite {
    pub const ALL: [CallSite; 3] = [CallSite::Decompose, CallSite::Plan, CallSite::Execute];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallSite::Decompose => "decompose",
            CallSite::Plan => "plan",
            CallSite::Execute => "execute",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call settings passed alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub call_site: CallSite,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
}

impl GenerationContext {
    pub fn new(call_site: CallSite) -> Self {
        Self {
            call_site,
            system: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Text produced by one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

impl Generation {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            model: model.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("{site} call timed out after {after:?}")]
    Timeout { site: CallSite, after: Duration },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Circuit open for {0}")]
    CircuitOpen(CallSite),

    #[error("Token budget exhausted for {0}")]
    BudgetExceeded(CallSite),

    #[error("Generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    /// Whether another attempt at the same call site might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout { .. } | GenerationError::Failed(_) => true,
            GenerationError::Provider(e) => e.is_transient(),
            GenerationError::CircuitOpen(_) | GenerationError::BudgetExceeded(_) => false,
        }
    }
}

/// `generate_text(prompt, context) -> text`, treated as a black box.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
    ) -> Result<Generation, GenerationError>;

    /// Answer `question` from `source` alone, excluding outside knowledge.
    async fn answer_from_context(
        &self,
        question: &str,
        source: &str,
    ) -> Result<Generation, GenerationError> {
        let ctx = GenerationContext::new(CallSite::Execute)
            .with_system(prompts::EXECUTE_SYSTEM_PROMPT);
        self.generate_text(&prompts::execute_prompt(question, source), &ctx)
            .await
    }

    /// Model or backend identifier, used in cache keys and logs.
    fn name(&self) -> &str;
}
