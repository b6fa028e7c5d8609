//! Adapter from a chat-completion provider to [`TextGenerator`].

use async_trait::async_trait;
use std::sync::Arc;

use super::{Generation, GenerationContext, GenerationError, TextGenerator};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};

pub struct LlmGenerator {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate_text(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
    ) -> Result<Generation, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &ctx.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        let mut config = self.config.clone();
        if let Some(max_tokens) = ctx.max_tokens {
            config.max_tokens = max_tokens;
        }

        let response = self.provider.complete(messages, &config).await?;

        tracing::debug!(
            call_site = %ctx.call_site,
            provider = self.provider.name(),
            model = %response.model,
            tokens = response.usage.total(),
            "Generation complete"
        );

        Ok(Generation {
            text: response.content,
            usage: response.usage,
            model: response.model,
        })
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
