//! Timeout, retry, circuit breaker and budget around any [`TextGenerator`].
//!
//! Each attempt checks the circuit and the budget for its call site, then runs
//! under the call site's deadline. Retryable failures back off exponentially
//! up to `retry.max_retries` extra attempts; the last error surfaces.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;

use super::{Generation, GenerationContext, GenerationError, TextGenerator};
use crate::config::{RetryConfig, TimeoutConfig};
use crate::resilience::{BudgetTracker, CircuitBreaker, GenerationUsage};

pub struct ResilientGenerator {
    inner: Arc<dyn TextGenerator>,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
    circuit_breaker: Arc<CircuitBreaker>,
    budget: Arc<BudgetTracker>,
}

impl ResilientGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, timeouts: TimeoutConfig, retry: RetryConfig) -> Self {
        Self {
            inner,
            timeouts,
            retry,
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            budget: Arc::new(BudgetTracker::unlimited()),
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_budget(mut self, budget: Arc<BudgetTracker>) -> Self {
        self.budget = budget;
        self
    }

    pub fn usage(&self) -> GenerationUsage {
        self.budget.get_usage()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    async fn attempt(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
    ) -> Result<Generation, GenerationError> {
        let site = ctx.call_site;

        if self.circuit_breaker.is_open(site) {
            return Err(GenerationError::CircuitOpen(site));
        }

        // ~4 chars per token, plus the completion allowance
        let estimate = (prompt.len() / 4) as u32 + ctx.max_tokens.unwrap_or(0);
        if !self.budget.can_afford(site, estimate) {
            return Err(GenerationError::BudgetExceeded(site));
        }

        let deadline = self.timeouts.for_site(site);
        let call = self.inner.generate_text(prompt, ctx);
        let result = match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                site,
                after: deadline,
            }),
        };

        match &result {
            Ok(generation) => {
                self.circuit_breaker.record_success(site);
                self.budget.record_usage(site, &generation.usage);
            }
            Err(_) => self.circuit_breaker.record_failure(site),
        }

        result
    }
}

#[async_trait]
impl TextGenerator for ResilientGenerator {
    async fn generate_text(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
    ) -> Result<Generation, GenerationError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay)
            .with_max_delay(self.retry.max_delay)
            .with_max_times(self.retry.max_retries);

        let site = ctx.call_site;
        let this = self;

        (move || async move { this.attempt(prompt, ctx).await })
            .retry(backoff)
            .when(|e: &GenerationError| e.is_retryable())
            .notify(|e: &GenerationError, delay| {
                tracing::warn!(
                    call_site = %site,
                    error = %e,
                    delay = ?delay,
                    "Retrying generation call"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
