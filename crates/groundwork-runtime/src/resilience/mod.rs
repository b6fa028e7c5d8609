//! Resilience patterns around the text-generation capability.
//!
//! - Circuit breaker per call site
//! - Token budgets
//!
//! Retry with backoff lives in [`crate::capability::ResilientGenerator`].

mod budget;
mod circuit_breaker;

pub use budget::{BudgetConfig, BudgetTracker, GenerationUsage, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
