//! Circuit breaker to stop hammering a failing generator.
//!
//! [`ResilientGenerator`](crate::capability::ResilientGenerator) asks
//! [`CircuitBreaker::is_open`] before every attempt, retries included, and
//! records the outcome after it. An open circuit refuses the attempt with
//! `GenerationError::CircuitOpen`, which is never retried.
//!
//! State is kept per [`CallSite`]. Plan and Execute failures open only their
//! own circuits, so verification fails open while decomposition keeps
//! running. One breaker is shared by every call a `FactPipeline` makes.
//!
//! ```text
//! Closed --failure_threshold failures--> Open
//! Open --recovery_timeout elapsed--> HalfOpen
//! HalfOpen --success_threshold successes--> Closed
//! HalfOpen --any failure--> Open
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::capability::CallSite;
use crate::config::duration_str;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Time before a half-open probe, e.g. "30s"
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successful probes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of one call site's circuit.
#[derive(Debug, Clone)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

/// Per-call-site breaker. Call sites that never failed have no entry and
/// read as closed.
pub struct CircuitBreaker {
    states: RwLock<HashMap<CallSite, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True while calls for `site` should fail fast.
    ///
    /// Once `recovery_timeout` has passed this moves the site to half-open
    /// and returns false, letting the next attempt through as a probe.
    pub fn is_open(&self, site: CallSite) -> bool {
        let states = self.states.read();
        match states.get(&site) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(site);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// A completed generation for `site`. Clears the failure count, or
    /// counts toward closing a half-open circuit.
    pub fn record_success(&self, site: CallSite) {
        let mut states = self.states.write();
        match states.get(&site).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(site, CircuitState::Closed { failures: 0 });
                    tracing::info!(call_site = %site, "Circuit closed after successful probe");
                } else {
                    states.insert(
                        site,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(site, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// A failed attempt for `site`, timeouts included. A failure while
    /// half-open reopens the circuit at once.
    pub fn record_failure(&self, site: CallSite) {
        let mut states = self.states.write();
        let failures = match states.get(&site).cloned() {
            None => 1,
            Some(CircuitState::Closed { failures }) => failures + 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    site,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(call_site = %site, "Circuit reopened after failed probe");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                site,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(call_site = %site, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(site, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, site: CallSite) {
        let mut states = self.states.write();
        if matches!(states.get(&site), Some(CircuitState::Open { .. })) {
            states.insert(site, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(call_site = %site, "Circuit half-open, allowing a probe");
        }
    }

    pub fn state(&self, site: CallSite) -> CircuitState {
        self.states
            .read()
            .get(&site)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Close every circuit.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
