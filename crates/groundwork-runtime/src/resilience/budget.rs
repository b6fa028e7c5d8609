//! Token budgets for generation calls.
//!
//! A global budget plus one per call site. A call is refused when its estimate
//! would overrun either; usage is recorded after the call returns.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::capability::CallSite;
use crate::providers::TokenUsage;

/// Budget limits. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub global_max_tokens: Option<u32>,
    pub per_call_site_max_tokens: Option<u32>,
}

pub struct TokenBudget {
    pub max_tokens: u32,
    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Generation usage accumulated across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub calls: u32,

    /// Calls per call site
    #[serde(default)]
    pub calls_by_site: HashMap<CallSite, u32>,
}

impl GenerationUsage {
    pub fn add(&mut self, site: CallSite, usage: &TokenUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.calls += 1;
        *self.calls_by_site.entry(site).or_insert(0) += 1;
    }
}

pub struct BudgetTracker {
    site_budgets: HashMap<CallSite, TokenBudget>,
    global_budget: Option<TokenBudget>,
    usage: RwLock<GenerationUsage>,
}

impl BudgetTracker {
    pub fn new(config: &BudgetConfig) -> Self {
        let site_budgets = match config.per_call_site_max_tokens {
            Some(max) => CallSite::ALL
                .iter()
                .map(|&site| (site, TokenBudget::new(max)))
                .collect(),
            None => HashMap::new(),
        };

        Self {
            site_budgets,
            global_budget: config.global_max_tokens.map(TokenBudget::new),
            usage: RwLock::new(GenerationUsage::default()),
        }
    }

    /// No limits; usage is still tracked.
    pub fn unlimited() -> Self {
        Self::new(&BudgetConfig::default())
    }

    pub fn can_afford(&self, site: CallSite, estimated_tokens: u32) -> bool {
        let site_ok = self
            .site_budgets
            .get(&site)
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);
        let global_ok = self
            .global_budget
            .as_ref()
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);

        site_ok && global_ok
    }

    pub fn record_usage(&self, site: CallSite, usage: &TokenUsage) {
        let total = usage.total();
        if let Some(budget) = self.site_budgets.get(&site) {
            budget.record(total);
        }
        if let Some(budget) = &self.global_budget {
            budget.record(total);
        }
        self.usage.write().add(site, usage);
    }

    pub fn get_usage(&self) -> GenerationUsage {
        self.usage.read().clone()
    }

    /// Remaining global tokens, `None` when unlimited.
    pub fn remaining_global(&self) -> Option<u32> {
        self.global_budget.as_ref().map(|b| b.remaining())
    }

    pub fn remaining_site(&self, site: CallSite) -> Option<u32> {
        self.site_budgets.get(&site).map(|b| b.remaining())
    }

    pub fn reset(&self) {
        for budget in self.site_budgets.values() {
            budget.reset();
        }
        if let Some(budget) = &self.global_budget {
            budget.reset();
        }
        *self.usage.write() = GenerationUsage::default();
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::unlimited()
    }
}
