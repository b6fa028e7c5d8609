//! Testing utilities.
//!
//! [`ScriptedGenerator`] stands in for a real text generator: responses are
//! chosen by call site and a substring of the prompt, failures can be
//! injected, and every call is recorded for assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::capability::{CallSite, Generation, GenerationContext, GenerationError, TextGenerator};
use crate::providers::TokenUsage;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

#[derive(Debug, Clone)]
struct Rule {
    site: CallSite,
    needle: String,
    reply: Reply,
}

/// A call the generator received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub site: CallSite,
    pub prompt: String,
}

#[derive(Default)]
pub struct ScriptedGenerator {
    rules: Vec<Rule>,
    failures: Mutex<HashMap<CallSite, u32>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` to `site` calls whose prompt contains `needle`.
    /// The first matching rule wins; an empty needle matches every prompt.
    pub fn on(
        mut self,
        site: CallSite,
        needle: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            site,
            needle: needle.into(),
            reply: Reply::Text(response.into()),
        });
        self
    }

    /// Always fail `site` calls whose prompt contains `needle`.
    pub fn fail_on(mut self, site: CallSite, needle: impl Into<String>) -> Self {
        self.rules.push(Rule {
            site,
            needle: needle.into(),
            reply: Reply::Fail,
        });
        self
    }

    /// Fail the next `times` calls to `site`, whatever the prompt.
    pub fn fail_times(self, site: CallSite, times: u32) -> Self {
        self.failures.lock().insert(site, times);
        self
    }

    /// Sleep before answering (tokio time, so paused-clock tests stay fast).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, site: CallSite) -> usize {
        self.calls.lock().iter().filter(|c| c.site == site).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn default_reply(site: CallSite) -> &'static str {
        match site {
            CallSite::Decompose => r#"{"facts": []}"#,
            CallSite::Plan => r#"{"question": "Is this stated in the transcript?"}"#,
            CallSite::Execute => r#"{"answer": "not_stated"}"#,
        }
    }

    fn take_failure(&self, site: CallSite) -> bool {
        let mut failures = self.failures.lock();
        match failures.get_mut(&site) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
    ) -> Result<Generation, GenerationError> {
        let site = ctx.call_site;
        self.calls.lock().push(RecordedCall {
            site,
            prompt: prompt.to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.take_failure(site) {
            return Err(GenerationError::Failed(format!("scripted {} failure", site)));
        }

        let rule = self
            .rules
            .iter()
            .find(|r| r.site == site && prompt.contains(r.needle.as_str()));

        let text = match rule.map(|r| &r.reply) {
            Some(Reply::Fail) => {
                return Err(GenerationError::Failed(format!("scripted {} failure", site)))
            }
            Some(Reply::Text(text)) => text.clone(),
            None => Self::default_reply(site).to_string(),
        };

        let mut generation = Generation::new(text, "scripted");
        generation.usage = TokenUsage {
            prompt_tokens: (prompt.len() / 4) as u32,
            completion_tokens: (generation.text.len() / 4) as u32,
        };
        Ok(generation)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
