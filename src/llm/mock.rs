//! Mock LLM provider
//!
//! Scriptable, network-free provider used by tests and by the CLI's
//! `--offline` mode. Responses are selected by matching a substring of the
//! system prompt; unmatched calls fall back to a deterministic echo of the
//! first sentences of the last user message.

use super::traits::{ChatMessage, LlmProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the mock answers for a matching prompt.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Empty,
    Fail(String),
}

/// A recorded call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub user: String,
}

#[derive(Default)]
pub struct MockLlmProvider {
    rules: Vec<(String, MockReply)>,
    delay: Option<Duration>,
    calls: Mutex<Vec<MockCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `reply` whenever the system prompt contains `needle`.
    /// Rules are checked in insertion order.
    pub fn with_rule(mut self, needle: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    /// Delay every call (simulates network latency).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn echo(user: &str) -> Option<String> {
        let sentences: Vec<String> = user
            .split(['.', '\n', '?', '!'])
            .map(str::trim)
            .filter(|s| s.len() > 3)
            .take(3)
            .map(|s| format!("- {}", s))
            .collect();
        if sentences.is_empty() {
            None
        } else {
            Some(sentences.join("\n"))
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        _max_tokens: u32,
    ) -> Result<Option<String>> {
        let user = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                system: system.to_string(),
                user: user.clone(),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| system.contains(needle.as_str()));
        match rule {
            Some((_, MockReply::Text(text))) => Ok(Some(text.clone())),
            Some((_, MockReply::Empty)) => Ok(None),
            Some((_, MockReply::Fail(msg))) => Err(anyhow::anyhow!(msg.clone())),
            None => Ok(Self::echo(&user)),
        }
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}
