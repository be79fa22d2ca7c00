//! Shared test helpers: hooks that record every call into a journal.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use service_lifecycle::ServiceHooks;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Ordered log of hook calls shared by every recording service of a test.
///
/// Entries look like `start:api` (hook entered) and `started:api` (hook
/// returned successfully).
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Services whose `phase` hook was entered, in call order.
    pub fn calls(&self, phase: &str) -> Vec<String> {
        let prefix = format!("{}:", phase);
        self.entries
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Make the `phase` hook of `service` fail with `message`.
    pub fn fail_on(&self, phase: &str, service: &str, message: &str) {
        self.failures
            .lock()
            .insert(format!("{}:{}", phase, service), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    fn failure(&self, phase: &str, service: &str) -> Option<String> {
        self.failures
            .lock()
            .get(&format!("{}:{}", phase, service))
            .cloned()
    }
}

/// Hooks that record their calls and fail on demand.
pub struct Recording {
    name: String,
    journal: Journal,
    start_delay: Option<Duration>,
    stop_delay: Option<Duration>,
}

impl Recording {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            start_delay: None,
            stop_delay: None,
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    async fn run(&self, phase: &str, done: &str) -> anyhow::Result<()> {
        self.journal.record(format!("{}:{}", phase, self.name));
        if let Some(message) = self.journal.failure(phase, &self.name) {
            anyhow::bail!(message);
        }
        self.journal.record(format!("{}:{}", done, self.name));
        Ok(())
    }
}

#[async_trait]
impl ServiceHooks for Recording {
    async fn on_initialize(&self) -> anyhow::Result<()> {
        self.run("initialize", "initialized").await
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.run("start", "started").await
    }

    async fn on_stop(&self) -> anyhow::Result<()> {
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        self.run("stop", "stopped").await
    }

    async fn on_health_check(&self) -> anyhow::Result<serde_json::Value> {
        if let Some(message) = self.journal.failure("health", &self.name) {
            anyhow::bail!(message);
        }
        Ok(serde_json::json!({ "service": self.name }))
    }
}
