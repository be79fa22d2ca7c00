//! Health aggregation across registered services.
//!
//! `HealthAggregator` is a short-lived helper constructed from a `Container`
//! reference; [`Container::health_status`] delegates here.

use super::core::Container;
use crate::service::{panic_message, HealthReport, LifecycleState, Service};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Health of one service as reported by [`Container::health_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub state: LifecycleState,
    pub healthy: bool,
    /// Hook details, or `{"error": message}` when the check failed.
    pub details: serde_json::Value,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub since: DateTime<Utc>,
}

impl ServiceHealth {
    fn new(service: &Service, report: HealthReport) -> Self {
        Self {
            state: service.state(),
            healthy: report.healthy,
            details: report.details,
            version: service.version().to_string(),
            last_error: service.last_error(),
            since: service.state_changed_at(),
        }
    }
}

pub(super) struct HealthAggregator<'a> {
    container: &'a Container,
}

impl<'a> HealthAggregator<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    /// Run every health check concurrently and collect the results in
    /// registration order.
    pub async fn collect(&self) -> IndexMap<String, ServiceHealth> {
        let checks = self
            .container
            .services
            .iter()
            .map(|(name, service)| Self::check(name, Arc::clone(service)));
        let results = futures::future::join_all(checks).await;

        self.container
            .services
            .keys()
            .cloned()
            .zip(results)
            .collect()
    }

    async fn check(name: &str, service: Arc<Service>) -> ServiceHealth {
        let report = match AssertUnwindSafe(service.health_check())
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Health check for '{}' panicked: {}", name, message);
                HealthReport::unhealthy(message)
            }
        };
        ServiceHealth::new(&service, report)
    }
}

impl Container {
    /// Health of every registered service, keyed by name in registration order.
    ///
    /// Checks run concurrently. Never fails: a check that errors, times out
    /// or panics is reported as `healthy: false` with the error message in
    /// `details.error`.
    pub async fn health_status(&self) -> IndexMap<String, ServiceHealth> {
        HealthAggregator::new(self).collect().await
    }

    /// True if every registered service is running and reports healthy.
    pub async fn is_healthy(&self) -> bool {
        self.health_status()
            .await
            .values()
            .all(|health| health.state == LifecycleState::Running && health.healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::service::{NoopHooks, ServiceHooks};
    use async_trait::async_trait;

    struct Panicking;

    #[async_trait]
    impl ServiceHooks for Panicking {
        async fn on_health_check(&self) -> anyhow::Result<serde_json::Value> {
            panic!("probe exploded");
        }
    }

    struct Failing;

    #[async_trait]
    impl ServiceHooks for Failing {
        async fn on_health_check(&self) -> anyhow::Result<serde_json::Value> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn one_entry_per_service() {
        let mut container = Container::new();
        container
            .register("db", ServiceConfig::default(), |_| NoopHooks)
            .unwrap();
        container
            .register("cache", ServiceConfig::default(), |_| Failing)
            .unwrap();
        container
            .register("probe", ServiceConfig::default(), |_| Panicking)
            .unwrap();
        container.get("db").unwrap().start().await.unwrap();

        let status = container.health_status().await;
        assert_eq!(
            status.keys().collect::<Vec<_>>(),
            vec!["db", "cache", "probe"]
        );

        assert_eq!(status["db"].state, LifecycleState::Running);
        assert!(status["db"].healthy);

        assert_eq!(status["cache"].state, LifecycleState::Created);
        assert!(!status["cache"].healthy);
        assert_eq!(status["cache"].details["error"], "connection refused");

        assert!(!status["probe"].healthy);
        assert_eq!(status["probe"].details["error"], "probe exploded");
        assert!(!container.is_healthy().await);
    }

    #[tokio::test]
    async fn serializes_for_status_endpoints() {
        let mut container = Container::new();
        container
            .register("db", ServiceConfig::default().version("1.0.0"), |_| NoopHooks)
            .unwrap();

        let status = container.health_status().await;
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["db"]["state"], "created");
        assert_eq!(json["db"]["healthy"], true);
        assert_eq!(json["db"]["version"], "1.0.0");
        assert!(json["db"].get("last_error").is_none());
    }

    #[tokio::test]
    async fn empty_container_is_healthy() {
        let container = Container::new();
        assert!(container.health_status().await.is_empty());
        assert!(container.is_healthy().await);
    }
}
