use super::Container;
use crate::config::{ContainerConfig, Parser};
use crate::error::Result;
use crate::events::LifecycleObserver;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing a [`Container`] with a fluent API.
///
/// Timeouts set here override the ones from the configuration.
///
/// # Example
///
/// ```
/// use service_lifecycle::Container;
/// use service_lifecycle::events::NoopObserver;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let container = Container::builder()
///     .observer(Arc::new(NoopObserver))
///     .startup_timeout(Duration::from_secs(10))
///     .parallel_startup(true)
///     .build();
/// assert!(container.parallel_startup());
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    config: Option<ContainerConfig>,
    observer: Option<Arc<dyn LifecycleObserver>>,
    startup_timeout: Option<Duration>,
    stop_timeout: Option<Duration>,
    health_timeout: Option<Duration>,
    no_timeouts: bool,
    parallel_startup: Option<bool>,
}

impl ContainerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    ///
    /// If not set, [`ContainerConfig::default`] is used.
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load and validate the configuration from a YAML file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = Some(Parser::new().load_config(path)?);
        Ok(self)
    }

    /// Receive lifecycle events of every service registered on the container.
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Deadline for each `on_initialize` and `on_start` call.
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Deadline for each `on_stop` call.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    /// Deadline for each `on_health_check` call.
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = Some(timeout);
        self
    }

    /// Run hooks without any deadline.
    pub fn no_timeouts(mut self) -> Self {
        self.no_timeouts = true;
        self
    }

    /// Start independent services of the same dependency level concurrently.
    pub fn parallel_startup(mut self, parallel: bool) -> Self {
        self.parallel_startup = Some(parallel);
        self
    }

    /// Build the container. No service is registered yet.
    pub fn build(self) -> Container {
        let mut container = Container::with_config(self.config.unwrap_or_default());

        if let Some(observer) = self.observer {
            container.set_observer(observer);
        }

        let mut timeouts = container.timeouts();
        if self.no_timeouts {
            timeouts = Default::default();
        }
        if let Some(timeout) = self.startup_timeout {
            timeouts.initialize = Some(timeout);
            timeouts.start = Some(timeout);
        }
        if let Some(timeout) = self.stop_timeout {
            timeouts.stop = Some(timeout);
        }
        if let Some(timeout) = self.health_timeout {
            timeouts.health = Some(timeout);
        }
        container.set_timeouts(timeouts);

        if let Some(parallel) = self.parallel_startup {
            container.set_parallel_startup(parallel);
        }

        container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceConfig, DEFAULT_HEALTH_CHECK_TIMEOUT, DEFAULT_STOP_TIMEOUT};
    use crate::events::ChannelObserver;
    use crate::service::{HookTimeouts, NoopHooks};
    use std::io::Write;

    #[test]
    fn defaults_match_config_defaults() {
        let container = ContainerBuilder::new().build();
        let timeouts = container.timeouts();
        assert_eq!(timeouts.stop, Some(DEFAULT_STOP_TIMEOUT));
        assert_eq!(timeouts.health, Some(DEFAULT_HEALTH_CHECK_TIMEOUT));
        assert!(!container.parallel_startup());
        assert!(container.is_empty());
    }

    #[test]
    fn explicit_timeouts_override_config() {
        let mut config = ContainerConfig::default();
        config.timeouts.stop = Some("1m".to_string());

        let container = Container::builder()
            .config(config)
            .startup_timeout(Duration::from_secs(3))
            .health_timeout(Duration::from_millis(50))
            .build();

        let timeouts = container.timeouts();
        assert_eq!(timeouts.initialize, Some(Duration::from_secs(3)));
        assert_eq!(timeouts.start, Some(Duration::from_secs(3)));
        assert_eq!(timeouts.stop, Some(Duration::from_secs(60)));
        assert_eq!(timeouts.health, Some(Duration::from_millis(50)));
    }

    #[test]
    fn no_timeouts_clears_deadlines() {
        let container = Container::builder()
            .no_timeouts()
            .stop_timeout(Duration::from_secs(1))
            .build();
        assert_eq!(
            container.timeouts(),
            HookTimeouts {
                stop: Some(Duration::from_secs(1)),
                ..Default::default()
            }
        );
    }

    #[test]
    fn parallel_startup_overrides_config() {
        let config = ContainerConfig {
            parallel_startup: true,
            ..Default::default()
        };
        let container = Container::builder()
            .config(config)
            .parallel_startup(false)
            .build();
        assert!(!container.parallel_startup());
    }

    #[tokio::test]
    async fn observer_is_handed_to_registered_services() {
        let (observer, mut rx) = ChannelObserver::new(16);
        let mut container = Container::builder().observer(Arc::new(observer)).build();
        container
            .register("db", ServiceConfig::default(), |_| NoopHooks)
            .unwrap();

        container.start().await.unwrap();

        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.service(), "db");
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn config_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "parallel_startup: true\nservices:\n  db: {{}}\n  api:\n    dependencies: [db]"
        )
        .unwrap();

        let mut container = Container::builder()
            .config_file(file.path())
            .unwrap()
            .build();
        assert!(container.parallel_startup());
        assert_eq!(container.config().services.len(), 2);

        container.register_configured("db", |_| NoopHooks).unwrap();
        let api = container.register_configured("api", |_| NoopHooks).unwrap();
        assert_eq!(api.dependencies(), ["db".to_string()]);
    }
}
