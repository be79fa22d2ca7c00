use super::{parse_duration_string, ServiceConfig};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for initialize and start hooks (2 minutes)
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for stop hooks (30 seconds)
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for health check hooks (5 seconds)
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Container configuration.
///
/// ```yaml
/// timeouts:
///   startup: "30s"
///   stop: "10s"
///   health: "500ms"
/// parallel_startup: false
/// services:
///   db: {}
///   api:
///     dependencies: [db]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Per-service configuration, in declaration order.
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Start independent services of the same dependency level concurrently.
    #[serde(default, alias = "parallelStartup")]
    pub parallel_startup: bool,
}

impl ContainerConfig {
    /// Configuration for `name`, with its name filled in.
    pub fn service(&self, name: &str) -> Option<ServiceConfig> {
        self.services.get(name).map(|config| ServiceConfig {
            name: name.to_string(),
            ..config.clone()
        })
    }
}

/// Hook deadlines as human-readable durations (e.g. "500ms", "30s", "2m").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl TimeoutConfig {
    /// Get the configured startup timeout, or the default (2 minutes).
    ///
    /// Returns the default timeout if no timeout is configured or if parsing fails.
    pub fn get_startup_timeout(&self) -> Duration {
        Self::parse_or(self.startup.as_deref(), DEFAULT_STARTUP_TIMEOUT)
    }

    /// Get the configured stop timeout, or the default (30 seconds).
    pub fn get_stop_timeout(&self) -> Duration {
        Self::parse_or(self.stop.as_deref(), DEFAULT_STOP_TIMEOUT)
    }

    /// Get the configured health check timeout, or the default (5 seconds).
    pub fn get_health_timeout(&self) -> Duration {
        Self::parse_or(self.health.as_deref(), DEFAULT_HEALTH_CHECK_TIMEOUT)
    }

    fn parse_or(value: Option<&str>, default: Duration) -> Duration {
        value.and_then(parse_duration_string).unwrap_or(default)
    }
}
