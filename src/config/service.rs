//! Service configuration types.

use serde::{Deserialize, Serialize};

/// Default version advertised by a service that does not declare one.
pub const DEFAULT_SERVICE_VERSION: &str = "0.0.1";

fn default_version() -> String {
    DEFAULT_SERVICE_VERSION.to_string()
}

/// Configuration for a single service.
///
/// ```yaml
/// api:
///   version: "2.1.0"
///   dependencies: [db, cache]
///   auto_start: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unique name within a container. Filled from the map key when loaded from YAML.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// Names of services that must be started before this one.
    #[serde(default, alias = "depends_on", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Preserved for callers; the container itself starts every registered service.
    #[serde(default, alias = "autoStart")]
    pub auto_start: bool,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: default_version(),
            dependencies: Vec::new(),
            auto_start: false,
        }
    }
}
