use super::ContainerConfig;
use crate::error::{Error, Result};

impl ContainerConfig {
    /// Validate the configuration.
    ///
    /// Checks that no service depends on itself, that dependencies are not
    /// listed twice, and that every dependency names a service declared in
    /// the same config. Cycles are left to the container, which reports the
    /// full path when it resolves the start order.
    pub fn validate(&self) -> Result<()> {
        for (name, service) in &self.services {
            if name.trim().is_empty() {
                return Err(Error::Validation(
                    "Service names must not be empty".to_string(),
                ));
            }

            let mut seen = std::collections::HashSet::new();
            for dep in &service.dependencies {
                if dep == name {
                    return Err(Error::Validation(format!(
                        "Service '{}' cannot depend on itself",
                        name
                    )));
                }
                if !seen.insert(dep.as_str()) {
                    return Err(Error::Validation(format!(
                        "Service '{}' lists dependency '{}' more than once",
                        name, dep
                    )));
                }
                if !self.services.contains_key(dep) {
                    return Err(Error::Validation(format!(
                        "Service '{}' depends on '{}', which is not declared",
                        name, dep
                    )));
                }
            }
        }

        for (field, value) in [
            ("startup", &self.timeouts.startup),
            ("stop", &self.timeouts.stop),
            ("health", &self.timeouts.health),
        ] {
            if let Some(raw) = value {
                if super::parse_duration_string(raw).is_none() {
                    return Err(Error::Validation(format!(
                        "Invalid {} timeout '{}': use a value like \"500ms\", \"30s\" or \"2m\"",
                        field, raw
                    )));
                }
            }
        }

        Ok(())
    }
}
