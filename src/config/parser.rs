use super::ContainerConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Loads [`ContainerConfig`] from YAML.
#[derive(Debug, Default, Clone, Copy)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Load config from file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<ContainerConfig> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Parse and validate config from a YAML string.
    ///
    /// Service names are taken from the map keys; a `name` field that
    /// disagrees with its key is rejected.
    pub fn parse_config(&self, content: &str) -> Result<ContainerConfig> {
        let mut config: ContainerConfig = if content.trim().is_empty() {
            ContainerConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        for (key, service) in config.services.iter_mut() {
            if service.name.is_empty() {
                service.name = key.clone();
            } else if service.name != *key {
                return Err(Error::Validation(format!(
                    "Service '{}' declares a different name '{}'",
                    key, service.name
                )));
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_services_in_order() {
        let config = Parser::new()
            .parse_config(
                r#"
services:
  db: {}
  cache:
    version: "7.2"
  api:
    dependencies: [db, cache]
    auto_start: true
"#,
            )
            .unwrap();

        let names: Vec<_> = config.services.keys().cloned().collect();
        assert_eq!(names, vec!["db", "cache", "api"]);
        assert_eq!(config.services["db"].name, "db");
        assert_eq!(config.services["cache"].version, "7.2");
        assert_eq!(config.services["api"].dependencies, vec!["db", "cache"]);
        assert!(config.services["api"].auto_start);
        assert!(!config.parallel_startup);
    }

    #[test]
    fn parses_timeouts() {
        let config = Parser::new()
            .parse_config("timeouts:\n  startup: 45s\n  health: 200ms\nparallel_startup: true\n")
            .unwrap();
        assert_eq!(config.timeouts.get_startup_timeout(), Duration::from_secs(45));
        assert_eq!(config.timeouts.get_health_timeout(), Duration::from_millis(200));
        assert!(config.parallel_startup);
    }

    #[test]
    fn empty_document_is_default() {
        let config = Parser::new().parse_config("  \n").unwrap();
        assert_eq!(config, ContainerConfig::default());
    }

    #[test]
    fn rejects_mismatched_name() {
        let err = Parser::new()
            .parse_config("services:\n  db:\n    name: postgres\n")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn reports_yaml_errors() {
        let err = Parser::new()
            .parse_config("services: [not, a, map]")
            .unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Parser::new()
            .load_config("/definitely/not/here/services.yaml")
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
