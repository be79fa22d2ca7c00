// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use crate::config::format_duration;
use crate::service::{HookPhase, LifecycleState};
use miette::Diagnostic;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Service '{service}' cannot transition from {from} to {to}")]
    #[diagnostic(
        code(lifecycle::state::invalid_transition),
        help("Check the service state with `Container::health_status()` before driving it")
    )]
    InvalidTransition {
        service: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Service '{0}' is already registered")]
    #[diagnostic(
        code(lifecycle::service::duplicate),
        help("Service names must be unique within a container")
    )]
    DuplicateService(String),

    #[error("Service not found: {0}")]
    #[diagnostic(
        code(lifecycle::service::not_found),
        help("Check registered services with `Container::service_names()`")
    )]
    ServiceNotFound(String),

    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    #[diagnostic(
        code(lifecycle::dependency::unknown),
        help("Register '{dependency}' before starting the container, or remove it from the dependencies of '{service}'")
    )]
    UnknownDependency { service: String, dependency: String },

    #[error("Circular dependency detected at '{service}': {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(lifecycle::dependency::circular),
        help("Services cannot depend on each other in a cycle. Review the dependencies fields")
    )]
    CircularDependency { service: String, cycle: Vec<String> },

    #[error("Service '{service}' failed to {phase}: {source}")]
    #[diagnostic(code(lifecycle::service::hook_failed))]
    Hook {
        service: String,
        phase: HookPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("Timeout after {after:?} waiting for service '{service}' to {phase}")]
    #[diagnostic(
        code(lifecycle::service::timeout),
        help("The service may be slow to {phase}. Increase the container timeout for this phase")
    )]
    Timeout {
        service: String,
        phase: HookPhase,
        after: Duration,
    },

    #[error("Operation cancelled for service '{0}'")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(lifecycle::config::validation))]
    Validation(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Name of the service this error is about, if it concerns a single service.
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Error::InvalidTransition { service, .. }
            | Error::UnknownDependency { service, .. }
            | Error::CircularDependency { service, .. }
            | Error::Hook { service, .. }
            | Error::Timeout { service, .. } => Some(service),
            Error::DuplicateService(name)
            | Error::ServiceNotFound(name)
            | Error::Cancelled(name) => Some(name),
            _ => None,
        }
    }

    /// True for failures raised while a service hook was running (including deadlines).
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, Error::Hook { .. } | Error::Timeout { .. })
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::InvalidTransition { service, from, .. } => Some(format!(
                "Service '{}' is currently {}. Drive services through the container instead of calling their lifecycle methods directly.",
                service, from
            )),
            Error::DuplicateService(name) => Some(format!(
                "A service named '{}' already exists. Use `Container::get(\"{}\")` to reach it.",
                name, name
            )),
            Error::UnknownDependency { dependency, .. } => Some(format!(
                "Register a service named '{}' or fix the spelling in the dependencies list.",
                dependency
            )),
            Error::CircularDependency { cycle, .. } => Some(format!(
                "Services cannot depend on each other in a cycle. Review the dependencies of: {}",
                cycle.join(", ")
            )),
            Error::Timeout {
                service,
                phase,
                after,
            } => Some(format!(
                "'{}' did not {} within {}. Raise the container timeout for this phase or make the hook return sooner.",
                service,
                phase,
                format_duration(*after)
            )),
            Error::Hook { service, .. } => Some(format!(
                "Inspect `Container::health_status()` and call `Container::stop()` to unwind, then fix '{}' and start again.",
                service
            )),
            Error::Cancelled(_) => Some(
                "Call `Container::reset_cancellation()` before running new operations.".to_string(),
            ),
            Error::Config(_) | Error::Validation(_) | Error::Yaml(_) => {
                Some("Validate your config with `Parser::parse_config`".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_service_and_states() {
        let err = Error::InvalidTransition {
            service: "db".to_string(),
            from: LifecycleState::Running,
            to: LifecycleState::Stopped,
        };
        let msg = err.to_string();
        assert!(msg.contains("db"));
        assert!(msg.contains("running"));
        assert!(msg.contains("stopped"));
        assert_eq!(err.service_name(), Some("db"));
    }

    #[test]
    fn circular_dependency_renders_path() {
        let err = Error::CircularDependency {
            service: "a".to_string(),
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Circular dependency detected at 'a': a -> b -> a"
        );
    }

    #[test]
    fn hook_failure_keeps_source() {
        let err = Error::Hook {
            service: "api".to_string(),
            phase: HookPhase::Start,
            source: anyhow::anyhow!("boom"),
        };
        assert!(err.is_hook_failure());
        assert_eq!(err.to_string(), "Service 'api' failed to start: boom");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
    }

    #[test]
    fn with_suggestion_appends_hint() {
        let err = Error::UnknownDependency {
            service: "api".to_string(),
            dependency: "db".to_string(),
        };
        let rendered = err.with_suggestion();
        assert!(rendered.starts_with("Service 'api' depends on unknown service 'db'"));
        assert!(rendered.contains("Hint: Register a service named 'db'"));
    }

    #[test]
    fn timeout_suggestion_uses_readable_duration() {
        let err = Error::Timeout {
            service: "db".to_string(),
            phase: HookPhase::Start,
            after: Duration::from_secs(120),
        };
        assert!(err.is_hook_failure());
        assert!(err.suggestion().unwrap().contains("did not start within 2m"));
    }

    #[test]
    fn io_error_has_no_suggestion() {
        let err = Error::Io(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(err.suggestion().is_none());
        assert_eq!(err.with_suggestion(), "IO error: disk");
    }
}
