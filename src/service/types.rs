use super::lifecycle::{notify, Lifecycle, LifecycleState};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::events::{LifecycleObserver, TracingObserver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// The lifecycle hook a failure or deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    Initialize,
    Start,
    Stop,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Initialize => write!(f, "initialize"),
            HookPhase::Start => write!(f, "start"),
            HookPhase::Stop => write!(f, "stop"),
        }
    }
}

/// Behaviour plugged into a [`Service`].
///
/// Implement this trait to create custom service types. Every hook has a no-op
/// default, so implementations override only what they need (opening
/// connections, binding listeners, releasing resources). The [`Service`]
/// wrapping the hooks owns the state machine; hooks never see it.
///
/// Any error returned from a hook is treated as an opaque failure: the owning
/// service enters `error` and the error is handed back to the caller.
#[async_trait]
pub trait ServiceHooks: Send + Sync + 'static {
    /// Prepare resources. Runs once per successful initialization.
    async fn on_initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Begin serving. Runs on every start, including restarts after a stop.
    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release what `on_start` acquired.
    async fn on_stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Report health details. Must not change service state.
    async fn on_health_check(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// Hooks that do nothing. Useful for placeholder services and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ServiceHooks for NoopHooks {}

/// Result of [`Service::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// Details returned by the hook, or `{"error": message}` when it failed.
    pub details: serde_json::Value,
}

impl HealthReport {
    pub fn healthy(details: serde_json::Value) -> Self {
        Self {
            healthy: true,
            details,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            details: serde_json::json!({ "error": message.into() }),
        }
    }

    /// The failure message recorded in the details, if any.
    pub fn error(&self) -> Option<&str> {
        self.details.get("error").and_then(|v| v.as_str())
    }
}

/// Deadlines applied around individual hook calls. `None` means no deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookTimeouts {
    pub initialize: Option<Duration>,
    pub start: Option<Duration>,
    pub stop: Option<Duration>,
    pub health: Option<Duration>,
}

impl HookTimeouts {
    pub fn for_phase(&self, phase: HookPhase) -> Option<Duration> {
        match phase {
            HookPhase::Initialize => self.initialize,
            HookPhase::Start => self.start,
            HookPhase::Stop => self.stop,
        }
    }
}

/// A named unit of work with its own lifecycle.
///
/// `Service` wraps a [`ServiceHooks`] implementation and exclusively owns the
/// [`Lifecycle`] tracking it. All methods take `&self` so a service can be
/// shared through `Arc` with callers of
/// [`Container::get`](crate::container::Container::get); only the container is
/// expected to drive `initialize`/`start`/`stop` on registered services.
///
/// Lifecycle operations on one service are serialized by an async mutex.
/// Accessors and [`health_check`](Self::health_check) never wait on it.
pub struct Service {
    config: ServiceConfig,
    hooks: Box<dyn ServiceHooks>,
    lifecycle: Mutex<Lifecycle>,
    initialized: AtomicBool,
    running: AtomicBool,
    timeouts: HookTimeouts,
    operation: tokio::sync::Mutex<()>,
}

impl Service {
    /// Create a service reporting to [`TracingObserver`] with no hook deadlines.
    pub fn new(config: ServiceConfig, hooks: impl ServiceHooks) -> Self {
        Self::from_boxed(config, Box::new(hooks))
    }

    pub(crate) fn from_boxed(config: ServiceConfig, hooks: Box<dyn ServiceHooks>) -> Self {
        let lifecycle = Lifecycle::new(config.name.clone(), Arc::new(TracingObserver));
        Self {
            config,
            hooks,
            lifecycle: Mutex::new(lifecycle),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            timeouts: HookTimeouts::default(),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    /// Report lifecycle events to `observer` instead of the default.
    ///
    /// Meant for construction time; the lifecycle is reset to `created`.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle = Mutex::new(Lifecycle::new(self.config.name.clone(), observer));
        self.initialized = AtomicBool::new(false);
        self.running = AtomicBool::new(false);
        self
    }

    pub fn with_timeouts(mut self, timeouts: HookTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn dependencies(&self) -> &[String] {
        &self.config.dependencies
    }

    pub fn auto_start(&self) -> bool {
        self.config.auto_start
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.lock().state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lifecycle.lock().last_error().map(str::to_string)
    }

    /// When the service last changed state.
    pub fn state_changed_at(&self) -> DateTime<Utc> {
        self.lifecycle.lock().changed_at()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Initialize the service.
    ///
    /// A no-op if the service is already initialized. Otherwise moves through
    /// `initializing` to `initialized` around [`ServiceHooks::on_initialize`].
    ///
    /// # Errors
    ///
    /// Returns the hook failure (or [`Error::Timeout`]) after moving the
    /// service to `error`.
    pub async fn initialize(&self) -> Result<()> {
        let _operation = self.operation.lock().await;
        self.initialize_locked()
            .instrument(tracing::info_span!("initialize", service.name = %self.name()))
            .await
    }

    async fn initialize_locked(&self) -> Result<()> {
        if self.is_initialized() {
            tracing::debug!("Service '{}' already initialized, skipping", self.name());
            return Ok(());
        }

        self.transition(LifecycleState::Initializing)?;
        self.run_hook(HookPhase::Initialize, self.hooks.on_initialize())
            .await?;
        self.initialized.store(true, Ordering::SeqCst);
        self.transition(LifecycleState::Initialized)?;

        tracing::info!("Service '{}' initialized", self.name());
        Ok(())
    }

    /// Start the service, initializing it first if needed.
    ///
    /// A no-op if the service is already running. A service sitting in
    /// `error` is re-initialized before starting, since `error` may only move
    /// back to `initializing`.
    pub async fn start(&self) -> Result<()> {
        let _operation = self.operation.lock().await;
        self.start_locked()
            .instrument(tracing::info_span!("start", service.name = %self.name()))
            .await
    }

    async fn start_locked(&self) -> Result<()> {
        if self.state() == LifecycleState::Error {
            tracing::info!(
                "Service '{}' is in error state, re-initializing before start",
                self.name()
            );
            self.initialized.store(false, Ordering::SeqCst);
        }

        if !self.is_initialized() {
            self.initialize_locked().await?;
        }

        if self.is_running() {
            tracing::debug!("Service '{}' already running, skipping", self.name());
            return Ok(());
        }

        self.transition(LifecycleState::Starting)?;
        self.run_hook(HookPhase::Start, self.hooks.on_start()).await?;
        self.running.store(true, Ordering::SeqCst);
        self.transition(LifecycleState::Running)?;

        tracing::info!("Service '{}' started", self.name());
        Ok(())
    }

    /// Stop the service. A no-op if it is not running.
    pub async fn stop(&self) -> Result<()> {
        let _operation = self.operation.lock().await;
        self.stop_locked()
            .instrument(tracing::info_span!("stop", service.name = %self.name()))
            .await
    }

    async fn stop_locked(&self) -> Result<()> {
        if !self.is_running() {
            tracing::debug!("Service '{}' not running, nothing to stop", self.name());
            return Ok(());
        }

        self.transition(LifecycleState::Stopping)?;
        self.run_hook(HookPhase::Stop, self.hooks.on_stop()).await?;
        self.running.store(false, Ordering::SeqCst);
        self.transition(LifecycleState::Stopped)?;

        tracing::info!("Service '{}' stopped", self.name());
        Ok(())
    }

    /// Ask the service for its health. Never fails: hook errors and elapsed
    /// deadlines are reported as `healthy: false`.
    pub async fn health_check(&self) -> HealthReport {
        let check = self.hooks.on_health_check();
        let outcome = match self.timeouts.health {
            Some(limit) => match tokio::time::timeout(limit, check).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(anyhow::anyhow!("health check timed out after {:?}", limit)),
            },
            None => check.await,
        };

        match outcome {
            Ok(details) => HealthReport::healthy(details),
            Err(e) => {
                tracing::debug!("Service '{}' health check failed: {:#}", self.name(), e);
                HealthReport::unhealthy(format!("{:#}", e))
            }
        }
    }

    /// Apply a transition; an illegal edge moves the service to `error` when it can.
    fn transition(&self, to: LifecycleState) -> Result<()> {
        if let Err(e) = self.record(to, None) {
            self.running.store(false, Ordering::SeqCst);
            if self.state().can_transition_to(LifecycleState::Error) {
                let _ = self.record(LifecycleState::Error, Some(e.to_string()));
            }
            return Err(e);
        }
        Ok(())
    }

    /// Apply a transition under the lifecycle lock, then notify with the lock released.
    fn record(&self, to: LifecycleState, error: Option<String>) -> Result<()> {
        let (events, observer) = {
            let mut lifecycle = self.lifecycle.lock();
            (lifecycle.apply(to, error)?, lifecycle.observer())
        };
        notify(observer.as_ref(), &events);
        Ok(())
    }

    /// Await a hook under its deadline, moving the service to `error` on
    /// failure. A panicking hook counts as a failed one.
    async fn run_hook<F>(&self, phase: HookPhase, hook: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let guarded = async {
            match AssertUnwindSafe(hook).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(anyhow::anyhow!(
                    "hook panicked: {}",
                    panic_message(panic.as_ref())
                )),
            }
        };

        let outcome = match self.timeouts.for_phase(phase) {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome.map_err(|source| self.hook_error(phase, source)),
                Err(_elapsed) => Err(Error::Timeout {
                    service: self.name().to_string(),
                    phase,
                    after: limit,
                }),
            },
            None => guarded.await.map_err(|source| self.hook_error(phase, source)),
        };

        outcome.map_err(|e| self.fail(e))
    }

    fn hook_error(&self, phase: HookPhase, source: anyhow::Error) -> Error {
        Error::Hook {
            service: self.name().to_string(),
            phase,
            source,
        }
    }

    fn fail(&self, error: Error) -> Error {
        let message = match &error {
            Error::Hook { source, .. } => format!("{:#}", source),
            other => other.to_string(),
        };
        tracing::warn!("Service '{}' failed: {}", self.name(), error);

        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.record(LifecycleState::Error, Some(message)) {
            tracing::debug!("Could not record failure for '{}': {}", self.name(), e);
        }
        error
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("initialized", &self.is_initialized())
            .field("running", &self.is_running())
            .field("timeouts", &self.timeouts)
            .field("hooks", &"<hooks>")
            .finish_non_exhaustive()
    }
}
