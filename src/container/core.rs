use crate::config::{ContainerConfig, ServiceConfig};
use crate::dependency::Graph;
use crate::error::{Error, Result};
use crate::events::{LifecycleObserver, TracingObserver};
use crate::service::{HookTimeouts, LifecycleState, Service, ServiceHooks};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Outcome of [`Container::stop`].
///
/// Stopping is best effort, so failures are collected here instead of being
/// returned as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Services stopped cleanly, in stop order.
    pub stopped: Vec<String>,
    /// Services that were not running and were left alone.
    pub skipped: Vec<String>,
    /// Services whose stop hook failed (or timed out).
    pub failed: Vec<StopFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopFailure {
    pub service: String,
    pub error: String,
}

impl StopReport {
    /// True if no stop attempt failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of services that drives their lifecycles in dependency order.
///
/// The container owns every registered [`Service`] and is the only thing that
/// should call `initialize`/`start`/`stop` on them. Callers of
/// [`get`](Self::get) share the service through `Arc` and may read its state
/// at any time.
///
/// # Concurrency Model
///
/// - Registration takes `&mut self`, so the set of services is closed once the
///   container is shared
/// - `initialize`, `start`, `stop` and `restart` take `&self` and are
///   serialized by an internal async mutex
/// - `health_status` never waits on that mutex
/// - A `CancellationToken` lets another task abort an in-progress
///   `initialize`/`start` between services
///
/// # Example
///
/// ```
/// use service_lifecycle::{Container, NoopHooks, ServiceConfig};
///
/// # async fn example() -> service_lifecycle::Result<()> {
/// let mut container = Container::new();
/// container.register("db", ServiceConfig::default(), |_| NoopHooks)?;
/// container.register("api", ServiceConfig::default().depends_on(["db"]), |_| NoopHooks)?;
///
/// container.start().await?;
/// assert_eq!(container.resolve_order()?, vec!["db", "api"]);
///
/// let report = container.stop().await;
/// assert_eq!(report.stopped, vec!["api", "db"]);
/// # Ok(())
/// # }
/// ```
pub struct Container {
    pub(super) services: IndexMap<String, Arc<Service>>,
    initialized: AtomicBool,
    config: ContainerConfig,
    observer: Arc<dyn LifecycleObserver>,
    timeouts: HookTimeouts,
    parallel_startup: bool,
    cancellation_token: CancellationToken,
    operation: tokio::sync::Mutex<()>,
}

impl Container {
    /// Create an empty container with default timeouts and the tracing observer.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Create an empty container using the timeouts and startup mode from `config`.
    ///
    /// Services listed in `config.services` are not registered; use
    /// [`register_configured`](Self::register_configured) for each of them.
    pub fn with_config(config: ContainerConfig) -> Self {
        let timeouts = HookTimeouts {
            initialize: Some(config.timeouts.get_startup_timeout()),
            start: Some(config.timeouts.get_startup_timeout()),
            stop: Some(config.timeouts.get_stop_timeout()),
            health: Some(config.timeouts.get_health_timeout()),
        };
        let parallel_startup = config.parallel_startup;

        Self {
            services: IndexMap::new(),
            initialized: AtomicBool::new(false),
            config,
            observer: Arc::new(TracingObserver),
            timeouts,
            parallel_startup,
            cancellation_token: CancellationToken::new(),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a builder for fluent construction.
    pub fn builder() -> super::ContainerBuilder {
        super::ContainerBuilder::new()
    }

    pub(super) fn set_observer(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observer = observer;
    }

    pub(super) fn set_timeouts(&mut self, timeouts: HookTimeouts) {
        self.timeouts = timeouts;
    }

    pub(super) fn set_parallel_startup(&mut self, parallel: bool) {
        self.parallel_startup = parallel;
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Deadlines applied to hooks of services registered from now on.
    pub fn timeouts(&self) -> HookTimeouts {
        self.timeouts
    }

    pub fn parallel_startup(&self) -> bool {
        self.parallel_startup
    }

    /// Register a service under `name`.
    ///
    /// `factory` receives the service configuration (with `name` filled in)
    /// and returns the hooks implementation. The dependencies recorded for
    /// ordering are `config.dependencies`; they are checked when the order is
    /// resolved, not here.
    ///
    /// Registering marks the container as not initialized, so the next
    /// [`initialize`](Self::initialize) or [`start`](Self::start) picks the
    /// new service up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateService`] if `name` is already registered.
    pub fn register<F, H>(
        &mut self,
        name: impl Into<String>,
        config: ServiceConfig,
        factory: F,
    ) -> Result<Arc<Service>>
    where
        F: FnOnce(&ServiceConfig) -> H,
        H: ServiceHooks,
    {
        let name = name.into();
        if self.services.contains_key(&name) {
            return Err(Error::DuplicateService(name));
        }

        let config = ServiceConfig {
            name: name.clone(),
            ..config
        };
        let hooks = factory(&config);
        let service = Arc::new(
            Service::from_boxed(config, Box::new(hooks))
                .with_observer(Arc::clone(&self.observer))
                .with_timeouts(self.timeouts),
        );

        tracing::debug!(
            "Registered service '{}' (dependencies: {:?})",
            name,
            service.dependencies()
        );
        self.services.insert(name, Arc::clone(&service));
        self.initialized.store(false, Ordering::SeqCst);
        Ok(service)
    }

    /// Register a service whose configuration comes from this container's
    /// [`ContainerConfig::services`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `name` is not configured, or
    /// [`Error::DuplicateService`] if it is already registered.
    pub fn register_configured<F, H>(&mut self, name: &str, factory: F) -> Result<Arc<Service>>
    where
        F: FnOnce(&ServiceConfig) -> H,
        H: ServiceHooks,
    {
        let config = self.config.service(name).ok_or_else(|| {
            Error::Config(format!(
                "Service '{}' is not declared in the container configuration",
                name
            ))
        })?;
        self.register(name, config, factory)
    }

    /// Get a registered service.
    pub fn get(&self, name: &str) -> Result<Arc<Service>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// True once `initialize` succeeded for every registered service.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Dependency graph of the current registrations.
    pub fn dependency_graph(&self) -> Graph {
        Graph::from_dependencies(
            self.services
                .iter()
                .map(|(name, service)| (name.as_str(), service.dependencies())),
        )
    }

    /// Resolve the start order: every service appears after all of its
    /// transitive dependencies. Ties follow registration order.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDependency`] if a dependency is not registered
    /// - [`Error::CircularDependency`] if the dependencies form a cycle
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        self.dependency_graph().topological_sort()
    }

    /// Every service that transitively depends on `name`, in stop order.
    pub fn dependents(&self, name: &str) -> Result<Vec<String>> {
        if !self.has(name) {
            return Err(Error::ServiceNotFound(name.to_string()));
        }
        self.dependency_graph().get_all_dependents(name)
    }

    /// Cancel in-progress `initialize`/`start` operations.
    ///
    /// Cancellation is checked before each service, so the service being
    /// driven when this is called finishes its hook. Calls to `stop` are not
    /// affected.
    pub fn cancel_operations(&self) {
        self.cancellation_token.cancel();
    }

    /// Check if operations have been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Reset the cancellation token for new operations.
    pub fn reset_cancellation(&mut self) {
        self.cancellation_token = CancellationToken::new();
    }

    /// Initialize every service in dependency order.
    ///
    /// A no-op if the container is already initialized. Fail-fast: the first
    /// failure is returned and no later service is initialized. Services
    /// already initialized stay that way.
    pub async fn initialize(&self) -> Result<()> {
        let _operation = self.operation.lock().await;
        self.initialize_locked()
            .instrument(tracing::info_span!("container_initialize"))
            .await
    }

    async fn initialize_locked(&self) -> Result<()> {
        if self.is_initialized() {
            tracing::debug!("Container already initialized, skipping");
            return Ok(());
        }

        let order = self.resolve_order()?;
        tracing::info!("Initializing {} services", order.len());

        for name in &order {
            self.check_cancelled(name)?;
            let service = self.get(name)?;
            service.initialize().await?;
        }

        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Start every service in dependency order, initializing first if needed.
    ///
    /// Fail-fast like [`initialize`](Self::initialize): services started
    /// before the failure keep running, the failing service is left in
    /// `error` and later services are not touched. Call
    /// [`stop`](Self::stop) to unwind.
    ///
    /// With parallel startup enabled, services of the same dependency level
    /// start concurrently; a level only begins once the previous one has
    /// fully started.
    pub async fn start(&self) -> Result<()> {
        let _operation = self.operation.lock().await;
        self.start_locked()
            .instrument(tracing::info_span!("container_start"))
            .await
    }

    async fn start_locked(&self) -> Result<()> {
        self.initialize_locked().await?;

        if self.parallel_startup {
            return self.start_parallel().await;
        }

        let order = self.resolve_order()?;
        for name in &order {
            self.check_cancelled(name)?;
            let service = self.get(name)?;
            service.start().await?;
        }

        tracing::info!("Started {} services", order.len());
        Ok(())
    }

    async fn start_parallel(&self) -> Result<()> {
        let groups = self.dependency_graph().get_parallel_groups()?;

        for group in &groups {
            if let Some(first) = group.first() {
                self.check_cancelled(first)?;
            }

            let services = group
                .iter()
                .map(|name| self.get(name))
                .collect::<Result<Vec<_>>>()?;
            let futures: Vec<_> = services.iter().map(|service| service.start()).collect();
            let results = futures::future::join_all(futures).await;

            let mut errors = results.into_iter().filter_map(|r| r.err());
            if let Some(first) = errors.next() {
                for other in errors {
                    tracing::warn!("Additional startup failure in the same group: {}", other);
                }
                return Err(first);
            }
        }

        tracing::info!("Started {} services in {} groups", self.len(), groups.len());
        Ok(())
    }

    /// Stop every running service in reverse dependency order.
    ///
    /// Best effort: a failing stop hook is logged and recorded in the report,
    /// and every other running service still gets its stop attempt. Services
    /// that are not `running` are skipped. Never fails.
    pub async fn stop(&self) -> StopReport {
        let _operation = self.operation.lock().await;
        self.stop_locked()
            .instrument(tracing::info_span!("container_stop"))
            .await
    }

    async fn stop_locked(&self) -> StopReport {
        let order = match self.resolve_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(
                    "Could not resolve dependency order ({}), stopping in reverse registration order",
                    e
                );
                self.service_names()
            }
        };

        let mut report = StopReport::default();
        for name in order.iter().rev() {
            let Some(service) = self.services.get(name) else {
                continue;
            };

            if service.state() != LifecycleState::Running {
                report.skipped.push(name.clone());
                continue;
            }

            match service.stop().await {
                Ok(()) => report.stopped.push(name.clone()),
                Err(e) => {
                    tracing::error!("Failed to stop service '{}': {}", name, e);
                    report.failed.push(StopFailure {
                        service: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Stopped {} services ({} skipped, {} failed)",
            report.stopped.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Stop every running service, then start everything again.
    ///
    /// The stop phase always completes; the start phase can be cancelled, in
    /// which case [`Error::Cancelled`] names the first service left stopped.
    pub async fn restart(&self) -> Result<StopReport> {
        let _operation = self.operation.lock().await;
        async {
            let report = self.stop_locked().await;
            self.start_locked().await?;
            Result::<StopReport>::Ok(report)
        }
        .instrument(tracing::info_span!("container_restart"))
        .await
    }

    fn check_cancelled(&self, name: &str) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            tracing::info!("Operation cancelled before '{}'", name);
            return Err(Error::Cancelled(name.to_string()));
        }
        Ok(())
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("initialized", &self.is_initialized())
            .field("timeouts", &self.timeouts)
            .field("parallel_startup", &self.parallel_startup)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
