#![allow(unused_assignments)]

//! # Service Lifecycle
//!
//! Dependency-aware lifecycle orchestration for in-process services.
//!
//! ## Features
//!
//! - **Lifecycle State Machine**: every service moves through a fixed set of
//!   states; illegal transitions are rejected with the service and both states named
//! - **Dependency Ordering**: services start after everything they depend on and
//!   stop in exactly the reverse order; cycles and unknown dependencies are reported
//! - **Fail-Fast Startup, Best-Effort Shutdown**: the first failing hook aborts
//!   `start`, while `stop` attempts every running service and reports what failed
//! - **Health Aggregation**: concurrent health checks that never fail the caller
//! - **Configurable Timeouts**: per-hook deadlines for startup, stop and health checks
//! - **Cancellation Support**: abort in-progress startup via `CancellationToken`
//! - **Lifecycle Events**: state changes delivered to an injected observer
//!
//! ## Quick Start
//!
//! ```
//! use async_trait::async_trait;
//! use service_lifecycle::{Container, ServiceConfig, ServiceHooks};
//!
//! struct Database;
//!
//! #[async_trait]
//! impl ServiceHooks for Database {
//!     async fn on_start(&self) -> anyhow::Result<()> {
//!         // open the pool
//!         Ok(())
//!     }
//! }
//!
//! struct Api;
//!
//! #[async_trait]
//! impl ServiceHooks for Api {}
//!
//! # async fn example() -> service_lifecycle::Result<()> {
//! let mut container = Container::new();
//! container.register("db", ServiceConfig::default(), |_| Database)?;
//! container.register("api", ServiceConfig::default().depends_on(["db"]), |_| Api)?;
//!
//! // Starts db, then api
//! container.start().await?;
//!
//! for (name, health) in container.health_status().await {
//!     println!("{}: {} (healthy: {})", name, health.state, health.healthy);
//! }
//!
//! // Stops api, then db
//! let report = container.stop().await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - Registration takes `&mut self`; everything else takes `&self`
//! - Container operations are serialized; health checks run concurrently
//! - Each service serializes its own lifecycle operations
//! - The crate logs through `tracing` and never installs a subscriber

pub mod config;
pub mod container;
pub mod dependency;
pub mod error;
pub mod events;
pub mod service;

// Re-export commonly used types
pub use config::{ContainerConfig, Parser, ServiceConfig};
pub use container::{Container, ContainerBuilder, ServiceHealth, StopReport};
pub use error::{Error, Result};
pub use events::{LifecycleEvent, LifecycleObserver};
pub use service::{HealthReport, LifecycleState, NoopHooks, Service, ServiceHooks};
