//! Services and their lifecycle state machine.
//!
//! - [`LifecycleState`] / [`Lifecycle`]: the per-service finite-state machine
//! - [`ServiceHooks`]: the capability trait concrete services implement
//! - [`Service`]: wraps hooks, owns the lifecycle, enforces idempotency
//!
//! # Example
//!
//! ```
//! use service_lifecycle::config::ServiceConfig;
//! use service_lifecycle::service::{LifecycleState, NoopHooks, Service};
//!
//! # async fn example() -> service_lifecycle::Result<()> {
//! let service = Service::new(ServiceConfig::new("cache"), NoopHooks);
//! service.start().await?;
//! assert_eq!(service.state(), LifecycleState::Running);
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod types;

pub use lifecycle::*;
pub use types::*;

pub(crate) use types::panic_message;
