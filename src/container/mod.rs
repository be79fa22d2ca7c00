//! The service container.
//!
//! - `core` - registration, ordering and the initialize/start/stop loops
//! - `health` - concurrent health aggregation
//! - `builder` - fluent construction

mod builder;
mod core;
mod health;

pub use builder::ContainerBuilder;
pub use self::core::*;
pub use health::ServiceHealth;
