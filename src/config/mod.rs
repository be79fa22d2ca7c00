//! Configuration types and YAML loading.
//!
//! - `service` - per-service configuration (`ServiceConfig`)
//! - `types` - container configuration (`ContainerConfig`, `TimeoutConfig`)
//! - `duration` - human-readable duration parsing
//! - `parser` - YAML config parsing
//! - `validation` - config validation

mod duration;
mod parser;
mod service;
mod types;
mod validation;

pub use duration::*;
pub use parser::*;
pub use service::*;
pub use types::*;
