//! Lifecycle notifications.
//!
//! Every [`Lifecycle`](crate::service::Lifecycle) reports its state changes and
//! failures to a [`LifecycleObserver`] handed to it at construction time. The
//! observer is the only notification path: there is no global listener
//! registry, so tests can run with [`NoopObserver`] or a capturing
//! [`ChannelObserver`] without touching shared state.
//!
//! - [`TracingObserver`]: default, turns events into `tracing` records
//! - [`ChannelObserver`]: forwards events into a bounded `tokio::sync::mpsc` channel
//! - [`NoopObserver`]: discards everything

use crate::service::LifecycleState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// A notification emitted by a service lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The service moved from `from` to `to`.
    StateChanged {
        service: String,
        from: LifecycleState,
        to: LifecycleState,
        at: DateTime<Utc>,
    },
    /// The service entered `error` carrying `error`.
    Failed { service: String, error: String },
}

impl LifecycleEvent {
    pub fn service(&self) -> &str {
        match self {
            LifecycleEvent::StateChanged { service, .. } | LifecycleEvent::Failed { service, .. } => {
                service
            }
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::StateChanged { service, from, to, .. } => {
                write!(f, "{}: {} -> {}", service, from, to)
            }
            LifecycleEvent::Failed { service, error } => write!(f, "{}: failed: {}", service, error),
        }
    }
}

/// Receiver of lifecycle notifications.
///
/// Called synchronously on the task driving the service, after the state
/// change is visible through the service's accessors. Implementations must
/// not block.
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Logs lifecycle events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::StateChanged { service, from, to, .. } => {
                tracing::debug!(service.name = %service, from = %from, to = %to, "state changed");
            }
            LifecycleEvent::Failed { service, error } => {
                tracing::error!(service.name = %service, error = %error, "service entered error state");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {
    fn on_event(&self, _event: &LifecycleEvent) {}
}

/// Forwards events into a bounded channel read by an external consumer
/// (telemetry exporter, status endpoint, test assertions).
///
/// Sending never waits: when the channel is full or closed the event is
/// dropped and a warning is logged.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving half of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: mpsc::Sender<LifecycleEvent>) -> Self {
        Self { tx }
    }
}

impl LifecycleObserver for ChannelObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            match e {
                mpsc::error::TrySendError::Full(dropped) => {
                    tracing::warn!("Lifecycle event channel full, dropping event: {}", dropped);
                }
                mpsc::error::TrySendError::Closed(dropped) => {
                    tracing::debug!("Lifecycle event channel closed, dropping event: {}", dropped);
                }
            }
        }
    }
}
