use crate::error::{Error, Result};
use crate::events::{LifecycleEvent, LifecycleObserver};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Current lifecycle state of a service.
///
/// # State Transitions
///
/// ```text
/// Created ──► Initializing ──► Initialized ──► Starting ──► Running ──► Stopping ──► Stopped
///                  ▲                               ▲                                   │
///                  │                               └───────────────────────────────────┘
///                  │
///                Error ──► Stopped          (every state except Error may enter Error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, no hook has run yet
    Created,
    /// `on_initialize` is running
    Initializing,
    /// Initialized and ready to start
    Initialized,
    /// `on_start` is running
    Starting,
    /// Started successfully
    Running,
    /// `on_stop` is running
    Stopping,
    /// Stopped cleanly; may be started again
    Stopped,
    /// A hook failed; may be re-initialized or marked stopped
    Error,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Error => "error",
        };
        f.write_str(name)
    }
}

impl LifecycleState {
    /// Every state this one may move to. The table is exhaustive: no other edge is legal,
    /// and self-transitions are never allowed.
    pub fn allowed_transitions(&self) -> &'static [LifecycleState] {
        match self {
            Self::Created => &[Self::Initializing, Self::Error],
            Self::Initializing => &[Self::Initialized, Self::Error],
            Self::Initialized => &[Self::Starting, Self::Error],
            Self::Starting => &[Self::Running, Self::Error],
            Self::Running => &[Self::Stopping, Self::Error],
            Self::Stopping => &[Self::Stopped, Self::Error],
            // Restart after a clean stop
            Self::Stopped => &[Self::Starting, Self::Error],
            // Recovery without rebuilding the service
            Self::Error => &[Self::Initializing, Self::Stopped],
        }
    }

    /// Check if a state transition is valid according to the state machine.
    ///
    /// # Examples
    ///
    /// ```
    /// use service_lifecycle::service::LifecycleState;
    ///
    /// assert!(LifecycleState::Running.can_transition_to(LifecycleState::Stopping));
    /// assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Stopped)); // Must go through Stopping
    /// assert!(LifecycleState::Error.can_transition_to(LifecycleState::Initializing));
    /// ```
    pub fn can_transition_to(&self, to: LifecycleState) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// State machine bound to one service.
///
/// Owned exclusively by its [`Service`](super::Service); holders of a service
/// reference can read the state but only the service drives transitions.
pub struct Lifecycle {
    service_name: String,
    state: LifecycleState,
    last_error: Option<String>,
    changed_at: DateTime<Utc>,
    observer: Arc<dyn LifecycleObserver>,
}

impl Lifecycle {
    pub fn new(service_name: impl Into<String>, observer: Arc<dyn LifecycleObserver>) -> Self {
        Self {
            service_name: service_name.into(),
            state: LifecycleState::Created,
            last_error: None,
            changed_at: Utc::now(),
            observer,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Message of the error that put the service into `error`, if it is there.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the last transition happened (construction time if none yet).
    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Move to `new_state` and notify the observer.
    ///
    /// `error` is recorded only when entering [`LifecycleState::Error`]; any
    /// other target clears the recorded error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the edge is not in the
    /// transition table. The state is left untouched in that case.
    pub fn transition_to(&mut self, new_state: LifecycleState, error: Option<String>) -> Result<()> {
        let events = self.apply(new_state, error)?;
        notify(self.observer.as_ref(), &events);
        Ok(())
    }

    /// Move to `new_state` without notifying, returning the events to deliver.
    ///
    /// Lets a caller holding the lifecycle behind a lock release it before
    /// the observer runs.
    pub(crate) fn apply(
        &mut self,
        new_state: LifecycleState,
        error: Option<String>,
    ) -> Result<Vec<LifecycleEvent>> {
        let old_state = self.state;
        if !old_state.can_transition_to(new_state) {
            return Err(Error::InvalidTransition {
                service: self.service_name.clone(),
                from: old_state,
                to: new_state,
            });
        }

        self.state = new_state;
        self.changed_at = Utc::now();
        let failure = if new_state == LifecycleState::Error {
            self.last_error = error.clone();
            error
        } else {
            self.last_error = None;
            None
        };

        let mut events = vec![LifecycleEvent::StateChanged {
            service: self.service_name.clone(),
            from: old_state,
            to: new_state,
            at: self.changed_at,
        }];
        if let Some(error) = failure {
            events.push(LifecycleEvent::Failed {
                service: self.service_name.clone(),
                error,
            });
        }
        Ok(events)
    }

    pub(crate) fn observer(&self) -> Arc<dyn LifecycleObserver> {
        Arc::clone(&self.observer)
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state == LifecycleState::Stopped
    }

    pub fn is_error(&self) -> bool {
        self.state == LifecycleState::Error
    }
}

pub(crate) fn notify(observer: &dyn LifecycleObserver, events: &[LifecycleEvent]) {
    for event in events {
        observer.on_event(event);
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("service_name", &self.service_name)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("changed_at", &self.changed_at)
            .field("observer", &"<observer>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Lifecycle, LifecycleEvent, LifecycleState};
    use crate::events::{ChannelObserver, NoopObserver};
    use std::sync::Arc;
    use LifecycleState::*;

    const ALL: [LifecycleState; 8] = [
        Created,
        Initializing,
        Initialized,
        Starting,
        Running,
        Stopping,
        Stopped,
        Error,
    ];

    fn lifecycle() -> Lifecycle {
        Lifecycle::new("svc", Arc::new(NoopObserver))
    }

    fn drive(lc: &mut Lifecycle, path: &[LifecycleState]) {
        for state in path {
            lc.transition_to(*state, None).unwrap();
        }
    }

    #[test]
    fn happy_path_and_restart() {
        let mut lc = lifecycle();
        drive(
            &mut lc,
            &[Initializing, Initialized, Starting, Running, Stopping, Stopped],
        );
        assert!(lc.is_stopped());
        drive(&mut lc, &[Starting, Running]);
        assert!(lc.is_running());
    }

    #[test]
    fn running_cannot_skip_stopping() {
        let mut lc = lifecycle();
        drive(&mut lc, &[Initializing, Initialized, Starting, Running]);

        let err = lc.transition_to(Stopped, None).unwrap_err();
        match err {
            crate::Error::InvalidTransition { service, from, to } => {
                assert_eq!(service, "svc");
                assert_eq!(from, Running);
                assert_eq!(to, Stopped);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(lc.is_running(), "rejected transition must not change state");
    }

    #[test]
    fn error_recovers_to_initializing_or_stopped_only() {
        for target in ALL {
            let mut lc = lifecycle();
            lc.transition_to(Error, Some("boom".to_string())).unwrap();
            let result = lc.transition_to(target, None);
            if target == Initializing || target == Stopped {
                assert!(result.is_ok(), "error -> {target} should be allowed");
                assert_eq!(lc.last_error(), None);
            } else {
                assert!(result.is_err(), "error -> {target} should be rejected");
                assert!(lc.is_error());
            }
        }
    }

    #[test]
    fn every_state_but_error_can_fail() {
        for state in ALL {
            assert_eq!(
                state.can_transition_to(Error),
                state != Error,
                "{state} -> error"
            );
        }
    }

    #[test]
    fn no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{state} -> {state}");
        }
    }

    #[test]
    fn error_is_stored_only_in_error_state() {
        let mut lc = lifecycle();
        lc.transition_to(Initializing, Some("ignored".to_string()))
            .unwrap();
        assert_eq!(lc.last_error(), None);

        lc.transition_to(Error, Some("boom".to_string())).unwrap();
        assert_eq!(lc.last_error(), Some("boom"));

        lc.transition_to(Initializing, None).unwrap();
        assert_eq!(lc.last_error(), None);
    }

    #[test]
    fn notifies_observer() {
        let (observer, mut rx) = ChannelObserver::new(8);
        let mut lc = Lifecycle::new("db", Arc::new(observer));

        lc.transition_to(Initializing, None).unwrap();
        lc.transition_to(Error, Some("boom".to_string())).unwrap();

        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first,
            LifecycleEvent::StateChanged {
                from: Created,
                to: Initializing,
                ..
            }
        ));
        let second = rx.try_recv().unwrap();
        assert!(matches!(
            second,
            LifecycleEvent::StateChanged {
                from: Initializing,
                to: Error,
                ..
            }
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            LifecycleEvent::Failed {
                service: "db".to_string(),
                error: "boom".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn error_without_message_emits_no_failure_event() {
        let (observer, mut rx) = ChannelObserver::new(8);
        let mut lc = Lifecycle::new("db", Arc::new(observer));
        lc.transition_to(Error, None).unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            LifecycleEvent::StateChanged { to: Error, .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn apply_defers_notification() {
        let (observer, mut rx) = ChannelObserver::new(8);
        let mut lc = Lifecycle::new("db", Arc::new(observer));

        let events = lc.apply(Error, Some("boom".to_string())).unwrap();
        assert!(lc.is_error());
        assert_eq!(events.len(), 2);
        assert!(rx.try_recv().is_err(), "apply must not notify");

        super::notify(lc.observer().as_ref(), &events);
        assert!(matches!(
            rx.try_recv().unwrap(),
            LifecycleEvent::StateChanged { to: Error, .. }
        ));
        assert!(matches!(rx.try_recv().unwrap(), LifecycleEvent::Failed { .. }));
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Initializing).unwrap(), "\"initializing\"");
        let parsed: LifecycleState = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(parsed, Stopped);
    }
}
