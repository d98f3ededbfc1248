//! Records mutation lifecycle events so optimistic flows can be inspected after the fact.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::mutation::MutationKind;

/// Oldest events are dropped once this many are held.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MutationQueued { kind: MutationKind, target: String },
    MutationConfirmed { kind: MutationKind, target: String },
    MutationRolledBack {
        kind: MutationKind,
        target: String,
        error: String,
        silent: bool,
    },
    RefreshCompleted { collection: &'static str, count: usize },
    RefreshFailed { collection: &'static str, error: String },
}

pub struct Handle {
    #[cfg(feature = "telemetry")]
    events: Mutex<VecDeque<Event>>,
}

impl Handle {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "telemetry")]
            events: Mutex::new(VecDeque::with_capacity(EVENT_CAPACITY)),
        }
    }

    pub fn record(&self, event: Event) {
        #[cfg(feature = "telemetry")]
        {
            match &event {
                Event::MutationQueued { kind, target } => tracing::debug!(
                    action = kind.label(),
                    target = target.as_str(),
                    "mutation queued"
                ),
                Event::MutationConfirmed { kind, target } => tracing::debug!(
                    action = kind.label(),
                    target = target.as_str(),
                    "mutation confirmed"
                ),
                Event::MutationRolledBack {
                    kind,
                    target,
                    error,
                    silent,
                } => {
                    if *silent {
                        tracing::debug!(
                            action = kind.label(),
                            target = target.as_str(),
                            error = %error,
                            "mutation rolled back before sign-in"
                        )
                    } else {
                        tracing::warn!(
                            action = kind.label(),
                            target = target.as_str(),
                            error = %error,
                            "mutation rolled back"
                        )
                    }
                }
                Event::RefreshCompleted { collection, count } => {
                    tracing::debug!(collection, count, "refresh completed")
                }
                Event::RefreshFailed { collection, error } => {
                    tracing::warn!(collection, error = %error, "refresh failed")
                }
            }
            let mut events = self.events.lock();
            if events.len() == EVENT_CAPACITY {
                events.pop_front();
            }
            events.push_back(event);
        }
        #[cfg(not(feature = "telemetry"))]
        {
            let _ = event;
        }
    }

    /// The most recent events, oldest first. Always empty with telemetry disabled.
    pub fn events(&self) -> Vec<Event> {
        #[cfg(feature = "telemetry")]
        {
            self.events.lock().iter().cloned().collect()
        }
        #[cfg(not(feature = "telemetry"))]
        {
            Vec::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        cfg!(feature = "telemetry")
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}
