//! Topic-keyed listener registry used for store changes, failure notices and auth state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Tasks,
    Habits,
    HabitLogs,
    Notices,
    Auth,
}

/// A mutation that rolled back and should be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TasksChanged { version: u64 },
    HabitsChanged { version: u64 },
    HabitLogsChanged { version: u64 },
    Notice(Notice),
    TokenChanged { present: bool },
}

pub type EventBus = Subject<Topic, Event>;

pub struct Subject<T, E> {
    registry: Mutex<Registry<T, E>>,
}

struct Registry<T, E> {
    next_id: u64,
    listeners: HashMap<T, Vec<(SubscriptionId, Listener<E>)>>,
}

impl<T, E> Subject<T, E>
where
    T: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                listeners: HashMap::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, topic: T, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .listeners
            .entry(topic)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let mut removed = false;
        for listeners in registry.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|(existing, _)| *existing != id);
            removed |= listeners.len() != before;
        }
        registry.listeners.retain(|_, listeners| !listeners.is_empty());
        removed
    }

    /// Call every listener of `topic` in subscription order and return how many ran.
    ///
    /// Listeners run after the registry lock is released, so they may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, topic: T, event: &E) -> usize {
        let listeners: Vec<Listener<E>> = self
            .registry
            .lock()
            .listeners
            .get(&topic)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, topic: T) -> usize {
        self.registry
            .lock()
            .listeners
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl<T, E> Default for Subject<T, E>
where
    T: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
