use std::sync::Arc;

use cadence_core::{Event, EventBus, Topic};
use parking_lot::RwLock;

/// Holds the bearer token supplied by the host. Changes are announced on [`Topic::Auth`].
#[derive(Default)]
pub struct TokenStore {
    token: RwLock<Option<String>>,
    bus: Option<Arc<EventBus>>,
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(clean(token)),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_present(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn set(&self, token: Option<String>) {
        let token = clean(token);
        let present = token.is_some();
        *self.token.write() = token;
        if let Some(bus) = &self.bus {
            bus.notify(Topic::Auth, &Event::TokenChanged { present });
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }
}

fn clean(token: Option<String>) -> Option<String> {
    token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
