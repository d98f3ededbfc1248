pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod habit_log;
pub mod model;
pub mod mutation;
pub mod observer;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use calendar::RangeSource;
pub use config::AppConfig;
pub use engine::MutationEngine;
pub use error::{GatewayError, MutationError};
pub use gateway::{Gateway, GatewayResult};
pub use habit_log::{LogIntent, LogRange, RangeLogs};
pub use model::*;
pub use mutation::{MutationKind, MutationState, MutationSummary};
pub use observer::{Event, EventBus, Notice, Subject, SubscriptionId, Topic};
pub use store::{Collections, EntityStore};
