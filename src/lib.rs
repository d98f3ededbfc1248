pub mod cli;
pub mod commands;
pub mod config;

pub use cadence_core as core;
pub use cadence_core::model;
pub use cadence_core::AppConfig;

pub use cadence_http as http;
