pub mod client;
pub mod token;

pub use client::HttpGateway;
pub use token::TokenStore;
