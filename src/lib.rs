// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod ratelimit;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
