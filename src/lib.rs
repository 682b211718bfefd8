// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod scoring;
pub mod session;
pub mod state;
pub mod sweeper;
pub mod types;
