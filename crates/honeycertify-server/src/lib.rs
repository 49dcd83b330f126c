//! HoneyCertify server
//!
//! Configuration, authentication and HTTP wiring for the tenant routing
//! layer. The `honeycertify-server` binary drives these from the CLI.

pub mod app;
pub mod auth;
pub mod bootstrap;
pub mod config;

pub use app::{AppState, router};
pub use config::{ConfigError, ServerConfig};
