//! HoneyCertify Observability
//!
//! This crate provides observability features:
//! - Metrics collection (Prometheus)
//! - Structured logging setup
//! - Health endpoints

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{ComponentStatus, HealthState, ReadinessChecker, StatsProvider, health_router};
pub use logging::{LoggingSettings, init_logging};
pub use metrics::Metrics;
