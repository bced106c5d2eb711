//! Library for the position alert monitor
//!
//! This crate provides the core functionality for:
//! - Burst deduplication and rate-limited message delivery
//! - Threshold rules with per-user cooldowns
//! - Position snapshots from the broker bridge
//! - Grid log tailing and alert formatting
//! - Health checks and observability

pub mod delivery;
pub mod gridlog;
pub mod health;
pub mod models;
pub mod observability;
pub mod rules;
pub mod service;
pub mod source;

pub use delivery::{NotifierClient, NotifierConfig, RateLimitStatus};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
