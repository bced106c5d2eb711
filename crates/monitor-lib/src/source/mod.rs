//! Position data sources
//!
//! This module provides:
//! - The `SnapshotSource` seam the alert service polls
//! - Option position aggregation per user
//! - HTTP bridge source speaking the `~` / `|` record format
//! - An in-memory source for tests and dry runs

mod aggregate;
mod bridge;

use crate::models::OptionsPositionSummary;
use async_trait::async_trait;
use std::sync::RwLock;
use thiserror::Error;

pub use aggregate::{aggregate_user, classify_symbol, OptionSide};
pub use bridge::{parse_positions, parse_users, unwrap_envelope, BridgeConfig, BridgeSource};

/// Errors raised while fetching position data
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Bridge request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Bridge returned {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid bridge URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Bridge API error: {0}")]
    Api(String),
}

/// Pull-style provider of the current per-user snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Cheap reachability check
    async fn ping(&self) -> bool;

    /// Summaries for every monitored user
    async fn snapshot(&self) -> Result<Vec<OptionsPositionSummary>, SourceError>;
}

/// Source serving whatever summaries were last stored in it
#[derive(Default)]
pub struct StaticSource {
    summaries: RwLock<Vec<OptionsPositionSummary>>,
}

impl StaticSource {
    pub fn new(summaries: Vec<OptionsPositionSummary>) -> Self {
        Self {
            summaries: RwLock::new(summaries),
        }
    }

    pub fn replace(&self, summaries: Vec<OptionsPositionSummary>) {
        let mut guard = self
            .summaries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = summaries;
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn ping(&self) -> bool {
        true
    }

    async fn snapshot(&self) -> Result<Vec<OptionsPositionSummary>, SourceError> {
        let guard = self
            .summaries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(guard.clone())
    }
}
