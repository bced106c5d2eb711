//! Position alert rules
//!
//! This module provides:
//! - Alert events and their message formatting
//! - Per-user thresholds with lenient parsing
//! - Rule evaluation against position summaries
//! - Cooldown registry gating repeated firings

mod checker;
mod cooldown;
mod event;
mod thresholds;

pub use checker::AlertChecker;
pub use cooldown::{CooldownConfig, CooldownRegistry, DEFAULT_COOLDOWN};
pub use event::{format_rupees, AlertCategory, AlertEvent, AlertKind};
pub(crate) use event::group_thousands;
pub use thresholds::{parse_threshold, thresholds_for, ThresholdMap, UserThresholds};
