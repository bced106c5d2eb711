//! CLI command implementations

pub mod parse_log;
pub mod send;
pub mod status;
pub mod verify;
