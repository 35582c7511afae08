//! Data models: configuration, processing state and output records.

pub mod config;
pub mod record;
pub mod state;
