//! Core domain types and logic.

pub mod ohlcv;
pub mod bar_series;
pub mod indicator;
pub mod trend;
pub mod entry;
pub mod position;
pub mod simulator;
pub mod engine;
pub mod feed;
pub mod metrics;
pub mod strategy;
pub mod config_validation;
pub mod error;
