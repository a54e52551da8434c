//! # Cycle Trader
//!
//! Scheduled execution engine for cycle-based trading strategies: divided
//! averaging-down with star-threshold exits, and target-value rebalancing.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `model`: Strategies, snapshots, orders and per-variant progress state
//! - `broker`: Broker gateway trait, account routing and a paper broker
//! - `strategy`: Order generation and next-state calculation per variant
//! - `engine`: Reconciliation, snapshot transitions, tick runner, scheduler
//! - `persistence`: SQLite storage for strategies, snapshots and orders
//! - `utils`: Shared utilities and decimal arithmetic

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod persistence;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
