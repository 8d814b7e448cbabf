//! Core domain types and logic: data access contracts, the walk-forward
//! engine, factor research and portfolio construction.

pub mod backtest;
pub mod bar;
pub mod config;
pub mod error;
pub mod factor;
pub mod market;
pub mod metrics;
pub mod portal;
pub mod portfolio;
pub mod retry;
pub mod stats;
pub mod strategy;
pub mod universe;
