//! quantlab: walk-forward backtesting and factor research for KR, US and
//! BTC markets.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], command-line orchestration in
//! [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
