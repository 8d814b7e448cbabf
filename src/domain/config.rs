//! Typed configuration built from the INI port.
//!
//! Every key is optional: an absent key keeps the `Default` value of the
//! typed config. Present values are validated and rejected with
//! [`QuantError::ConfigInvalid`] naming the offending section and key.

use crate::domain::backtest::WalkForwardConfig;
use crate::domain::error::QuantError;
use crate::domain::factor::combiner::{CombineConfig, CombineMethod};
use crate::domain::market::Market;
use crate::domain::portfolio::optimizer::OptimizerConfig;
use crate::domain::portfolio::rebalancer::RebalanceConfig;
use crate::domain::retry::RetryPolicy;
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;
use std::time::Duration;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> QuantError {
    QuantError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn require(ok: bool, section: &str, key: &str, reason: &str) -> Result<(), QuantError> {
    if ok { Ok(()) } else { Err(invalid(section, key, reason)) }
}

pub fn walkforward_config(config: &dyn ConfigPort) -> Result<WalkForwardConfig, QuantError> {
    let d = WalkForwardConfig::default();
    let market = match non_empty(config, "walkforward", "market") {
        Some(m) => m
            .parse::<Market>()
            .map_err(|e| invalid("walkforward", "market", e.to_string()))?,
        None => d.market,
    };
    let cfg = WalkForwardConfig {
        train_window: config.get_usize("walkforward", "train_window", d.train_window),
        test_window: config.get_usize("walkforward", "test_window", d.test_window),
        step: config.get_usize("walkforward", "step", d.step),
        hold_days: config.get_usize("walkforward", "hold_days", d.hold_days),
        top_n: config.get_usize("walkforward", "top_n", d.top_n),
        max_universe: config.get_usize("walkforward", "max_universe", d.max_universe),
        market,
        risk_free_rate: config.get_double("walkforward", "risk_free_rate", d.risk_free_rate),
    };
    validate_walkforward_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_walkforward_config(cfg: &WalkForwardConfig) -> Result<(), QuantError> {
    const S: &str = "walkforward";
    require(cfg.train_window > 0, S, "train_window", "train_window must be positive")?;
    require(cfg.test_window > 0, S, "test_window", "test_window must be positive")?;
    require(cfg.step > 0, S, "step", "step must be positive")?;
    require(cfg.hold_days > 0, S, "hold_days", "hold_days must be positive")?;
    require(cfg.top_n > 0, S, "top_n", "top_n must be positive")?;
    require(cfg.max_universe > 0, S, "max_universe", "max_universe must be positive")?;
    require(
        (0.0..1.0).contains(&cfg.risk_free_rate),
        S,
        "risk_free_rate",
        "risk_free_rate must be between 0 and 1",
    )
}

pub fn retry_policy(config: &dyn ConfigPort) -> Result<RetryPolicy, QuantError> {
    let d = RetryPolicy::default();
    let attempts = config.get_int("retry", "max_attempts", i64::from(d.max_attempts));
    let delay_ms = config.get_int("retry", "base_delay_ms", d.base_delay.as_millis() as i64);
    let backoff = config.get_double("retry", "backoff", d.backoff);

    let max_attempts = u32::try_from(attempts)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| invalid("retry", "max_attempts", "max_attempts must be at least 1"))?;
    let delay_ms = u64::try_from(delay_ms)
        .map_err(|_| invalid("retry", "base_delay_ms", "base_delay_ms must be non-negative"))?;
    require(backoff.is_finite() && backoff >= 1.0, "retry", "backoff", "backoff must be >= 1")?;

    Ok(RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(delay_ms),
        backoff,
    })
}

pub fn combine_config(config: &dyn ConfigPort) -> Result<CombineConfig, QuantError> {
    let d = CombineConfig::default();
    let method = match non_empty(config, "combiner", "method") {
        Some(m) => m
            .parse::<CombineMethod>()
            .map_err(|e| invalid("combiner", "method", e.to_string()))?,
        None => d.method,
    };
    let cfg = CombineConfig {
        method,
        l2_alpha: config.get_double("combiner", "l2_alpha", d.l2_alpha),
        max_weight: config.get_double("combiner", "max_weight", d.max_weight),
    };
    validate_combine_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_combine_config(cfg: &CombineConfig) -> Result<(), QuantError> {
    require(cfg.l2_alpha >= 0.0, "combiner", "l2_alpha", "l2_alpha must be non-negative")?;
    require(
        cfg.max_weight > 0.0 && cfg.max_weight <= 1.0,
        "combiner",
        "max_weight",
        "max_weight must be in (0, 1]",
    )
}

pub fn optimizer_config(config: &dyn ConfigPort) -> Result<OptimizerConfig, QuantError> {
    let d = OptimizerConfig::default();
    let cfg = OptimizerConfig {
        class_min_weight: config.get_double("optimizer", "class_min_weight", d.class_min_weight),
        class_max_weight: config.get_double("optimizer", "class_max_weight", d.class_max_weight),
        single_name_max_weight: config.get_double(
            "optimizer",
            "single_name_max_weight",
            d.single_name_max_weight,
        ),
    };
    validate_optimizer_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_optimizer_config(cfg: &OptimizerConfig) -> Result<(), QuantError> {
    const S: &str = "optimizer";
    require(
        (0.0..=1.0).contains(&cfg.class_min_weight),
        S,
        "class_min_weight",
        "class_min_weight must be in [0, 1]",
    )?;
    require(
        cfg.class_max_weight > 0.0 && cfg.class_max_weight <= 1.0,
        S,
        "class_max_weight",
        "class_max_weight must be in (0, 1]",
    )?;
    require(
        cfg.class_min_weight <= cfg.class_max_weight,
        S,
        "class_min_weight",
        "class_min_weight must not exceed class_max_weight",
    )?;
    require(
        cfg.single_name_max_weight > 0.0 && cfg.single_name_max_weight <= 1.0,
        S,
        "single_name_max_weight",
        "single_name_max_weight must be in (0, 1]",
    )
}

pub fn rebalance_config(config: &dyn ConfigPort) -> Result<RebalanceConfig, QuantError> {
    let d = RebalanceConfig::default();
    let cfg = RebalanceConfig {
        drift_threshold: config.get_double("rebalance", "drift_threshold", d.drift_threshold),
        min_trade_notional: config.get_double("rebalance", "min_trade_notional", d.min_trade_notional),
        fee_bps: config.get_double("rebalance", "fee_bps", d.fee_bps),
        tax_bps_on_sell: config.get_double("rebalance", "tax_bps_on_sell", d.tax_bps_on_sell),
    };
    validate_rebalance_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_rebalance_config(cfg: &RebalanceConfig) -> Result<(), QuantError> {
    const S: &str = "rebalance";
    require(cfg.drift_threshold >= 0.0, S, "drift_threshold", "drift_threshold must be non-negative")?;
    require(
        cfg.min_trade_notional >= 0.0,
        S,
        "min_trade_notional",
        "min_trade_notional must be non-negative",
    )?;
    require(cfg.fee_bps >= 0.0, S, "fee_bps", "fee_bps must be non-negative")?;
    require(cfg.tax_bps_on_sell >= 0.0, S, "tax_bps_on_sell", "tax_bps_on_sell must be non-negative")
}

/// Where symbol lists come from when the store has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniverseSettings {
    pub us_membership_csv: Option<PathBuf>,
    pub kr_fallback: Option<Vec<String>>,
    pub us_fallback: Option<Vec<String>>,
    pub max_symbols: Option<usize>,
}

fn code_list(config: &dyn ConfigPort, key: &str) -> Result<Option<Vec<String>>, QuantError> {
    non_empty(config, "universe", key)
        .map(|raw| parse_codes(&raw).map_err(|e| invalid("universe", key, e.to_string())))
        .transpose()
}

pub fn universe_settings(config: &dyn ConfigPort) -> Result<UniverseSettings, QuantError> {
    let max_symbols = match config.get_int("universe", "max_symbols", -1) {
        -1 => None,
        n => Some(
            usize::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("universe", "max_symbols", "max_symbols must be positive"))?,
        ),
    };
    Ok(UniverseSettings {
        us_membership_csv: non_empty(config, "universe", "us_membership_csv").map(PathBuf::from),
        kr_fallback: code_list(config, "kr_fallback")?,
        us_fallback: code_list(config, "us_fallback")?,
        max_symbols,
    })
}

/// Locations of the primary and secondary data stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSettings {
    pub sqlite_path: Option<PathBuf>,
    pub pool_size: u32,
    pub csv_path: Option<PathBuf>,
}

pub fn store_settings(config: &dyn ConfigPort) -> Result<StoreSettings, QuantError> {
    let pool_size = u32::try_from(config.get_int("sqlite", "pool_size", 4))
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| invalid("sqlite", "pool_size", "pool_size must be at least 1"))?;
    Ok(StoreSettings {
        sqlite_path: non_empty(config, "sqlite", "path").map(PathBuf::from),
        pool_size,
        csv_path: non_empty(config, "csv", "path").map(PathBuf::from),
    })
}
