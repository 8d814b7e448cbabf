//! Factor definitions and the registry that evaluates them.
//!
//! A [`FactorRegistry`] is built once (usually with the baseline set) and
//! passed to whatever needs to score symbols. Registration is append-only:
//! a name can be registered once and never replaced.

use crate::domain::error::QuantError;
use crate::domain::factor::context::FactorContext;
use crate::domain::market::Market;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FactorCategory {
    Momentum,
    Value,
    Quality,
    Technical,
    Sentiment,
    Alternative,
}

impl FactorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorCategory::Momentum => "momentum",
            FactorCategory::Value => "value",
            FactorCategory::Quality => "quality",
            FactorCategory::Technical => "technical",
            FactorCategory::Sentiment => "sentiment",
            FactorCategory::Alternative => "alternative",
        }
    }
}

impl fmt::Display for FactorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactorCategory {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "momentum" => Ok(FactorCategory::Momentum),
            "value" => Ok(FactorCategory::Value),
            "quality" => Ok(FactorCategory::Quality),
            "technical" => Ok(FactorCategory::Technical),
            "sentiment" => Ok(FactorCategory::Sentiment),
            "alternative" => Ok(FactorCategory::Alternative),
            other => Err(QuantError::invalid(format!("unknown factor category: {other}"))),
        }
    }
}

/// Markets a factor may be evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseScope {
    All,
    Kr,
    Us,
    Btc,
    KrUs,
}

impl UniverseScope {
    pub fn admits(&self, market: Market) -> bool {
        match self {
            UniverseScope::All => true,
            UniverseScope::Kr => market == Market::Kr,
            UniverseScope::Us => market == Market::Us,
            UniverseScope::Btc => market == Market::Btc,
            UniverseScope::KrUs => matches!(market, Market::Kr | Market::Us),
        }
    }
}

impl fmt::Display for UniverseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniverseScope::All => "all",
            UniverseScope::Kr => "kr",
            UniverseScope::Us => "us",
            UniverseScope::Btc => "btc",
            UniverseScope::KrUs => "kr_us",
        })
    }
}

/// Scoring function: `(context, symbol, as_of, market) -> value`.
/// Higher values are more attractive.
pub type FactorFn = Box<dyn Fn(&FactorContext, &str, NaiveDate, Market) -> Result<f64, QuantError>>;

pub struct FactorDefinition {
    pub name: String,
    pub category: FactorCategory,
    pub scope: UniverseScope,
    func: FactorFn,
}

impl fmt::Debug for FactorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct FactorRegistry {
    factors: BTreeMap<String, FactorDefinition>,
}

impl FactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the twenty baseline factors.
    pub fn with_baseline() -> Self {
        let mut registry = Self::new();
        super::baseline::register_all(&mut registry);
        registry
    }

    pub fn register<F>(
        &mut self,
        name: &str,
        category: FactorCategory,
        scope: UniverseScope,
        func: F,
    ) -> Result<(), QuantError>
    where
        F: Fn(&FactorContext, &str, NaiveDate, Market) -> Result<f64, QuantError> + 'static,
    {
        let key = name.trim();
        if key.is_empty() {
            return Err(QuantError::invalid("factor name is required"));
        }
        if self.factors.contains_key(key) {
            return Err(QuantError::DuplicateFactor(key.to_string()));
        }
        self.factors.insert(
            key.to_string(),
            FactorDefinition {
                name: key.to_string(),
                category,
                scope,
                func: Box::new(func),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FactorDefinition> {
        self.factors.get(name)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FactorDefinition> {
        self.factors.values()
    }

    /// Sorted names, optionally filtered by category and by market.
    pub fn available(&self, category: Option<FactorCategory>, market: Option<Market>) -> Vec<String> {
        self.factors
            .values()
            .filter(|d| category.is_none_or(|c| d.category == c))
            .filter(|d| market.is_none_or(|m| d.scope.admits(m)))
            .map(|d| d.name.clone())
            .collect()
    }

    /// Evaluate one factor. An unregistered name is an error; a scope
    /// mismatch, a failing function or a non-finite result yields 0.
    pub fn calc(
        &self,
        ctx: &FactorContext,
        name: &str,
        as_of: NaiveDate,
        symbol: &str,
        market: Market,
    ) -> Result<f64, QuantError> {
        let def = self
            .factors
            .get(name)
            .ok_or_else(|| QuantError::UnknownFactor(name.to_string()))?;

        if !def.scope.admits(market) {
            return Ok(0.0);
        }

        match (def.func)(ctx, symbol, as_of, market) {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(v) => {
                tracing::warn!(factor = name, symbol, date = %as_of, value = v, "non-finite factor value");
                Ok(0.0)
            }
            Err(e) => {
                tracing::warn!(factor = name, symbol, date = %as_of, error = %e, "factor calc failed");
                Ok(0.0)
            }
        }
    }

    /// Evaluate `names` (every registered factor when `None`).
    pub fn calc_all(
        &self,
        ctx: &FactorContext,
        as_of: NaiveDate,
        symbol: &str,
        market: Market,
        names: Option<&[String]>,
    ) -> Result<BTreeMap<String, f64>, QuantError> {
        let names: Vec<&str> = match names {
            Some(n) => n.iter().map(String::as_str).collect(),
            None => self.factors.keys().map(String::as_str).collect(),
        };
        names
            .into_iter()
            .map(|n| Ok((n.to_string(), self.calc(ctx, n, as_of, symbol, market)?)))
            .collect()
    }
}
