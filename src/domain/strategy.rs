//! Strategy contract and the built-in strategy library.
//!
//! A strategy sees the signal date, the universe resolved for that date and
//! an [`AsOfView`] that cannot reach past the date. It answers with a list of
//! [`RawSignal`]s which the engine normalizes once at its boundary.

use crate::domain::error::QuantError;
use crate::domain::portal::AsOfView;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Strategy output row: either a bare symbol or a scored entry with an
/// optional explicit weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSignal {
    Symbol(String),
    Scored {
        symbol: String,
        #[serde(default)]
        score: f64,
        #[serde(default)]
        weight: Option<f64>,
    },
}

impl RawSignal {
    pub fn scored(symbol: impl Into<String>, score: f64) -> Self {
        RawSignal::Scored {
            symbol: symbol.into(),
            score,
            weight: None,
        }
    }

    pub fn weighted(symbol: impl Into<String>, score: f64, weight: f64) -> Self {
        RawSignal::Scored {
            symbol: symbol.into(),
            score,
            weight: Some(weight),
        }
    }
}

impl From<&str> for RawSignal {
    fn from(symbol: &str) -> Self {
        RawSignal::Symbol(symbol.to_string())
    }
}

impl From<String> for RawSignal {
    fn from(symbol: String) -> Self {
        RawSignal::Symbol(symbol)
    }
}

/// A normalized selection: weights across one date's signals sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub score: f64,
    pub weight: f64,
}

impl From<Signal> for RawSignal {
    fn from(s: Signal) -> Self {
        RawSignal::weighted(s.symbol, s.score, s.weight)
    }
}

pub trait Strategy {
    fn name(&self) -> &str;

    fn signals(&self, date: NaiveDate, universe: &[String], view: &AsOfView<'_>) -> Vec<RawSignal>;
}

/// Adapts a plain function or closure to [`Strategy`].
pub struct FnStrategy<F> {
    name: String,
    f: F,
}

impl<F> Strategy for FnStrategy<F>
where
    F: Fn(NaiveDate, &[String], &AsOfView<'_>) -> Vec<RawSignal>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn signals(&self, date: NaiveDate, universe: &[String], view: &AsOfView<'_>) -> Vec<RawSignal> {
        (self.f)(date, universe, view)
    }
}

pub fn fn_strategy<F>(name: impl Into<String>, f: F) -> FnStrategy<F>
where
    F: Fn(NaiveDate, &[String], &AsOfView<'_>) -> Vec<RawSignal>,
{
    FnStrategy {
        name: name.into(),
        f,
    }
}

/// Blended 1-month / 3-month close momentum. Keeps positive scores only.
#[derive(Debug, Clone)]
pub struct Momentum {
    pub lookback: usize,
    pub min_history: usize,
    pub max_picks: usize,
}

impl Default for Momentum {
    fn default() -> Self {
        Momentum {
            lookback: 180,
            min_history: 70,
            max_picks: 10,
        }
    }
}

impl Momentum {
    fn score(close: &[f64]) -> f64 {
        let n = close.len();
        let last = close[n - 1];
        let ret = |back: usize| {
            let base = close[n - back];
            if base > 0.0 { last / base - 1.0 } else { 0.0 }
        };
        ret(22) * 0.4 + ret(66) * 0.6
    }
}

impl Strategy for Momentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn signals(&self, _date: NaiveDate, universe: &[String], view: &AsOfView<'_>) -> Vec<RawSignal> {
        let min_history = self.min_history.max(66);
        let mut scored: Vec<(String, f64)> = universe
            .iter()
            .filter_map(|sym| {
                let close: Vec<f64> = view
                    .close(sym, self.lookback)
                    .into_iter()
                    .filter(|c| *c > 0.0)
                    .collect();
                if close.len() < min_history {
                    return None;
                }
                let score = Self::score(&close);
                (score > 0.0).then(|| (sym.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(self.max_picks)
            .map(|(sym, score)| RawSignal::scored(sym, score))
            .collect()
    }
}

pub const STRATEGY_KEYS: [&str; 1] = ["momentum"];

/// Look up a built-in strategy by key (case-insensitive).
pub fn lookup(key: &str) -> Result<Box<dyn Strategy>, QuantError> {
    match key.trim().to_lowercase().as_str() {
        "momentum" => Ok(Box::new(Momentum::default())),
        other => Err(QuantError::UnknownStrategy {
            key: other.to_string(),
            available: available().join(", "),
        }),
    }
}

pub fn available() -> Vec<&'static str> {
    let mut keys = STRATEGY_KEYS.to_vec();
    keys.sort_unstable();
    keys
}
