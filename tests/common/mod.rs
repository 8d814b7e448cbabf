#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use quantlab::domain::backtest::{WalkForwardBacktestEngine, WalkForwardConfig};
pub use quantlab::domain::bar::Bar;
use quantlab::domain::error::QuantError;
use quantlab::domain::market::Market;
use quantlab::domain::portal::{HistoricalDataPortal, SeriesSource};
use quantlab::domain::retry::RetryPolicy;
use quantlab::domain::universe::UniverseProvider;
use quantlab::ports::data_port::DataPort;
use quantlab::ports::universe_port::{Membership, UniversePort};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// In-memory OHLCV store keyed by symbol.
#[derive(Default)]
pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
    pub fetches: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _market: Market,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(reason) = self.errors.get(symbol) {
            return Err(QuantError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self, _market: Market) -> Result<Vec<String>, QuantError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
        _market: Market,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        Ok(self.data.get(symbol).and_then(|bars| {
            let first = bars.iter().map(|b| b.date).min()?;
            let last = bars.iter().map(|b| b.date).max()?;
            Some((first, last, bars.len()))
        }))
    }
}

/// Membership tables held in memory.
#[derive(Default)]
pub struct MockUniversePort {
    pub snapshots: BTreeMap<NaiveDate, Vec<String>>,
    pub current: Vec<String>,
    pub history: Vec<Membership>,
}

impl MockUniversePort {
    pub fn with_current(symbols: &[&str]) -> Self {
        Self {
            current: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_history(history: Vec<Membership>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }
}

impl UniversePort for MockUniversePort {
    fn snapshot_members(&self, _market: Market, as_of: NaiveDate) -> Result<Vec<String>, QuantError> {
        Ok(self
            .snapshots
            .range(..=as_of)
            .next_back()
            .map(|(_, members)| members.clone())
            .unwrap_or_default())
    }

    fn symbols_with_bars(
        &self,
        _market: Market,
        _as_of: NaiveDate,
        _limit: usize,
    ) -> Result<Vec<String>, QuantError> {
        Ok(Vec::new())
    }

    fn current_members(&self, _market: Market) -> Result<Vec<String>, QuantError> {
        Ok(self.current.clone())
    }

    fn membership_history(&self, _market: Market) -> Result<Vec<Membership>, QuantError> {
        Ok(self.history.clone())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `count` consecutive weekdays starting on or after `start`.
pub fn weekdays(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut day = start;
    while out.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}

pub fn make_bar(date: NaiveDate, close: f64) -> Bar {
    Bar {
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000_000.0,
    }
}

/// Geometric series compounding `daily_drift` per bar.
pub fn trending_bars(start: NaiveDate, count: usize, start_price: f64, daily_drift: f64) -> Vec<Bar> {
    weekdays(start, count)
        .into_iter()
        .enumerate()
        .map(|(i, d)| make_bar(d, start_price * (1.0 + daily_drift).powi(i as i32)))
        .collect()
}

/// Engine over in-memory ports with no retry sleeps.
pub fn engine(
    config: WalkForwardConfig,
    data: MockDataPort,
    universe: MockUniversePort,
) -> WalkForwardBacktestEngine {
    let market = config.market;
    let data: Rc<dyn DataPort> = Rc::new(data);
    let universe: Rc<dyn UniversePort> = Rc::new(universe);
    WalkForwardBacktestEngine::new(
        config,
        UniverseProvider::new(Some(Rc::clone(&universe)), Some(universe)).with_retry(RetryPolicy::none()),
        HistoricalDataPortal::new(market, SeriesSource::new(Some(data), None, RetryPolicy::none())),
    )
}
