//! Shared, per-run data cache for factor functions.

use crate::domain::bar::Bar;
use crate::domain::market::{BTC_SYMBOL, Market};
use crate::domain::portal::SeriesSource;
use crate::domain::retry::RetryPolicy;
use crate::ports::fundamentals_port::{AltData, AltDataPort, Fundamentals, FundamentalsPort};
use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Neutral fear & greed reading used when no provider answers.
pub const NEUTRAL_FEAR_GREED: f64 = 50.0;

const BTC_ALIASES: [&str; 3] = [BTC_SYMBOL, "BTCUSDT", "KRW-BTC"];

/// Caches OHLCV, fundamentals and alternative data per (market, symbol) for
/// the lifetime of one analysis run. Price reads honor the same as-of
/// contract as the backtest portal; [`forward_return`](Self::forward_return)
/// is the only accessor that looks past `as_of`.
pub struct FactorContext {
    source: SeriesSource,
    fundamentals: Option<Rc<dyn FundamentalsPort>>,
    alt: Option<Rc<dyn AltDataPort>>,
    retry: RetryPolicy,
    series_cache: RefCell<HashMap<String, Rc<[Bar]>>>,
    fund_cache: RefCell<HashMap<String, Fundamentals>>,
    alt_cache: RefCell<HashMap<String, AltData>>,
    orderbook_cache: RefCell<HashMap<String, f64>>,
    fear_greed: Cell<Option<f64>>,
}

impl FactorContext {
    pub fn new(source: SeriesSource) -> Self {
        Self {
            source,
            fundamentals: None,
            alt: None,
            retry: RetryPolicy::default(),
            series_cache: RefCell::new(HashMap::new()),
            fund_cache: RefCell::new(HashMap::new()),
            alt_cache: RefCell::new(HashMap::new()),
            orderbook_cache: RefCell::new(HashMap::new()),
            fear_greed: Cell::new(None),
        }
    }

    /// Context with no collaborators; every accessor yields its neutral value.
    pub fn offline() -> Self {
        Self::new(SeriesSource::new(None, None, RetryPolicy::none())).with_retry(RetryPolicy::none())
    }

    pub fn with_fundamentals(mut self, port: Rc<dyn FundamentalsPort>) -> Self {
        self.fundamentals = Some(port);
        self
    }

    pub fn with_alt_data(mut self, port: Rc<dyn AltDataPort>) -> Self {
        self.alt = Some(port);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn series(&self, symbol: &str, market: Market) -> Rc<[Bar]> {
        let key = market.cache_key(symbol);
        if let Some(series) = self.series_cache.borrow().get(&key) {
            return Rc::clone(series);
        }
        let series: Rc<[Bar]> = self
            .source
            .load(&market.normalize_symbol(symbol), market)
            .into();
        self.series_cache
            .borrow_mut()
            .insert(key, Rc::clone(&series));
        series
    }

    /// At most `lookback` bars dated `<= as_of` (all of them when 0).
    pub fn ohlcv(&self, symbol: &str, as_of: NaiveDate, market: Market, lookback: usize) -> Vec<Bar> {
        let series = self.series(symbol, market);
        let end = series.partition_point(|b| b.date <= as_of);
        let start = if lookback > 0 {
            end.saturating_sub(lookback)
        } else {
            0
        };
        series[start..end].to_vec()
    }

    /// Positive closes from [`ohlcv`](Self::ohlcv).
    pub fn close(&self, symbol: &str, as_of: NaiveDate, market: Market, lookback: usize) -> Vec<f64> {
        self.ohlcv(symbol, as_of, market, lookback)
            .into_iter()
            .map(|b| b.close)
            .filter(|c| *c > 0.0)
            .collect()
    }

    /// `close[t + horizon] / close[t] - 1` where `t` is the last bar dated
    /// `<= as_of`. `None` when either price is missing or the horizon runs
    /// past the end of the series. Only used to label factor observations.
    pub fn forward_return(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        market: Market,
        horizon: usize,
    ) -> Option<f64> {
        let series = self.series(symbol, market);
        let idx = series.partition_point(|b| b.date <= as_of).checked_sub(1)?;
        let exit = series.get(idx + horizon.max(1))?;
        let p0 = series[idx].close;
        let p1 = exit.close;
        if p0 <= 0.0 || p1 <= 0.0 {
            return None;
        }
        Some(p1 / p0 - 1.0)
    }

    pub fn fundamentals(&self, symbol: &str, market: Market) -> Fundamentals {
        let key = market.cache_key(symbol);
        if let Some(f) = self.fund_cache.borrow().get(&key) {
            return f.clone();
        }
        let data = match &self.fundamentals {
            Some(port) => self
                .retry
                .call_or_default("fundamentals", None, || {
                    port.fundamentals(&market.normalize_symbol(symbol), market)
                })
                .unwrap_or_default(),
            None => Fundamentals::default(),
        };
        self.fund_cache.borrow_mut().insert(key, data.clone());
        data
    }

    pub fn alt_data(&self, symbol: &str) -> AltData {
        let key = symbol.trim().to_uppercase();
        if let Some(a) = self.alt_cache.borrow().get(&key) {
            return a.clone();
        }
        let data = match &self.alt {
            Some(port) => self
                .retry
                .call_or_default("alt_data", None, || port.alt_data(&key))
                .unwrap_or_default(),
            None => AltData::default(),
        };
        self.alt_cache.borrow_mut().insert(key, data.clone());
        data
    }

    /// Macro fear & greed index on 0-100; 50 when unavailable.
    pub fn fear_greed_index(&self) -> f64 {
        if let Some(v) = self.fear_greed.get() {
            return v;
        }
        let v = self
            .alt
            .as_ref()
            .and_then(|port| {
                self.retry
                    .call_or_default("fear_greed_index", None, || port.fear_greed_index())
            })
            .filter(|v| v.is_finite())
            .unwrap_or(NEUTRAL_FEAR_GREED);
        self.fear_greed.set(Some(v));
        v
    }

    /// Order-book imbalance for BTC symbols; 0 for anything else.
    pub fn orderbook_imbalance(&self, symbol: &str, market: Market) -> f64 {
        let s = symbol.trim().to_uppercase();
        let is_btc = market == Market::Btc || BTC_ALIASES.contains(&s.as_str());
        if !is_btc {
            return 0.0;
        }
        let key = Market::Btc.cache_key(&s);
        if let Some(v) = self.orderbook_cache.borrow().get(&key) {
            return *v;
        }
        let v = self
            .alt
            .as_ref()
            .and_then(|port| {
                self.retry
                    .call_or_default("orderbook_imbalance", None, || port.orderbook_imbalance(&s))
            })
            .unwrap_or(0.0);
        self.orderbook_cache.borrow_mut().insert(key, v);
        v
    }
}
