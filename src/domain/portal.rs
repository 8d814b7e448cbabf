//! Look-ahead-safe historical data access.
//!
//! [`HistoricalDataPortal`] owns a lazily populated per-symbol series cache.
//! Strategies never see the portal directly: they receive an [`AsOfView`]
//! bound to a cutoff date, and every read through the view is sliced so that
//! no bar dated after the cutoff can be returned.

use crate::domain::bar::{Bar, into_ordered};
use crate::domain::market::Market;
use crate::domain::retry::RetryPolicy;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// Bounds used when loading a symbol's whole history from a store.
pub fn history_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

pub fn history_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2999, 12, 31).unwrap_or_default()
}

/// Primary store with an optional secondary quote source behind it.
#[derive(Clone)]
pub struct SeriesSource {
    primary: Option<Rc<dyn DataPort>>,
    fallback: Option<Rc<dyn DataPort>>,
    retry: RetryPolicy,
}

impl SeriesSource {
    pub fn new(
        primary: Option<Rc<dyn DataPort>>,
        fallback: Option<Rc<dyn DataPort>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            retry,
        }
    }

    /// Full ordered history for `symbol`. The secondary source is consulted
    /// only when the primary yields nothing; failures on both sides produce
    /// an empty series.
    pub fn load(&self, symbol: &str, market: Market) -> Vec<Bar> {
        let (start, end) = (history_start(), history_end());
        for port in [&self.primary, &self.fallback].into_iter().flatten() {
            let bars = self.retry.call_or_default("fetch_ohlcv", Vec::new(), || {
                port.fetch_ohlcv(symbol, market, start, end)
            });
            if !bars.is_empty() {
                return into_ordered(bars);
            }
        }
        tracing::warn!(symbol, market = %market, "no series available from any source");
        Vec::new()
    }
}

pub struct HistoricalDataPortal {
    market: Market,
    source: SeriesSource,
    series_cache: RefCell<HashMap<String, Rc<[Bar]>>>,
}

impl HistoricalDataPortal {
    pub fn new(market: Market, source: SeriesSource) -> Self {
        Self {
            market,
            source,
            series_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Load `symbol` into the cache if absent and return its series.
    /// Repeated calls never hit the store again, even for empty series.
    pub fn ensure_series(&self, symbol: &str) -> Rc<[Bar]> {
        let key = self.market.normalize_symbol(symbol);
        if let Some(series) = self.series_cache.borrow().get(&key) {
            return Rc::clone(series);
        }
        let series: Rc<[Bar]> = self.source.load(&key, self.market).into();
        self.series_cache
            .borrow_mut()
            .insert(key, Rc::clone(&series));
        series
    }

    pub fn series_len(&self, symbol: &str) -> usize {
        self.ensure_series(symbol).len()
    }

    /// Sorted union of every bar date in `[start, end]` across `symbols`.
    pub fn get_calendar<S: AsRef<str>>(
        &self,
        symbols: &[S],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<NaiveDate> {
        let days: BTreeSet<NaiveDate> = symbols
            .iter()
            .flat_map(|s| {
                self.ensure_series(s.as_ref())
                    .iter()
                    .map(|b| b.date)
                    .filter(|d| *d >= start && *d <= end)
                    .collect::<Vec<_>>()
            })
            .collect();
        days.into_iter().collect()
    }

    pub fn as_of(&self, cutoff: NaiveDate) -> AsOfView<'_> {
        AsOfView {
            portal: self,
            cutoff,
        }
    }

    /// Last positive close dated on or before `date`; 0 when unknown.
    pub fn price_on_or_before(&self, symbol: &str, date: NaiveDate) -> f64 {
        let series = self.ensure_series(symbol);
        let end = series.partition_point(|b| b.date <= date);
        series[..end]
            .iter()
            .rev()
            .find(|b| b.close > 0.0)
            .map(|b| b.close)
            .unwrap_or(0.0)
    }
}

/// Read-only projection of the portal restricted to dates `<= cutoff`.
#[derive(Clone, Copy)]
pub struct AsOfView<'a> {
    portal: &'a HistoricalDataPortal,
    cutoff: NaiveDate,
}

impl<'a> AsOfView<'a> {
    pub fn as_of_date(&self) -> NaiveDate {
        self.cutoff
    }

    pub fn market(&self) -> Market {
        self.portal.market
    }

    /// At most the last `lookback` bars dated `<= cutoff`, oldest first.
    /// A `lookback` of 0 returns every visible bar.
    pub fn ohlcv(&self, symbol: &str, lookback: usize) -> Vec<Bar> {
        let series = self.portal.ensure_series(symbol);
        let end = series.partition_point(|b| b.date <= self.cutoff);
        let start = if lookback > 0 {
            end.saturating_sub(lookback)
        } else {
            0
        };
        series[start..end].to_vec()
    }

    pub fn close(&self, symbol: &str, lookback: usize) -> Vec<f64> {
        self.ohlcv(symbol, lookback).iter().map(|b| b.close).collect()
    }

    pub fn latest_price(&self, symbol: &str) -> f64 {
        self.ohlcv(symbol, 1).last().map(|b| b.close).unwrap_or(0.0)
    }
}
