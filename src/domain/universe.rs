//! Date-aware tradable-universe resolution per market.
//!
//! KR walks a four-stage waterfall (snapshot table, symbols with bars,
//! current membership, static list). US filters a point-in-time constituency
//! history so that delisted names appear only while they were members. BTC
//! is always the single coin.

use crate::domain::market::{BTC_SYMBOL, Market};
use crate::domain::retry::RetryPolicy;
use crate::ports::universe_port::{Membership, UniversePort};
use chrono::{Duration, NaiveDate};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

pub const KR_STATIC_FALLBACK: [&str; 10] = [
    "005930", "000660", "035420", "005380", "051910", "068270", "207940", "006400", "035720",
    "105560",
];

pub const US_STATIC_FALLBACK: [&str; 50] = [
    "AAPL", "MSFT", "NVDA", "GOOGL", "AMZN", "META", "TSLA", "AVGO", "ADBE", "NFLX", "ORCL", "CRM",
    "AMD", "INTC", "QCOM", "MU", "AMAT", "LRCX", "ASML", "JPM", "BAC", "WFC", "GS", "MS", "C",
    "LLY", "JNJ", "MRK", "ABBV", "PFE", "UNH", "HD", "LOW", "COST", "TGT", "MCD", "SBUX", "NKE",
    "CAT", "BA", "GE", "HON", "XOM", "CVX", "SPY", "QQQ", "XLK", "XLF", "XLE", "XLV",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

/// Parse a comma-separated code list (as found in config files).
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

pub struct UniverseProvider {
    store: Option<Rc<dyn UniversePort>>,
    membership_source: Option<Rc<dyn UniversePort>>,
    kr_fallback: Vec<String>,
    us_fallback: Vec<String>,
    retry: RetryPolicy,
    us_members: RefCell<Option<Rc<[Membership]>>>,
}

impl UniverseProvider {
    /// `store` backs the KR tables; US membership history is read from
    /// `membership_source` first and then from `store`.
    pub fn new(
        store: Option<Rc<dyn UniversePort>>,
        membership_source: Option<Rc<dyn UniversePort>>,
    ) -> Self {
        Self {
            store,
            membership_source,
            kr_fallback: KR_STATIC_FALLBACK.iter().map(|s| s.to_string()).collect(),
            us_fallback: US_STATIC_FALLBACK.iter().map(|s| s.to_string()).collect(),
            retry: RetryPolicy::default(),
            us_members: RefCell::new(None),
        }
    }

    /// Provider with no tables at all; every market resolves to its static list.
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_kr_fallback(mut self, codes: Vec<String>) -> Self {
        self.kr_fallback = codes;
        self
    }

    pub fn with_us_fallback(mut self, codes: Vec<String>) -> Self {
        self.us_fallback = codes;
        self
    }

    /// Eligible symbols as of `as_of`, deduplicated in resolution order and
    /// truncated to `max_symbols`.
    pub fn get_universe(&self, as_of: NaiveDate, market: Market, max_symbols: usize) -> Vec<String> {
        let raw = match market {
            Market::Btc => vec![BTC_SYMBOL.to_string()],
            Market::Us => self.us_universe(as_of),
            Market::Kr => self.kr_universe(as_of, max_symbols),
        };

        let mut seen = HashSet::new();
        raw.into_iter()
            .map(|s| market.normalize_symbol(&s))
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .take(max_symbols)
            .collect()
    }

    /// Sorted union of universes sampled every `step_days` through
    /// `[start, end]`, with `end` always sampled.
    pub fn get_universe_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        market: Market,
        step_days: usize,
        max_symbols: usize,
    ) -> Vec<String> {
        if start > end {
            return Vec::new();
        }
        let step = Duration::days(step_days.max(1) as i64);
        let mut bag = BTreeSet::new();
        let mut ptr = start;
        while ptr <= end {
            bag.extend(self.get_universe(ptr, market, max_symbols));
            ptr += step;
        }
        bag.extend(self.get_universe(end, market, max_symbols));
        bag.into_iter().collect()
    }

    fn kr_universe(&self, as_of: NaiveDate, max_symbols: usize) -> Vec<String> {
        if let Some(store) = &self.store {
            let snapshot = self.retry.call_or_default("snapshot_members", Vec::new(), || {
                store.snapshot_members(Market::Kr, as_of)
            });
            if !snapshot.is_empty() {
                return snapshot;
            }

            let with_bars = self.retry.call_or_default("symbols_with_bars", Vec::new(), || {
                store.symbols_with_bars(Market::Kr, as_of, max_symbols)
            });
            if !with_bars.is_empty() {
                tracing::debug!(%as_of, "kr universe from bar history");
                return with_bars;
            }

            let current = self.retry.call_or_default("current_members", Vec::new(), || {
                store.current_members(Market::Kr)
            });
            if !current.is_empty() {
                tracing::debug!(%as_of, "kr universe from current membership");
                return current;
            }
        }
        tracing::debug!(%as_of, "kr universe from static fallback");
        self.kr_fallback.clone()
    }

    fn us_universe(&self, as_of: NaiveDate) -> Vec<String> {
        self.us_membership()
            .iter()
            .filter(|m| m.covers(as_of))
            .map(|m| m.symbol.clone())
            .collect()
    }

    /// Constituency history, loaded once per provider.
    fn us_membership(&self) -> Rc<[Membership]> {
        if let Some(rows) = self.us_members.borrow().as_ref() {
            return Rc::clone(rows);
        }

        let mut rows = Vec::new();
        for source in [&self.membership_source, &self.store].into_iter().flatten() {
            rows = self
                .retry
                .call_or_default("membership_history", Vec::new(), || {
                    source.membership_history(Market::Us)
                });
            if !rows.is_empty() {
                break;
            }
        }
        if rows.is_empty() {
            tracing::warn!("no us membership history, using static large-cap list");
            rows = self
                .us_fallback
                .iter()
                .map(|s| Membership {
                    symbol: s.clone(),
                    start_date: None,
                    end_date: None,
                })
                .collect();
        }

        let rows: Rc<[Membership]> = rows.into();
        *self.us_members.borrow_mut() = Some(Rc::clone(&rows));
        rows
    }
}
