//! Membership tables used to resolve a point-in-time universe.

use crate::domain::error::QuantError;
use crate::domain::market::Market;
use chrono::NaiveDate;

/// One constituency interval: the symbol is a member on `[start_date, end_date)`.
/// An unset bound is open on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Membership {
    pub fn covers(&self, as_of: NaiveDate) -> bool {
        self.start_date.is_none_or(|s| s <= as_of) && self.end_date.is_none_or(|e| as_of < e)
    }
}

pub trait UniversePort {
    /// Members of the latest snapshot taken on or before `as_of`, newest first.
    fn snapshot_members(&self, market: Market, as_of: NaiveDate)
    -> Result<Vec<String>, QuantError>;

    /// Distinct symbols that have at least one bar dated on or before `as_of`,
    /// most recently traded first, at most `limit`.
    fn symbols_with_bars(
        &self,
        market: Market,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<String>, QuantError>;

    /// Today's membership list, with no date awareness.
    fn current_members(&self, market: Market) -> Result<Vec<String>, QuantError>;

    /// Full constituency history with validity intervals.
    fn membership_history(&self, market: Market) -> Result<Vec<Membership>, QuantError>;
}
