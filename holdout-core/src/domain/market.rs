//! Multi-instrument bar container and date ranges.

use super::bar::Bar;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range covering `first..=last`.
    pub fn inclusive(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first,
            end: last + Duration::days(1),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days().max(0)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MarketDataError {
    #[error("bar for {found} stored under symbol {expected}")]
    SymbolMismatch { expected: String, found: String },
    #[error("{symbol}: bars out of order or duplicated at {date}")]
    Unordered { symbol: String, date: NaiveDate },
    #[error("{symbol}: invalid bar at {date}")]
    InsaneBar { symbol: String, date: NaiveDate },
}

/// Bars for every instrument in a study, keyed by symbol.
///
/// Construction validates that each series is strictly ascending by date and
/// contains only sane bars, so the engine can rely on ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    bars: BTreeMap<String, Vec<Bar>>,
}

impl MarketData {
    pub fn new(bars: BTreeMap<String, Vec<Bar>>) -> Result<Self, MarketDataError> {
        for (symbol, series) in &bars {
            let mut prev: Option<NaiveDate> = None;
            for bar in series {
                if &bar.symbol != symbol {
                    return Err(MarketDataError::SymbolMismatch {
                        expected: symbol.clone(),
                        found: bar.symbol.clone(),
                    });
                }
                if prev.is_some_and(|p| bar.date <= p) {
                    return Err(MarketDataError::Unordered {
                        symbol: symbol.clone(),
                        date: bar.date,
                    });
                }
                if !bar.is_sane() {
                    return Err(MarketDataError::InsaneBar {
                        symbol: symbol.clone(),
                        date: bar.date,
                    });
                }
                prev = Some(bar.date);
            }
        }
        Ok(Self { bars })
    }

    /// Group a flat list of bars by symbol (sorting each series by date)
    /// and validate.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Result<Self, MarketDataError> {
        let mut grouped: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            grouped.entry(bar.symbol.clone()).or_default().push(bar);
        }
        for series in grouped.values_mut() {
            series.sort_by_key(|b| b.date);
        }
        Self::new(grouped)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    pub fn series(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars.get(symbol).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Bar])> {
        self.bars.iter().map(|(s, b)| (s.as_str(), b.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.bars.values().all(Vec::is_empty)
    }

    /// Bar for `symbol` on `date`, if the instrument traded that day.
    pub fn bar_on(&self, symbol: &str, date: NaiveDate) -> Option<&Bar> {
        let series = self.bars.get(symbol)?;
        series
            .binary_search_by_key(&date, |b| b.date)
            .ok()
            .map(|i| &series[i])
    }

    /// Index of `date` in the symbol's series.
    pub fn index_of(&self, symbol: &str, date: NaiveDate) -> Option<usize> {
        self.bars
            .get(symbol)?
            .binary_search_by_key(&date, |b| b.date)
            .ok()
    }

    /// Sorted union of all bar dates: the trading calendar.
    pub fn calendar(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self
            .bars
            .values()
            .flat_map(|series| series.iter().map(|b| b.date))
            .collect();
        dates.into_iter().collect()
    }

    /// Trading calendar restricted to `range`.
    pub fn calendar_in(&self, range: DateRange) -> Vec<NaiveDate> {
        self.calendar()
            .into_iter()
            .filter(|d| range.contains(*d))
            .collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.values().filter_map(|s| s.first()).map(|b| b.date).min()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.values().filter_map(|s| s.last()).map(|b| b.date).max()
    }

    /// Copy containing only bars strictly before `end`.
    ///
    /// Signal generators see this history so that nothing at or after the
    /// end of an evaluation range can leak into its signals.
    pub fn truncated_before(&self, end: NaiveDate) -> Self {
        let bars = self
            .bars
            .iter()
            .map(|(sym, series)| {
                let cut = series.partition_point(|b| b.date < end);
                (sym.clone(), series[..cut].to_vec())
            })
            .collect();
        Self { bars }
    }

    /// Copy containing only bars inside `range`.
    pub fn slice(&self, range: DateRange) -> Self {
        let bars = self
            .bars
            .iter()
            .map(|(sym, series)| {
                let lo = series.partition_point(|b| b.date < range.start);
                let hi = series.partition_point(|b| b.date < range.end);
                (sym.clone(), series[lo..hi.max(lo)].to_vec())
            })
            .collect();
        Self { bars }
    }
}
