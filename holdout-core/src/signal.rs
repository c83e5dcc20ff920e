//! Signals and the signal-source seam.
//!
//! A strategy is opaque to the engine: it is anything that maps an
//! instrument's price history to one [`Signal`] per bar. Signals for bar `t`
//! must depend only on bars `0..=t`; the engine cannot check this, it is the
//! generator's contract.

use crate::domain::{Bar, MarketData};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Hold / no-hold decision for one instrument on one bar, with an optional
/// rank used to choose among candidates when capacity is limited.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Signal {
    pub hold: bool,
    pub rank: Option<f64>,
}

impl Signal {
    pub fn hold() -> Self {
        Self {
            hold: true,
            rank: None,
        }
    }

    pub fn flat() -> Self {
        Self::default()
    }

    pub fn ranked(hold: bool, rank: f64) -> Self {
        Self {
            hold,
            rank: Some(rank),
        }
    }
}

impl From<bool> for Signal {
    fn from(hold: bool) -> Self {
        Self { hold, rank: None }
    }
}

/// A strategy: price history in, one signal per bar out.
pub trait SignalGenerator: Send + Sync {
    fn generate(&self, history: &[Bar]) -> Vec<Signal>;

    /// Human-readable name for logs and reports.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> SignalGenerator for F
where
    F: Fn(&[Bar]) -> Vec<Signal> + Send + Sync,
{
    fn generate(&self, history: &[Bar]) -> Vec<Signal> {
        self(history)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("{symbol}: generator returned {got} signals for {expected} bars")]
    LengthMismatch {
        symbol: String,
        expected: usize,
        got: usize,
    },
}

/// Signals for every instrument, aligned one-to-one with that instrument's
/// bars in a [`MarketData`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    signals: BTreeMap<String, Vec<(NaiveDate, Signal)>>,
}

impl SignalFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a symbol's signal series to its bar dates.
    pub fn insert(
        &mut self,
        bars: &[Bar],
        signals: Vec<Signal>,
    ) -> Result<(), SignalError> {
        let Some(first) = bars.first() else {
            return Ok(());
        };
        if signals.len() != bars.len() {
            return Err(SignalError::LengthMismatch {
                symbol: first.symbol.clone(),
                expected: bars.len(),
                got: signals.len(),
            });
        }
        let dated = bars.iter().map(|b| b.date).zip(signals).collect();
        self.signals.insert(first.symbol.clone(), dated);
        Ok(())
    }

    /// Run `generator` over each instrument's full history in `data`.
    pub fn generate(
        generator: &dyn SignalGenerator,
        data: &MarketData,
    ) -> Result<Self, SignalError> {
        let mut frame = Self::new();
        for (_, bars) in data.iter() {
            let signals = generator.generate(bars);
            frame.insert(bars, signals)?;
        }
        Ok(frame)
    }

    /// Build a frame from a per-date closure. Mostly useful in tests.
    pub fn from_fn<F>(data: &MarketData, mut f: F) -> Self
    where
        F: FnMut(&str, NaiveDate) -> Signal,
    {
        let signals = data
            .iter()
            .map(|(sym, bars)| {
                let series = bars.iter().map(|b| (b.date, f(sym, b.date))).collect();
                (sym.to_string(), series)
            })
            .collect();
        Self { signals }
    }

    pub fn get(&self, symbol: &str, date: NaiveDate) -> Option<Signal> {
        let series = self.signals.get(symbol)?;
        series
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| series[i].1)
    }

    /// All signals for `date`, in symbol order.
    pub fn at(&self, date: NaiveDate) -> BTreeMap<String, Signal> {
        self.signals
            .keys()
            .filter_map(|sym| self.get(sym, date).map(|s| (sym.clone(), s)))
            .collect()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    /// Dated signals for one symbol; empty if the symbol is unknown.
    pub fn series(&self, symbol: &str) -> &[(NaiveDate, Signal)] {
        self.signals.get(symbol).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
