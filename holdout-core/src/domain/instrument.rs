use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Instrument metadata: the minimum tradable increment.
///
/// Lot sizes differ by venue (1 share, 10 shares, 100 shares, ...). Every
/// position quantity the engine holds is an exact multiple of `lot_size`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    pub lot_size: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("instrument {symbol}: lot_size must be >= 1")]
    ZeroLotSize { symbol: String },
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, lot_size: u64) -> Result<Self, InstrumentError> {
        let symbol = symbol.into();
        if lot_size == 0 {
            return Err(InstrumentError::ZeroLotSize { symbol });
        }
        Ok(Self { symbol, lot_size })
    }

    /// Round a share count down to the nearest lot multiple.
    pub fn round_down(&self, quantity: u64) -> u64 {
        (quantity / self.lot_size) * self.lot_size
    }

    /// Largest lot multiple whose value at `price` fits in `notional`.
    pub fn quantity_for_notional(&self, notional: f64, price: f64) -> u64 {
        if !(notional > 0.0) || !(price > 0.0) || !notional.is_finite() {
            return 0;
        }
        let lot_value = price * self.lot_size as f64;
        let lots = (notional / lot_value).floor();
        if lots < 1.0 {
            return 0;
        }
        lots as u64 * self.lot_size
    }

    pub fn is_lot_multiple(&self, quantity: u64) -> bool {
        quantity % self.lot_size == 0
    }
}

/// Lot-size lookup keyed by symbol. Symbols without an entry trade in
/// single units.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstrumentTable {
    instruments: BTreeMap<String, Instrument>,
}

impl InstrumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments
            .insert(instrument.symbol.clone(), instrument);
    }

    pub fn with(mut self, instrument: Instrument) -> Self {
        self.insert(instrument);
        self
    }

    /// Instrument for `symbol`, falling back to a lot size of 1.
    pub fn get(&self, symbol: &str) -> Instrument {
        self.instruments.get(symbol).cloned().unwrap_or(Instrument {
            symbol: symbol.to_string(),
            lot_size: 1,
        })
    }

    pub fn lot_size(&self, symbol: &str) -> u64 {
        self.instruments.get(symbol).map_or(1, |i| i.lot_size)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl FromIterator<Instrument> for InstrumentTable {
    fn from_iter<I: IntoIterator<Item = Instrument>>(iter: I) -> Self {
        let mut table = Self::new();
        for instrument in iter {
            table.insert(instrument);
        }
        table
    }
}
