//! TradeRecord — a closed (fully or partially) round-trip leg.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A closed round-trip leg: entry → exit for `quantity` units.
///
/// A partial sell produces a record for the sold quantity only; the rest of
/// the position stays open. `costs` holds the commission and tax of both
/// legs attributable to this quantity. Slippage is embedded in the entry and
/// exit prices, so `slippage` is reported for attribution and is not
/// subtracted again: `net_pnl = gross_pnl - costs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,

    pub entry_bar: usize,
    pub entry_date: NaiveDate,
    pub entry_price: f64,

    pub exit_bar: usize,
    pub exit_date: NaiveDate,
    pub exit_price: f64,

    pub quantity: u64,

    pub gross_pnl: f64,
    pub costs: f64,
    pub slippage: f64,
    pub net_pnl: f64,

    pub bars_held: usize,
}

impl TradeRecord {
    /// Net return on the capital committed at entry.
    pub fn return_pct(&self) -> f64 {
        let committed = self.entry_price * self.quantity as f64;
        if committed == 0.0 {
            return 0.0;
        }
        self.net_pnl / committed
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// One point of the equity curve, recorded at a bar's close before any
/// orders for that bar are placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub cash: f64,
}
