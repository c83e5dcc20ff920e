use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An open long position.
///
/// `avg_cost` is the quantity-weighted average executed price of all buys
/// since the position was opened. Entry-side fees and slippage not yet
/// attributed to a closed leg are carried in `open_fees` / `open_slippage`
/// and released pro rata as the position is reduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub avg_cost: f64,
    pub entry_date: NaiveDate,
    pub entry_bar: usize,
    pub open_fees: f64,
    pub open_slippage: f64,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        quantity: u64,
        price: f64,
        entry_date: NaiveDate,
        entry_bar: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_cost: price,
            entry_date,
            entry_bar,
            open_fees: 0.0,
            open_slippage: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.avg_cost
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity as f64 * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.quantity as f64 * (current_price - self.avg_cost)
    }

    /// Add to the position, re-weighting the average cost.
    pub fn add(&mut self, quantity: u64, price: f64) {
        let total = self.quantity + quantity;
        if total == 0 {
            return;
        }
        self.avg_cost =
            (self.cost_basis() + quantity as f64 * price) / total as f64;
        self.quantity = total;
    }
}
