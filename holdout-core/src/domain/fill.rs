use crate::domain::order::OrderSide;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Economics of an executed order, as priced by the cost model.
///
/// `net_cash_delta` is the signed change to cash: negative for buys
/// (notional plus commission), positive for sells (notional minus commission
/// and tax). Slippage is already inside `executed_price`; the `slippage`
/// field reports its currency amount for attribution only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: OrderSide,
    pub date: NaiveDate,
    pub quantity: u64,
    pub reference_price: f64,
    pub executed_price: f64,
    pub commission: f64,
    pub tax: f64,
    pub slippage: f64,
    pub net_cash_delta: f64,
}

impl Fill {
    /// Notional at the executed price.
    pub fn notional(&self) -> f64 {
        self.executed_price * self.quantity as f64
    }

    /// All friction attributable to this fill: commission + tax + slippage.
    pub fn total_cost(&self) -> f64 {
        self.commission + self.tax + self.slippage
    }

    /// Explicit fees (commission + tax), excluding slippage which is
    /// embedded in the price.
    pub fn fees(&self) -> f64 {
        self.commission + self.tax
    }
}
