//! Position tracker — cash, holdings, realized P&L and accumulated costs.
//!
//! The accounting identity holds after every fill:
//! `portfolio_value == cash + sum(quantity * price)`.

use crate::domain::{Fill, OrderSide, Position, TradeRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TrackerError {
    #[error("{symbol}: insufficient cash on {date}: need {required:.2}, have {available:.2}")]
    InsufficientCash {
        symbol: String,
        date: NaiveDate,
        required: f64,
        available: f64,
    },
    #[error("{symbol}: insufficient position on {date}: sell {requested}, held {held}")]
    InsufficientPosition {
        symbol: String,
        date: NaiveDate,
        requested: u64,
        held: u64,
    },
    #[error("{symbol}: no price to mark open position")]
    MissingPrice { symbol: String },
}

/// Cumulative friction paid over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    pub commission: f64,
    pub tax: f64,
    pub slippage: f64,
}

impl CostTotals {
    pub fn total(&self) -> f64 {
        self.commission + self.tax + self.slippage
    }

    fn add(&mut self, fill: &Fill) {
        self.commission += fill.commission;
        self.tax += fill.tax;
        self.slippage += fill.slippage;
    }
}

/// Cash and holdings for one backtest run. Owned by exactly one engine.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    initial_cash: f64,
    cash: f64,
    positions: BTreeMap<String, Position>,
    realized_pnl: f64,
    costs: CostTotals,
}

impl PositionTracker {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            positions: BTreeMap::new(),
            realized_pnl: 0.0,
            costs: CostTotals::default(),
        }
    }

    /// Apply a fill. A sell returns the closed leg as a [`TradeRecord`].
    ///
    /// On error nothing is mutated.
    pub fn apply_fill(
        &mut self,
        fill: &Fill,
        bar_index: usize,
    ) -> Result<Option<TradeRecord>, TrackerError> {
        match fill.side {
            OrderSide::Buy => {
                self.apply_buy(fill, bar_index)?;
                Ok(None)
            }
            OrderSide::Sell => self.apply_sell(fill, bar_index).map(Some),
        }
    }

    fn apply_buy(&mut self, fill: &Fill, bar_index: usize) -> Result<(), TrackerError> {
        let required = -fill.net_cash_delta;
        if required > self.cash {
            return Err(TrackerError::InsufficientCash {
                symbol: fill.symbol.clone(),
                date: fill.date,
                required,
                available: self.cash,
            });
        }

        self.cash += fill.net_cash_delta;
        self.costs.add(fill);

        let position = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| {
                Position::open(&fill.symbol, 0, fill.executed_price, fill.date, bar_index)
            });
        position.add(fill.quantity, fill.executed_price);
        position.open_fees += fill.fees();
        position.open_slippage += fill.slippage;
        Ok(())
    }

    fn apply_sell(&mut self, fill: &Fill, bar_index: usize) -> Result<TradeRecord, TrackerError> {
        let held = self.quantity(&fill.symbol);
        if fill.quantity > held {
            return Err(TrackerError::InsufficientPosition {
                symbol: fill.symbol.clone(),
                date: fill.date,
                requested: fill.quantity,
                held,
            });
        }
        let Some(position) = self.positions.get_mut(&fill.symbol) else {
            // held > 0 implies an entry exists
            return Err(TrackerError::InsufficientPosition {
                symbol: fill.symbol.clone(),
                date: fill.date,
                requested: fill.quantity,
                held: 0,
            });
        };

        let fraction = fill.quantity as f64 / position.quantity as f64;
        let entry_fees = position.open_fees * fraction;
        let entry_slippage = position.open_slippage * fraction;
        let qty = fill.quantity as f64;

        let gross_pnl = (fill.executed_price - position.avg_cost) * qty;
        let costs = entry_fees + fill.fees();
        let net_pnl = gross_pnl - costs;

        let record = TradeRecord {
            symbol: fill.symbol.clone(),
            entry_bar: position.entry_bar,
            entry_date: position.entry_date,
            entry_price: position.avg_cost,
            exit_bar: bar_index,
            exit_date: fill.date,
            exit_price: fill.executed_price,
            quantity: fill.quantity,
            gross_pnl,
            costs,
            slippage: entry_slippage + fill.slippage,
            net_pnl,
            bars_held: bar_index.saturating_sub(position.entry_bar),
        };

        position.quantity -= fill.quantity;
        position.open_fees -= entry_fees;
        position.open_slippage -= entry_slippage;
        if position.is_flat() {
            self.positions.remove(&fill.symbol);
        }

        self.cash += fill.net_cash_delta;
        self.realized_pnl += net_pnl;
        self.costs.add(fill);
        Ok(record)
    }

    /// Unrealized P&L against average cost. Positions without a price are
    /// valued at cost (zero unrealized).
    pub fn unrealized_pnl(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .iter()
            .map(|(sym, pos)| {
                prices
                    .get(sym)
                    .map_or(0.0, |&price| pos.unrealized_pnl(price))
            })
            .sum()
    }

    /// Cash plus market value of every position. Every held symbol must have
    /// a price.
    pub fn portfolio_value(&self, prices: &BTreeMap<String, f64>) -> Result<f64, TrackerError> {
        let mut value = self.cash;
        for (sym, pos) in &self.positions {
            let price = prices.get(sym).ok_or_else(|| TrackerError::MissingPrice {
                symbol: sym.clone(),
            })?;
            value += pos.market_value(*price);
        }
        Ok(value)
    }

    pub fn quantity(&self, symbol: &str) -> u64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    /// Current holdings as symbol → quantity.
    pub fn holdings(&self) -> BTreeMap<String, u64> {
        self.positions
            .iter()
            .map(|(sym, pos)| (sym.clone(), pos.quantity))
            .collect()
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn costs(&self) -> CostTotals {
        self.costs
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }
}
