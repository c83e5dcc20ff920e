//! Order execution — target quantities to priced, applied fills.
//!
//! Per bar: sells first, then buys, each in symbol order. Buys are clipped to
//! what cash affords at lot granularity. Orders that cannot execute are
//! dropped and reported; they never abort the run.

use crate::domain::{Fill, InstrumentTable, Order, OrderSide};
use crate::engine::cost_model::{compute_fill, max_affordable_quantity, VenueProfile};
use crate::engine::trade_log::TradeLogger;
use crate::engine::tracker::{PositionTracker, TrackerError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Cash-clipped buy rounded below one lot.
    BelowOneLot,
    /// No usable price for the instrument on this bar.
    NoPrice,
    InsufficientCash,
    InsufficientPosition,
    /// Rejected by the cost model.
    InvalidOrder,
}

/// An order the engine wanted to place but did not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedOrder {
    pub symbol: String,
    pub date: NaiveDate,
    pub side: OrderSide,
    pub requested: u64,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub fills: Vec<Fill>,
    pub skipped: Vec<SkippedOrder>,
}

#[derive(Debug, Clone)]
pub struct OrderExecutionEngine {
    venue: VenueProfile,
    instruments: InstrumentTable,
}

impl OrderExecutionEngine {
    pub fn new(venue: VenueProfile, instruments: InstrumentTable) -> Self {
        Self { venue, instruments }
    }

    pub fn venue(&self) -> &VenueProfile {
        &self.venue
    }

    /// Move holdings toward `targets` at this bar's prices.
    ///
    /// Instruments absent from `targets` are left untouched.
    pub fn step(
        &self,
        targets: &BTreeMap<String, u64>,
        prices: &BTreeMap<String, f64>,
        date: NaiveDate,
        bar_index: usize,
        tracker: &mut PositionTracker,
        logger: &mut TradeLogger,
    ) -> StepReport {
        let mut report = StepReport::default();

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for (symbol, &target) in targets {
            let target = self.instruments.get(symbol).round_down(target);
            let held = tracker.quantity(symbol);
            if target < held {
                sells.push((symbol.as_str(), held - target));
            } else if target > held {
                buys.push((symbol.as_str(), target - held));
            }
        }

        for (symbol, quantity) in sells {
            let Some(price) = usable_price(prices, symbol) else {
                report.skip(symbol, date, OrderSide::Sell, quantity, SkipReason::NoPrice, "");
                continue;
            };
            let order = Order::sell(symbol, quantity, price);
            self.execute(&order, date, bar_index, tracker, logger, &mut report);
        }

        for (symbol, wanted) in buys {
            let Some(price) = usable_price(prices, symbol) else {
                report.skip(symbol, date, OrderSide::Buy, wanted, SkipReason::NoPrice, "");
                continue;
            };
            let lot_size = self.instruments.lot_size(symbol);
            let affordable = max_affordable_quantity(tracker.cash(), price, lot_size, &self.venue);
            let quantity = wanted.min(affordable);
            if quantity == 0 {
                debug!(%symbol, %date, wanted, cash = tracker.cash(), "buy below one lot after cash clip");
                report.skip(
                    symbol,
                    date,
                    OrderSide::Buy,
                    wanted,
                    SkipReason::BelowOneLot,
                    "cash covers less than one lot",
                );
                continue;
            }
            if quantity < wanted {
                debug!(%symbol, %date, wanted, quantity, "buy clipped to available cash");
            }
            let order = Order::buy(symbol, quantity, price);
            self.execute(&order, date, bar_index, tracker, logger, &mut report);
        }

        report
    }

    fn execute(
        &self,
        order: &Order,
        date: NaiveDate,
        bar_index: usize,
        tracker: &mut PositionTracker,
        logger: &mut TradeLogger,
        report: &mut StepReport,
    ) {
        let fill = match compute_fill(
            &order.symbol,
            date,
            order.side,
            order.reference_price,
            order.quantity,
            &self.venue,
        ) {
            Ok(fill) => fill,
            Err(e) => {
                warn!(symbol = %order.symbol, %date, error = %e, "order rejected by cost model");
                report.skip_order(order, date, SkipReason::InvalidOrder, e.to_string());
                return;
            }
        };

        match tracker.apply_fill(&fill, bar_index) {
            Ok(closed) => {
                if let Some(trade) = closed {
                    logger.record(trade);
                }
                report.fills.push(fill);
            }
            Err(e) => {
                let reason = match e {
                    TrackerError::InsufficientCash { .. } => SkipReason::InsufficientCash,
                    TrackerError::InsufficientPosition { .. } => SkipReason::InsufficientPosition,
                    TrackerError::MissingPrice { .. } => SkipReason::NoPrice,
                };
                warn!(symbol = %order.symbol, %date, error = %e, "order dropped");
                report.skip_order(order, date, reason, e.to_string());
            }
        }
    }
}

impl StepReport {
    fn skip(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        side: OrderSide,
        requested: u64,
        reason: SkipReason,
        detail: &str,
    ) {
        self.skipped.push(SkippedOrder {
            symbol: symbol.to_string(),
            date,
            side,
            requested,
            reason,
            detail: detail.to_string(),
        });
    }

    fn skip_order(&mut self, order: &Order, date: NaiveDate, reason: SkipReason, detail: String) {
        self.skipped.push(SkippedOrder {
            symbol: order.symbol.clone(),
            date,
            side: order.side,
            requested: order.quantity,
            reason,
            detail,
        });
    }
}

fn usable_price(prices: &BTreeMap<String, f64>, symbol: &str) -> Option<f64> {
    prices
        .get(symbol)
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
}
