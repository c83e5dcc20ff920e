//! Cost model — slippage, commission and transaction tax.
//!
//! Applied in order:
//! 1. slippage in basis points against the trader (buyers pay more, sellers receive less)
//! 2. commission as a rate on the executed notional, both sides
//! 3. transaction tax as a rate on the executed notional, sells only
//!
//! Everything here is a pure function of its arguments so that venues can be
//! swapped per market and tested in isolation.

use crate::domain::{Fill, OrderSide};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-venue friction parameters, supplied by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueProfile {
    pub name: String,
    /// Commission as a fraction of notional (0.00015 = 1.5 bps).
    pub commission_rate: f64,
    /// Sell-side transaction tax as a fraction of notional.
    pub tax_rate: f64,
    /// Slippage in basis points, applied directionally.
    pub slippage_bps: f64,
}

impl Default for VenueProfile {
    fn default() -> Self {
        Self::frictionless()
    }
}

impl VenueProfile {
    pub fn new(
        name: impl Into<String>,
        commission_rate: f64,
        tax_rate: f64,
        slippage_bps: f64,
    ) -> Self {
        Self {
            name: name.into(),
            commission_rate,
            tax_rate,
            slippage_bps,
        }
    }

    pub fn frictionless() -> Self {
        Self::new("frictionless", 0.0, 0.0, 0.0)
    }

    /// US listed equities: commission-free brokerage, no transfer tax.
    pub fn us_equity() -> Self {
        Self::new("us_equity", 0.0, 0.0, 5.0)
    }

    /// Korean listed equities: brokerage commission both sides, securities
    /// transaction tax on sells.
    pub fn krx_equity() -> Self {
        Self::new("krx_equity", 0.00015, 0.0018, 10.0)
    }

    pub fn is_frictionless(&self) -> bool {
        self.commission_rate == 0.0 && self.tax_rate == 0.0 && self.slippage_bps == 0.0
    }

    /// Reject negative or non-finite parameters.
    pub fn validate(&self) -> Result<(), CostError> {
        for (field, value) in [
            ("commission_rate", self.commission_rate),
            ("tax_rate", self.tax_rate),
            ("slippage_bps", self.slippage_bps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CostError::InvalidProfile {
                    venue: self.name.clone(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    #[error("{symbol}: zero-quantity {side:?} order on {date}")]
    ZeroQuantity {
        symbol: String,
        side: OrderSide,
        date: NaiveDate,
    },
    #[error("{symbol}: invalid reference price {price} on {date}")]
    InvalidPrice {
        symbol: String,
        price: f64,
        date: NaiveDate,
    },
    #[error("venue {venue}: {field} = {value} must be finite and non-negative")]
    InvalidProfile {
        venue: String,
        field: &'static str,
        value: f64,
    },
}

/// Price with slippage applied against the trader.
pub fn slipped_price(side: OrderSide, reference_price: f64, slippage_bps: f64) -> f64 {
    reference_price * (1.0 + side.sign() * slippage_bps / 10_000.0)
}

/// Price an order: executed price and itemized costs.
pub fn compute_fill(
    symbol: &str,
    date: NaiveDate,
    side: OrderSide,
    reference_price: f64,
    quantity: u64,
    venue: &VenueProfile,
) -> Result<Fill, CostError> {
    if quantity == 0 {
        return Err(CostError::ZeroQuantity {
            symbol: symbol.to_string(),
            side,
            date,
        });
    }
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return Err(CostError::InvalidPrice {
            symbol: symbol.to_string(),
            price: reference_price,
            date,
        });
    }

    let qty = quantity as f64;
    let executed_price = slipped_price(side, reference_price, venue.slippage_bps);
    let slippage = (executed_price - reference_price).abs() * qty;
    let notional = executed_price * qty;
    let commission = notional * venue.commission_rate;
    let tax = match side {
        OrderSide::Buy => 0.0,
        OrderSide::Sell => notional * venue.tax_rate,
    };
    let net_cash_delta = match side {
        OrderSide::Buy => -(notional + commission),
        OrderSide::Sell => notional - commission - tax,
    };

    Ok(Fill {
        symbol: symbol.to_string(),
        side,
        date,
        quantity,
        reference_price,
        executed_price,
        commission,
        tax,
        slippage,
        net_cash_delta,
    })
}

/// Cash required to buy `quantity` at `reference_price`, costs included.
pub fn buy_cost(reference_price: f64, quantity: u64, venue: &VenueProfile) -> f64 {
    let notional = slipped_price(OrderSide::Buy, reference_price, venue.slippage_bps)
        * quantity as f64;
    notional * (1.0 + venue.commission_rate)
}

/// Largest lot multiple whose buy cost fits in `cash`.
pub fn max_affordable_quantity(
    cash: f64,
    reference_price: f64,
    lot_size: u64,
    venue: &VenueProfile,
) -> u64 {
    let lot_size = lot_size.max(1);
    if !(cash > 0.0) || !(reference_price > 0.0) || !cash.is_finite() {
        return 0;
    }
    let lot_cost = buy_cost(reference_price, lot_size, venue);
    let mut lots = (cash / lot_cost).floor() as u64;
    // Float rounding can overshoot by one lot at the boundary.
    while lots > 0 && buy_cost(reference_price, lots * lot_size, venue) > cash {
        lots -= 1;
    }
    lots * lot_size
}
