use serde::{Deserialize, Serialize};

/// Order side. The core is long-only, so a sell always reduces an existing
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells: the direction slippage moves the price.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// A market order at the bar's reference price.
///
/// Orders are created and consumed within a single bar; they never rest
/// across bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub reference_price: f64,
}

impl Order {
    pub fn buy(symbol: impl Into<String>, quantity: u64, reference_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            quantity,
            reference_price,
        }
    }

    pub fn sell(symbol: impl Into<String>, quantity: u64, reference_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Sell,
            quantity,
            reference_price,
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.reference_price
    }
}
