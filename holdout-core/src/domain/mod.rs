//! Domain types for the backtest engine.

pub mod bar;
pub mod fill;
pub mod instrument;
pub mod market;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use fill::Fill;
pub use instrument::{Instrument, InstrumentError, InstrumentTable};
pub use market::{DateRange, MarketData, MarketDataError};
pub use order::{Order, OrderSide};
pub use position::Position;
pub use trade::{EquityPoint, TradeRecord};

/// Symbol type alias
pub type Symbol = String;
