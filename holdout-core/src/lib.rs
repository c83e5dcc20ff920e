//! Holdout Core — domain types and the event-driven backtest engine.
//!
//! This crate contains:
//! - Domain types (bars, market data, instruments, orders, fills, positions, trades)
//! - Venue cost model (slippage, commission, sell-side tax)
//! - Position tracking with weighted-average cost and pro-rata cost attribution
//! - Signal interpretation with explicit capacity tie-breaks
//! - Bar-by-bar replay producing an equity curve and trade ledger
//!
//! A run is sequential and owns all of its state; there is no I/O and no
//! randomness anywhere in the simulation path.

pub mod domain;
pub mod engine;
pub mod signal;

pub use domain::{
    Bar, DateRange, EquityPoint, Fill, Instrument, InstrumentTable, MarketData, Order,
    OrderSide, Position, TradeRecord,
};
pub use engine::{run_backtest, BacktestConfig, BacktestError, RunResult, VenueProfile};
pub use signal::{Signal, SignalError, SignalFrame, SignalGenerator};
