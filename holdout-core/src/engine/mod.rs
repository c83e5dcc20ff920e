//! Backtesting engine — bar-by-bar event loop and the components it drives.
//!
//! Per bar, in order: mark to market, record equity, interpret signals into
//! targets, execute toward the targets. See [`backtest`] for the loop.

pub mod backtest;
pub mod cost_model;
pub mod execution;
pub mod signal_interpreter;
pub mod trade_log;
pub mod tracker;

pub use backtest::{
    run_backtest, BacktestConfig, BacktestEngine, BacktestError, EngineState, RunResult,
};
pub use cost_model::{
    buy_cost, compute_fill, max_affordable_quantity, slipped_price, CostError, VenueProfile,
};
pub use execution::{OrderExecutionEngine, SkipReason, SkippedOrder, StepReport};
pub use signal_interpreter::{HoldPolicy, SignalInterpreter, SizingMode, TieBreak};
pub use trade_log::{trade_stats, TradeLogger, TradeStats, PROFIT_FACTOR_CAP};
pub use tracker::{CostTotals, PositionTracker, TrackerError};
