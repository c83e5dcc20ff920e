//! Backtest runner — wires signal generation, the engine, and metrics.
//!
//! Two entry points:
//! - `run()`: precomputed signals, used when the caller owns the signal source.
//! - `run_with_generator()`: generates signals from history truncated at the
//!   range end, then runs. Used by the scanner and the walk-forward optimizer.

use holdout_core::engine::RunResult;
use holdout_core::{
    run_backtest, BacktestConfig, BacktestError, DateRange, MarketData, SignalError, SignalFrame,
    SignalGenerator,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::PerformanceMetrics;

#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    #[error("backtest failed: {0}")]
    Backtest(#[from] BacktestError),
    #[error("signal generation failed: {0}")]
    Signal(#[from] SignalError),
}

/// Current schema version for serialized results.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub metrics: PerformanceMetrics,
    pub run: RunResult,
    /// blake3 over the serialized equity curve and trade list.
    pub fingerprint: String,
}

impl BacktestResult {
    pub fn from_run(run: RunResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            metrics: PerformanceMetrics::from_run(&run),
            fingerprint: result_fingerprint(&run),
            run,
        }
    }

    pub fn range(&self) -> DateRange {
        self.run.range
    }
}

/// Content hash of a run's observable output. Equal inputs give equal hashes.
pub fn result_fingerprint(run: &RunResult) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(&run.equity_curve).unwrap_or_default());
    hasher.update(&serde_json::to_vec(&run.trades).unwrap_or_default());
    hasher.update(&serde_json::to_vec(&run.fills).unwrap_or_default());
    hasher.finalize().to_hex().to_string()
}

/// Signals for `range`, generated from bars strictly before `range.end`.
///
/// Warm-up history before `range.start` is visible to the generator; nothing
/// at or after the end is.
pub fn signals_for(
    generator: &dyn SignalGenerator,
    data: &MarketData,
    range: DateRange,
) -> Result<SignalFrame, SignalError> {
    SignalFrame::generate(generator, &data.truncated_before(range.end))
}

/// Run one backtest over `range` with precomputed signals.
pub fn run(
    config: &BacktestConfig,
    data: &MarketData,
    signals: &SignalFrame,
    range: DateRange,
) -> Result<BacktestResult, RunError> {
    let result = run_backtest(config.clone(), data, signals, range)?;
    Ok(BacktestResult::from_run(result))
}

/// Generate signals without look-ahead, then run.
pub fn run_with_generator(
    config: &BacktestConfig,
    data: &MarketData,
    generator: &dyn SignalGenerator,
    range: DateRange,
) -> Result<BacktestResult, RunError> {
    let signals = signals_for(generator, data, range)?;
    run(config, data, &signals, range)
}
