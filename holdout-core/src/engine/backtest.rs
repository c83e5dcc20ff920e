//! Backtest engine — bar-by-bar replay over a date range.
//!
//! Each calendar date T in the range, ascending:
//! 1. mark holdings to market at T's closes
//! 2. append an [`EquityPoint`]
//! 3. interpret T's signals into target quantities
//! 4. execute toward the targets at T's closes
//!
//! The final bar runs all four steps like any other. Costs paid on it land
//! after the last equity point, so `final_cash` and `final_value` are taken
//! once that step is done. Positions still open at the end are marked at the
//! final close and reported, not liquidated.

use crate::domain::{
    DateRange, EquityPoint, Fill, InstrumentTable, MarketData, Position, TradeRecord,
};
use crate::engine::cost_model::VenueProfile;
use crate::engine::execution::{OrderExecutionEngine, SkippedOrder};
use crate::engine::signal_interpreter::{SignalInterpreter, SizingMode};
use crate::engine::trade_log::{TradeLogger, TradeStats};
use crate::engine::tracker::{CostTotals, PositionTracker, TrackerError};
use crate::signal::SignalFrame;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum BacktestError {
    #[error("{symbol}: no bar on {date} to mark an open position")]
    DataGap { symbol: String, date: NaiveDate },
    #[error("no bars in {range}")]
    EmptyRange { range: DateRange },
    #[error("{symbol}: signal on {date} has no matching bar")]
    SignalMisaligned { symbol: String, date: NaiveDate },
    #[error("engine is {state:?}; run() requires Ready")]
    InvalidState { state: EngineState },
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Ready,
    Running,
    Finished,
    Failed,
}

/// Everything that parameterizes a run apart from data and signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub venue: VenueProfile,
    pub instruments: InstrumentTable,
    pub interpreter: SignalInterpreter,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            venue: VenueProfile::default(),
            instruments: InstrumentTable::new(),
            interpreter: SignalInterpreter::default(),
        }
    }
}

impl BacktestConfig {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            ..Self::default()
        }
    }

    pub fn with_venue(mut self, venue: VenueProfile) -> Self {
        self.venue = venue;
        self
    }

    pub fn with_instruments(mut self, instruments: InstrumentTable) -> Self {
        self.instruments = instruments;
        self
    }

    pub fn with_interpreter(mut self, interpreter: SignalInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(BacktestError::InvalidConfig {
                reason: format!("initial_cash must be positive, got {}", self.initial_cash),
            });
        }
        if self.interpreter.max_positions == 0 {
            return Err(BacktestError::InvalidConfig {
                reason: "max_positions must be >= 1".into(),
            });
        }
        if let SizingMode::FixedFraction(f) = self.interpreter.sizing {
            if !f.is_finite() || f <= 0.0 || f > 1.0 {
                return Err(BacktestError::InvalidConfig {
                    reason: format!("fixed fraction must be in (0, 1], got {f}"),
                });
            }
        }
        self.venue
            .validate()
            .map_err(|e| BacktestError::InvalidConfig {
                reason: e.to_string(),
            })
    }
}

/// Output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub range: DateRange,
    pub initial_cash: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub fills: Vec<Fill>,
    pub skipped: Vec<SkippedOrder>,
    /// Positions still open after the final bar, marked at its close.
    pub open_positions: Vec<Position>,
    pub final_cash: f64,
    pub final_value: f64,
    pub costs: CostTotals,
    pub trade_stats: TradeStats,
}

impl RunResult {
    pub fn total_costs(&self) -> f64 {
        self.costs.total()
    }

    pub fn bar_count(&self) -> usize {
        self.equity_curve.len()
    }
}

/// One run over one range. Single-use: a second `run()` is an error.
pub struct BacktestEngine<'a> {
    data: &'a MarketData,
    signals: &'a SignalFrame,
    range: DateRange,
    initial_cash: f64,
    interpreter: SignalInterpreter,
    instruments: InstrumentTable,
    executor: OrderExecutionEngine,
    tracker: PositionTracker,
    logger: TradeLogger,
    state: EngineState,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(
        config: BacktestConfig,
        data: &'a MarketData,
        signals: &'a SignalFrame,
        range: DateRange,
    ) -> Result<Self, BacktestError> {
        config.validate()?;
        Ok(Self {
            data,
            signals,
            range,
            initial_cash: config.initial_cash,
            interpreter: config.interpreter,
            executor: OrderExecutionEngine::new(config.venue, config.instruments.clone()),
            instruments: config.instruments,
            tracker: PositionTracker::new(config.initial_cash),
            logger: TradeLogger::new(),
            state: EngineState::Ready,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn run(&mut self) -> Result<RunResult, BacktestError> {
        if self.state != EngineState::Ready {
            return Err(BacktestError::InvalidState { state: self.state });
        }
        self.state = EngineState::Running;
        match self.replay() {
            Ok(result) => {
                self.state = EngineState::Finished;
                Ok(result)
            }
            Err(e) => {
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    fn replay(&mut self) -> Result<RunResult, BacktestError> {
        let calendar = self.data.calendar_in(self.range);
        let Some(&last_date) = calendar.last() else {
            return Err(BacktestError::EmptyRange { range: self.range });
        };
        self.check_signal_alignment()?;

        info!(
            range = %self.range,
            bars = calendar.len(),
            venue = %self.executor.venue().name,
            "backtest started"
        );

        let mut equity_curve = Vec::with_capacity(calendar.len());
        let mut fills = Vec::new();
        let mut skipped = Vec::new();
        let mut final_prices = BTreeMap::new();

        for (bar_index, &date) in calendar.iter().enumerate() {
            let prices = self.closes_on(date);
            let value = self.mark_to_market(&prices, date)?;
            equity_curve.push(EquityPoint {
                date,
                value,
                cash: self.tracker.cash(),
            });

            let targets = self.interpreter.target_positions(
                &self.signals.at(date),
                &self.tracker.holdings(),
                &prices,
                &self.instruments,
                value,
            );
            let report = self.executor.step(
                &targets,
                &prices,
                date,
                bar_index,
                &mut self.tracker,
                &mut self.logger,
            );
            if !report.fills.is_empty() {
                debug!(%date, fills = report.fills.len(), "bar executed");
            }
            fills.extend(report.fills);
            skipped.extend(report.skipped);
            final_prices = prices;
        }

        let final_value = self.mark_to_market(&final_prices, last_date)?;
        let open_positions: Vec<Position> = self.tracker.positions().values().cloned().collect();
        let logger = std::mem::take(&mut self.logger);
        let trade_stats = logger.stats();

        info!(
            range = %self.range,
            final_value,
            trades = logger.len(),
            open = open_positions.len(),
            unrealized = self.tracker.unrealized_pnl(&final_prices),
            "backtest finished"
        );

        Ok(RunResult {
            range: self.range,
            initial_cash: self.initial_cash,
            equity_curve,
            trades: logger.into_trades(),
            fills,
            skipped,
            open_positions,
            final_cash: self.tracker.cash(),
            final_value,
            costs: self.tracker.costs(),
            trade_stats,
        })
    }

    fn closes_on(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.data
            .symbols()
            .filter_map(|sym| self.data.bar_on(sym, date).map(|b| (sym.to_string(), b.close)))
            .collect()
    }

    fn mark_to_market(
        &self,
        prices: &BTreeMap<String, f64>,
        date: NaiveDate,
    ) -> Result<f64, BacktestError> {
        self.tracker
            .portfolio_value(prices)
            .map_err(|e| match e {
                TrackerError::MissingPrice { symbol } => BacktestError::DataGap { symbol, date },
                other => BacktestError::InvalidConfig {
                    reason: other.to_string(),
                },
            })
    }

    /// Every in-range signal must sit on a bar of the same instrument.
    fn check_signal_alignment(&self) -> Result<(), BacktestError> {
        for symbol in self.signals.symbols() {
            for (date, _) in self.signals.series(symbol) {
                if self.range.contains(*date) && self.data.bar_on(symbol, *date).is_none() {
                    return Err(BacktestError::SignalMisaligned {
                        symbol: symbol.to_string(),
                        date: *date,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Build an engine and run it once.
pub fn run_backtest(
    config: BacktestConfig,
    data: &MarketData,
    signals: &SignalFrame,
    range: DateRange,
) -> Result<RunResult, BacktestError> {
    BacktestEngine::new(config, data, signals, range)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::signal::Signal;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn data(closes: &[f64]) -> MarketData {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::flat("A", d(i as u32 + 1), c, 1_000));
        MarketData::from_bars(bars).unwrap()
    }

    fn full_range(data: &MarketData) -> DateRange {
        DateRange::inclusive(data.first_date().unwrap(), data.last_date().unwrap())
    }

    #[test]
    fn state_machine_ready_to_finished() {
        let data = data(&[10.0, 11.0, 12.0]);
        let signals = SignalFrame::from_fn(&data, |_, _| Signal::hold());
        let mut engine =
            BacktestEngine::new(BacktestConfig::new(1_000.0), &data, &signals, full_range(&data))
                .unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        let result = engine.run().unwrap();
        assert_eq!(engine.state(), EngineState::Finished);
        assert_eq!(result.equity_curve.len(), 3);

        assert_eq!(
            engine.run(),
            Err(BacktestError::InvalidState {
                state: EngineState::Finished
            })
        );
    }

    #[test]
    fn empty_range_fails() {
        let data = data(&[10.0, 11.0]);
        let signals = SignalFrame::new();
        let range = DateRange::new(d(20), d(25));
        let mut engine =
            BacktestEngine::new(BacktestConfig::new(1_000.0), &data, &signals, range).unwrap();
        assert_eq!(engine.run(), Err(BacktestError::EmptyRange { range }));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[test]
    fn final_bar_signals_execute() {
        let data = data(&[10.0, 10.0]);
        let signals = SignalFrame::from_fn(&data, |_, date| Signal::from(date == d(2)));
        let result =
            run_backtest(BacktestConfig::new(1_000.0), &data, &signals, full_range(&data)).unwrap();
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].date, d(2));
        assert_eq!(result.open_positions.len(), 1);
        assert_eq!(result.final_cash, 0.0);
        assert_eq!(result.final_value, 1_000.0);
    }

    #[test]
    fn final_bar_costs_land_after_last_equity_point() {
        let data = data(&[10.0, 10.0, 10.0]);
        let signals = SignalFrame::from_fn(&data, |_, date| Signal::from(date < d(3)));
        let config = BacktestConfig::new(1_000.0).with_venue(VenueProfile::new("fee", 0.01, 0.0, 0.0));
        let result = run_backtest(config, &data, &signals, full_range(&data)).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_date, d(3));
        let last_point = result.equity_curve.last().unwrap().value;
        assert!(result.final_value < last_point);
        assert_eq!(result.final_value, result.final_cash);
    }

    #[test]
    fn open_positions_reported_at_end() {
        let data = data(&[10.0, 12.0, 15.0]);
        let signals = SignalFrame::from_fn(&data, |_, _| Signal::hold());
        let result =
            run_backtest(BacktestConfig::new(1_000.0), &data, &signals, full_range(&data)).unwrap();
        assert_eq!(result.open_positions.len(), 1);
        assert_eq!(result.open_positions[0].quantity, 100);
        assert!(result.trades.is_empty());
        assert_eq!(result.final_value, 1_500.0);
        assert_eq!(result.final_cash, 0.0);
    }

    #[test]
    fn data_gap_for_open_position_is_fatal() {
        let mut bars: Vec<Bar> = [1, 2, 4]
            .iter()
            .map(|&day| Bar::flat("A", d(day), 10.0, 100))
            .collect();
        bars.push(Bar::flat("B", d(3), 5.0, 100));
        let data = MarketData::from_bars(bars).unwrap();
        let signals = SignalFrame::from_fn(&data, |_, _| Signal::hold());
        let config = BacktestConfig::new(1_000.0)
            .with_interpreter(SignalInterpreter::new(SizingMode::Shares(10), 1));
        let err = run_backtest(config, &data, &signals, full_range(&data)).unwrap_err();
        assert_eq!(
            err,
            BacktestError::DataGap {
                symbol: "A".into(),
                date: d(3)
            }
        );
    }

    #[test]
    fn misaligned_signals_rejected() {
        let data = data(&[10.0, 11.0]);
        let other = MarketData::from_bars([Bar::flat("A", d(9), 1.0, 1)]).unwrap();
        let signals = SignalFrame::from_fn(&other, |_, _| Signal::hold());
        let range = DateRange::new(d(1), d(10));
        let err = run_backtest(BacktestConfig::new(1_000.0), &data, &signals, range).unwrap_err();
        assert!(matches!(err, BacktestError::SignalMisaligned { .. }));
    }

    #[test]
    fn invalid_config_rejected() {
        let data = data(&[10.0]);
        let signals = SignalFrame::new();
        for config in [
            BacktestConfig::new(0.0),
            BacktestConfig::new(100.0)
                .with_interpreter(SignalInterpreter::new(SizingMode::EqualWeight, 0)),
            BacktestConfig::new(100.0)
                .with_interpreter(SignalInterpreter::new(SizingMode::FixedFraction(1.5), 1)),
            BacktestConfig::new(100.0).with_venue(VenueProfile::new("bad", 0.0, -1.0, 0.0)),
        ] {
            let err = BacktestEngine::new(config, &data, &signals, full_range(&data)).err();
            assert!(matches!(err, Some(BacktestError::InvalidConfig { .. })));
        }
    }
}
