//! Walk-forward optimization — train/test windows, per-window scan, OOS re-run.
//!
//! Windows are built from calendar-day lengths:
//! - rolling: `train = [start + i·step, +train_days)`
//! - anchored: `train = [start, start + train_days + i·step)`
//!
//! In both modes `test = [train_end, train_end + test_days)`, and windows are
//! produced while `test_end <= end`.
//!
//! Every (window, combination) train unit runs in one flat parallel map; the
//! winning set per window is then re-run on its test range in a second map.
//! Nothing is merged until a unit has fully completed.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use holdout_core::{BacktestConfig, DateRange, MarketData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::fitness::FitnessMetric;
use crate::metrics::{mean, PerformanceMetrics};
use crate::overfitting::consistency;
use crate::params::{GridError, ParamGrid, ParamSet};
use crate::runner::RunError;
use crate::scanner::{best_index, ParameterScanner, ParameterSearchResult, ScanError, SignalGeneratorFactory};
use crate::sensitivity::{self, SensitivityReport};
use crate::stats::{one_sided_t_test, TTest};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Train window length in calendar days (default 252).
    pub train_days: i64,
    /// Test window length in calendar days (default 63).
    pub test_days: i64,
    /// Offset between consecutive windows (default 63).
    pub step_days: i64,
    /// Grow the train window from a fixed start instead of sliding it.
    pub anchored: bool,
    pub metric: FitnessMetric,
    /// Worker threads; 0 lets rayon pick one per core.
    pub workers: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_days: 252,
            test_days: 63,
            step_days: 63,
            anchored: false,
            metric: FitnessMetric::Sharpe,
            workers: 0,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum WalkForwardError {
    #[error("invalid window lengths: {reason}")]
    InvalidWindowSpec { reason: String },
    #[error("no window fits between {start} and {end}")]
    NoWindows { start: NaiveDate, end: NaiveDate },
    #[error("invalid parameter grid: {0}")]
    InvalidParameterGrid(#[from] GridError),
    #[error("window {window}: train scan failed: {source}")]
    Scan {
        window: usize,
        #[source]
        source: ScanError,
    },
    #[error("window {window}: test run for [{params}] failed: {source}")]
    Backtest {
        window: usize,
        params: ParamSet,
        #[source]
        source: RunError,
    },
    #[error("walk-forward cancelled")]
    Cancelled,
    #[error("optimizer is {state:?}; {action} not allowed")]
    InvalidState {
        state: OptimizerState,
        action: &'static str,
    },
}

// ─── Windows ─────────────────────────────────────────────────────────

/// One (train, test) pair. `train.end == test.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub id: usize,
    pub train: DateRange,
    pub test: DateRange,
}

impl WalkForwardWindow {
    pub fn train_start(&self) -> NaiveDate {
        self.train.start
    }

    pub fn train_end(&self) -> NaiveDate {
        self.train.end
    }

    pub fn test_start(&self) -> NaiveDate {
        self.test.start
    }

    pub fn test_end(&self) -> NaiveDate {
        self.test.end
    }
}

pub fn create_windows(
    start: NaiveDate,
    end: NaiveDate,
    train_days: i64,
    test_days: i64,
    step_days: i64,
    anchored: bool,
) -> Result<Vec<WalkForwardWindow>, WalkForwardError> {
    for (name, value) in [("train_days", train_days), ("test_days", test_days), ("step_days", step_days)] {
        if value <= 0 {
            return Err(WalkForwardError::InvalidWindowSpec {
                reason: format!("{name} must be positive, got {value}"),
            });
        }
    }
    if end <= start {
        return Err(WalkForwardError::InvalidWindowSpec {
            reason: format!("end {end} is not after start {start}"),
        });
    }

    let mut windows = Vec::new();
    for i in 0.. {
        let offset = Duration::days(step_days * i as i64);
        let (train_start, train_end) = if anchored {
            (start, start + Duration::days(train_days) + offset)
        } else {
            let s = start + offset;
            (s, s + Duration::days(train_days))
        };
        let test_end = train_end + Duration::days(test_days);
        if test_end > end {
            break;
        }
        windows.push(WalkForwardWindow {
            id: i,
            train: DateRange::new(train_start, train_end),
            test: DateRange::new(train_end, test_end),
        });
    }

    if windows.is_empty() {
        return Err(WalkForwardError::NoWindows { start, end });
    }
    Ok(windows)
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    pub best_params: ParamSet,
    pub in_sample: PerformanceMetrics,
    pub out_of_sample: PerformanceMetrics,
    pub in_sample_score: f64,
    pub out_of_sample_score: f64,
    /// Combinations evaluated on the train range.
    pub candidates: usize,
    /// Relative score drop from the winner to its grid neighbours.
    pub sensitivity: f64,
}

/// How `best_params` was chosen across windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionProvenance {
    /// Windows (by id) whose winner was `best_params`.
    pub selected_in: Vec<usize>,
    /// Number of windows that selected it.
    pub frequency: usize,
    /// True if another set was selected equally often; the latest window's
    /// choice among the tied sets was kept.
    pub tied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub config: WalkForwardConfig,
    pub windows: Vec<WindowResult>,
    /// Most frequently selected set; ties go to the latest window.
    pub best_params: ParamSet,
    pub selection: SelectionProvenance,
    pub mean_in_sample: f64,
    pub mean_out_of_sample: f64,
    /// `(IS - OOS) / IS`; `None` when the in-sample mean is not positive.
    pub degradation: Option<f64>,
    pub robustness: Option<f64>,
    pub consistency: f64,
    pub param_sensitivity: f64,
    pub axis_sensitivity: BTreeMap<String, f64>,
    pub t_test: Option<TTest>,
}

impl WalkForwardResult {
    pub fn in_sample_scores(&self) -> Vec<f64> {
        self.windows.iter().map(|w| w.in_sample_score).collect()
    }

    pub fn out_of_sample_scores(&self) -> Vec<f64> {
        self.windows.iter().map(|w| w.out_of_sample_score).collect()
    }
}

/// `(is - oos) / is`, or `None` when `is` is not a usable baseline.
pub fn degradation(in_sample: f64, out_of_sample: f64) -> Option<f64> {
    if !in_sample.is_finite() || !out_of_sample.is_finite() || in_sample <= 0.0 {
        return None;
    }
    Some((in_sample - out_of_sample) / in_sample)
}

/// `(1 - min(deg, 1)) × consistency`. Negative degradation (out-of-sample
/// beating in-sample) lifts the score above `consistency`.
pub fn robustness(degradation: f64, consistency: f64) -> f64 {
    (1.0 - degradation.min(1.0)) * consistency
}

fn select_best_params(windows: &[WindowResult]) -> (ParamSet, SelectionProvenance) {
    // fingerprint -> (params, window ids)
    let mut tally: BTreeMap<String, (ParamSet, Vec<usize>)> = BTreeMap::new();
    for w in windows {
        tally
            .entry(w.best_params.fingerprint())
            .or_insert_with(|| (w.best_params.clone(), Vec::new()))
            .1
            .push(w.window.id);
    }
    let top = tally.values().map(|(_, ids)| ids.len()).max().unwrap_or(0);
    let tied_sets = tally.values().filter(|(_, ids)| ids.len() == top).count();
    let winner = tally
        .into_values()
        .filter(|(_, ids)| ids.len() == top)
        .max_by_key(|(_, ids)| ids.last().copied().unwrap_or(0));

    match winner {
        Some((params, selected_in)) => (
            params,
            SelectionProvenance {
                frequency: selected_in.len(),
                selected_in,
                tied: tied_sets > 1,
            },
        ),
        None => (
            ParamSet::new(),
            SelectionProvenance {
                selected_in: Vec::new(),
                frequency: 0,
                tied: false,
            },
        ),
    }
}

// ─── Optimizer ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerState {
    Configured,
    WindowsBuilt,
    Optimizing,
    Done,
}

#[derive(Debug, Clone)]
pub struct WalkForwardOptimizer {
    config: WalkForwardConfig,
    scanner: ParameterScanner,
    windows: Vec<WalkForwardWindow>,
    state: OptimizerState,
}

impl WalkForwardOptimizer {
    pub fn new(backtest: BacktestConfig, config: WalkForwardConfig) -> Self {
        let scanner = ParameterScanner::new(backtest)
            .with_metric(config.metric)
            .with_workers(config.workers);
        Self {
            config,
            scanner,
            windows: Vec::new(),
            state: OptimizerState::Configured,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.scanner = self.scanner.with_cancel_flag(flag);
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.scanner.cancel_flag()
    }

    pub fn state(&self) -> OptimizerState {
        self.state
    }

    pub fn windows(&self) -> &[WalkForwardWindow] {
        &self.windows
    }

    /// Configured/WindowsBuilt → WindowsBuilt.
    pub fn build_windows(&mut self, range: DateRange) -> Result<&[WalkForwardWindow], WalkForwardError> {
        if !matches!(self.state, OptimizerState::Configured | OptimizerState::WindowsBuilt) {
            return Err(WalkForwardError::InvalidState {
                state: self.state,
                action: "build_windows",
            });
        }
        let c = &self.config;
        self.windows = create_windows(
            range.start,
            range.end,
            c.train_days,
            c.test_days,
            c.step_days,
            c.anchored,
        )?;
        self.state = OptimizerState::WindowsBuilt;
        Ok(&self.windows)
    }

    /// WindowsBuilt → Optimizing → Done. A failed run returns to
    /// WindowsBuilt so the caller can retry.
    pub fn run(
        &mut self,
        factory: &dyn SignalGeneratorFactory,
        grid: &ParamGrid,
        data: &MarketData,
    ) -> Result<WalkForwardResult, WalkForwardError> {
        if self.state != OptimizerState::WindowsBuilt {
            return Err(WalkForwardError::InvalidState {
                state: self.state,
                action: "run",
            });
        }
        self.state = OptimizerState::Optimizing;
        match self.optimize_windows(factory, grid, data) {
            Ok(result) => {
                self.state = OptimizerState::Done;
                Ok(result)
            }
            Err(e) => {
                self.state = OptimizerState::WindowsBuilt;
                Err(e)
            }
        }
    }

    fn optimize_windows(
        &self,
        factory: &dyn SignalGeneratorFactory,
        grid: &ParamGrid,
        data: &MarketData,
    ) -> Result<WalkForwardResult, WalkForwardError> {
        grid.validate()?;
        let combos = grid.combinations();
        let metric = self.config.metric;
        let units: Vec<(usize, usize)> = (0..self.windows.len())
            .flat_map(|w| (0..combos.len()).map(move |c| (w, c)))
            .collect();

        info!(
            windows = self.windows.len(),
            combinations = combos.len(),
            units = units.len(),
            %metric,
            anchored = self.config.anchored,
            "walk-forward started"
        );

        let pool = self
            .scanner
            .pool()
            .map_err(|source| WalkForwardError::Scan { window: 0, source })?;

        // Train map: every (window, combination) pair.
        let train: Vec<Result<ParameterSearchResult, ScanError>> = pool.install(|| {
            units
                .par_iter()
                .map(|&(w, c)| self.scanner.evaluate(factory, &combos[c], data, self.windows[w].train))
                .collect()
        });
        let mut per_window: Vec<Vec<ParameterSearchResult>> =
            (0..self.windows.len()).map(|_| Vec::with_capacity(combos.len())).collect();
        for (&(w, _), outcome) in units.iter().zip(train) {
            let result = outcome.map_err(|source| match source {
                ScanError::Cancelled => WalkForwardError::Cancelled,
                source => WalkForwardError::Scan {
                    window: self.windows[w].id,
                    source,
                },
            })?;
            per_window[w].push(result);
        }

        // Winner per window; ties go to grid order.
        let mut winners = Vec::with_capacity(self.windows.len());
        for (window, results) in self.windows.iter().zip(&per_window) {
            let Some(best) = best_index(results, metric) else {
                return Err(WalkForwardError::Scan {
                    window: window.id,
                    source: ScanError::InvalidParameterGrid(GridError::Empty),
                });
            };
            debug!(
                window = window.id,
                params = %results[best].params,
                score = results[best].score,
                "window winner selected"
            );
            winners.push(best);
        }

        // Test map: each winner on its window's test range.
        let test: Vec<Result<ParameterSearchResult, ScanError>> = pool.install(|| {
            self.windows
                .par_iter()
                .zip(&winners)
                .zip(&per_window)
                .map(|((window, &best), results)| {
                    self.scanner.evaluate(factory, &results[best].params, data, window.test)
                })
                .collect()
        });

        let mut windows = Vec::with_capacity(self.windows.len());
        for (((window, &best), results), outcome) in
            self.windows.iter().zip(&winners).zip(&per_window).zip(test)
        {
            let oos = outcome.map_err(|source| match source {
                ScanError::Cancelled => WalkForwardError::Cancelled,
                ScanError::Backtest { params, source } => WalkForwardError::Backtest {
                    window: window.id,
                    params,
                    source,
                },
                source => WalkForwardError::Scan {
                    window: window.id,
                    source,
                },
            })?;
            let is = &results[best];
            windows.push(WindowResult {
                window: *window,
                best_params: is.params.clone(),
                in_sample: is.metrics.clone(),
                out_of_sample: oos.metrics,
                in_sample_score: is.score,
                out_of_sample_score: oos.score,
                candidates: results.len(),
                sensitivity: sensitivity::neighborhood_sensitivity(grid, results, &is.params),
            });
        }

        let report = sensitivity::aggregate(
            grid,
            per_window
                .iter()
                .zip(&winners)
                .map(|(results, &best)| (results.as_slice(), &results[best].params)),
        );
        let result = aggregate(self.config.clone(), windows, report);

        info!(
            windows = result.windows.len(),
            best_params = %result.best_params,
            mean_in_sample = result.mean_in_sample,
            mean_out_of_sample = result.mean_out_of_sample,
            degradation = ?result.degradation,
            "walk-forward finished"
        );
        Ok(result)
    }
}

fn aggregate(
    config: WalkForwardConfig,
    windows: Vec<WindowResult>,
    sensitivity: SensitivityReport,
) -> WalkForwardResult {
    let is_scores: Vec<f64> = windows.iter().map(|w| w.in_sample_score).collect();
    let oos_scores: Vec<f64> = windows.iter().map(|w| w.out_of_sample_score).collect();
    let mean_in_sample = mean(&is_scores);
    let mean_out_of_sample = mean(&oos_scores);
    let oos_consistency = consistency(&oos_scores);
    let deg = degradation(mean_in_sample, mean_out_of_sample);
    let (best_params, selection) = select_best_params(&windows);

    WalkForwardResult {
        config,
        best_params,
        selection,
        mean_in_sample,
        mean_out_of_sample,
        degradation: deg,
        robustness: deg.map(|d| robustness(d, oos_consistency)),
        consistency: oos_consistency,
        param_sensitivity: sensitivity.overall,
        axis_sensitivity: sensitivity.per_axis,
        t_test: one_sided_t_test(&oos_scores),
        windows,
    }
}

/// Build windows over `range` and run the full optimization.
pub fn optimize(
    factory: &dyn SignalGeneratorFactory,
    grid: &ParamGrid,
    data: &MarketData,
    range: DateRange,
    backtest: &BacktestConfig,
    config: &WalkForwardConfig,
) -> Result<WalkForwardResult, WalkForwardError> {
    let mut optimizer = WalkForwardOptimizer::new(backtest.clone(), config.clone());
    optimizer.build_windows(range)?;
    optimizer.run(factory, grid, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rolling_windows_630_days() {
        let start = d(2020, 1, 1);
        let end = start + Duration::days(630);
        let windows = create_windows(start, end, 252, 63, 63, false).unwrap();
        assert_eq!(windows.len(), 6);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.id, i);
            assert_eq!(w.train.num_days(), 252);
            assert_eq!(w.test.num_days(), 63);
            assert_eq!(w.test_start(), w.train_end());
        }
        assert_eq!(windows[5].test_end(), end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].test_end(), pair[1].test_start());
        }
    }

    #[test]
    fn anchored_windows_grow() {
        let start = d(2020, 1, 1);
        let windows = create_windows(start, start + Duration::days(400), 200, 50, 50, true).unwrap();
        assert_eq!(windows.len(), 4);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.train_start(), start);
            assert_eq!(w.train.num_days(), 200 + 50 * i as i64);
        }
    }

    #[test]
    fn window_length_errors() {
        let start = d(2020, 1, 1);
        let end = start + Duration::days(100);
        assert!(matches!(
            create_windows(start, end, 0, 10, 10, false),
            Err(WalkForwardError::InvalidWindowSpec { .. })
        ));
        assert!(matches!(
            create_windows(start, end, 10, 10, -1, false),
            Err(WalkForwardError::InvalidWindowSpec { .. })
        ));
        assert!(matches!(
            create_windows(end, start, 10, 10, 10, false),
            Err(WalkForwardError::InvalidWindowSpec { .. })
        ));
        assert_eq!(
            create_windows(start, end, 90, 20, 10, false),
            Err(WalkForwardError::NoWindows { start, end })
        );
    }

    #[test]
    fn degradation_and_robustness() {
        assert_eq!(degradation(2.0, 0.5), Some(0.75));
        assert_eq!(degradation(0.0, 0.5), None);
        assert_eq!(degradation(-1.0, 0.5), None);
        assert_eq!(degradation(f64::NAN, 0.5), None);
        assert!((robustness(0.25, 0.8) - 0.6).abs() < 1e-12);
        assert!((robustness(-0.5, 0.8) - 1.2).abs() < 1e-12);
        assert_eq!(robustness(3.0, 0.8), 0.0);
    }

    fn window_result(id: usize, x: i64) -> WindowResult {
        let start = d(2020, 1, 1) + Duration::days(id as i64 * 10);
        WindowResult {
            window: WalkForwardWindow {
                id,
                train: DateRange::new(start, start + Duration::days(5)),
                test: DateRange::new(start + Duration::days(5), start + Duration::days(10)),
            },
            best_params: ParamSet::new().with("x", x),
            in_sample: PerformanceMetrics::default(),
            out_of_sample: PerformanceMetrics::default(),
            in_sample_score: 1.0,
            out_of_sample_score: 0.5,
            candidates: 3,
            sensitivity: 0.0,
        }
    }

    #[test]
    fn best_params_most_frequent() {
        let windows = vec![window_result(0, 1), window_result(1, 2), window_result(2, 1)];
        let (best, provenance) = select_best_params(&windows);
        assert_eq!(best.get_i64("x"), Some(1));
        assert_eq!(provenance.selected_in, vec![0, 2]);
        assert_eq!(provenance.frequency, 2);
        assert!(!provenance.tied);
    }

    #[test]
    fn best_params_tie_goes_to_latest_window() {
        let windows = vec![
            window_result(0, 1),
            window_result(1, 2),
            window_result(2, 2),
            window_result(3, 1),
        ];
        let (best, provenance) = select_best_params(&windows);
        assert_eq!(best.get_i64("x"), Some(1));
        assert_eq!(provenance.selected_in, vec![0, 3]);
        assert!(provenance.tied);
    }

    #[test]
    fn run_requires_built_windows() {
        let mut optimizer =
            WalkForwardOptimizer::new(BacktestConfig::default(), WalkForwardConfig::default());
        assert_eq!(optimizer.state(), OptimizerState::Configured);
        let factory = |_: &ParamSet| -> Result<Box<dyn holdout_core::SignalGenerator>, String> {
            Err("unused".into())
        };
        let err = optimizer
            .run(&factory, &ParamGrid::new().axis("x", [1i64]), &MarketData::default())
            .unwrap_err();
        assert_eq!(
            err,
            WalkForwardError::InvalidState {
                state: OptimizerState::Configured,
                action: "run"
            }
        );
    }
}
