//! Parameter scanner — one backtest per grid point over a fixed range.
//!
//! Each combination gets its own generator and its own engine, so units
//! share nothing mutable and run as a rayon parallel map. Results come back
//! in grid order regardless of which worker finished first. Cancellation is
//! cooperative: the shared flag is checked before each backtest starts, never
//! mid-run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use holdout_core::{BacktestConfig, DateRange, MarketData, SignalGenerator};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::fitness::FitnessMetric;
use crate::metrics::PerformanceMetrics;
use crate::params::{GridError, ParamGrid, ParamSet};
use crate::runner::{run_with_generator, RunError};

// ─── Factory seam ────────────────────────────────────────────────────

/// Builds a signal generator for one parameter set.
pub trait SignalGeneratorFactory: Send + Sync {
    fn create(&self, params: &ParamSet) -> Result<Box<dyn SignalGenerator>, String>;
}

impl<F> SignalGeneratorFactory for F
where
    F: Fn(&ParamSet) -> Result<Box<dyn SignalGenerator>, String> + Send + Sync,
{
    fn create(&self, params: &ParamSet) -> Result<Box<dyn SignalGenerator>, String> {
        self(params)
    }
}

// ─── Errors & results ────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum ScanError {
    #[error("invalid parameter grid: {0}")]
    InvalidParameterGrid(#[from] GridError),
    #[error("scan cancelled")]
    Cancelled,
    #[error("backtest failed for [{params}]: {source}")]
    Backtest {
        params: ParamSet,
        #[source]
        source: RunError,
    },
    #[error("generator rejected [{params}]: {reason}")]
    Generator { params: ParamSet, reason: String },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Metrics for one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSearchResult {
    pub params: ParamSet,
    pub metrics: PerformanceMetrics,
    /// The fitness metric's value for this run.
    pub score: f64,
    /// Fingerprint of the underlying run.
    pub fingerprint: String,
}

/// Index of the best result by `metric`; ties go to the earliest.
pub fn best_index(results: &[ParameterSearchResult], metric: FitnessMetric) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, r) in results.iter().enumerate() {
        match best {
            Some(b) if !metric.is_better(r.score, results[b].score) => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Sort best first. Stable, so equal scores keep grid order.
pub fn rank_results(results: &mut [ParameterSearchResult], metric: FitnessMetric) {
    results.sort_by(|a, b| metric.rank(a.score, b.score));
}

// ─── Scanner ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ParameterScanner {
    config: BacktestConfig,
    metric: FitnessMetric,
    /// Worker threads; 0 lets rayon pick one per core.
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl ParameterScanner {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            metric: FitnessMetric::default(),
            workers: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_metric(mut self, metric: FitnessMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Share a cancellation flag with the caller (or another scanner).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Request cancellation; in-flight backtests finish first.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn metric(&self) -> FitnessMetric {
        self.metric
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> Result<rayon::ThreadPool, ScanError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ScanError::ThreadPool(e.to_string()))
    }

    /// Every combination of `grid`, in grid order.
    pub fn grid_search(
        &self,
        factory: &dyn SignalGeneratorFactory,
        grid: &ParamGrid,
        data: &MarketData,
        range: DateRange,
    ) -> Result<Vec<ParameterSearchResult>, ScanError> {
        grid.validate()?;
        self.search(factory, &grid.combinations(), data, range)
    }

    /// `samples` seeded random combinations of `grid`, in grid order.
    pub fn random_search(
        &self,
        factory: &dyn SignalGeneratorFactory,
        grid: &ParamGrid,
        samples: usize,
        seed: u64,
        data: &MarketData,
        range: DateRange,
    ) -> Result<Vec<ParameterSearchResult>, ScanError> {
        grid.validate()?;
        self.search(factory, &grid.sample(samples, seed), data, range)
    }

    /// Evaluate an explicit list of parameter sets, preserving its order.
    pub fn search(
        &self,
        factory: &dyn SignalGeneratorFactory,
        combos: &[ParamSet],
        data: &MarketData,
        range: DateRange,
    ) -> Result<Vec<ParameterSearchResult>, ScanError> {
        info!(
            combinations = combos.len(),
            workers = self.workers,
            metric = %self.metric,
            %range,
            "parameter scan started"
        );
        let pool = self.pool()?;
        let outcomes: Vec<Result<ParameterSearchResult, ScanError>> = pool.install(|| {
            combos
                .par_iter()
                .map(|params| self.evaluate(factory, params, data, range))
                .collect()
        });
        // First failure in grid order wins, independent of scheduling.
        let results = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;
        info!(results = results.len(), %range, "parameter scan finished");
        Ok(results)
    }

    /// One unit of work: build the generator, run, score.
    pub fn evaluate(
        &self,
        factory: &dyn SignalGeneratorFactory,
        params: &ParamSet,
        data: &MarketData,
        range: DateRange,
    ) -> Result<ParameterSearchResult, ScanError> {
        if self.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let generator = factory
            .create(params)
            .map_err(|reason| ScanError::Generator {
                params: params.clone(),
                reason,
            })?;
        let result = run_with_generator(&self.config, data, generator.as_ref(), range).map_err(
            |source| ScanError::Backtest {
                params: params.clone(),
                source,
            },
        )?;
        let score = self.metric.extract(&result.metrics);
        debug!(params = %params, score, %range, "unit evaluated");
        Ok(ParameterSearchResult {
            params: params.clone(),
            metrics: result.metrics,
            score,
            fingerprint: result.fingerprint,
        })
    }
}
