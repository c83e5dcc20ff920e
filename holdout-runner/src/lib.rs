//! Holdout Runner — metrics, parameter search, walk-forward, overfitting checks.
//!
//! This crate builds on `holdout-core` to provide:
//! - Performance metrics over an equity curve and trade list
//! - A single-run entry point with no-look-ahead signal generation
//! - Parameter grids, seeded random sampling, and a parallel scanner
//! - Walk-forward optimization over rolling or anchored windows
//! - Parameter sensitivity and a one-sided t-test of out-of-sample scores
//! - Overfitting detection with configurable thresholds and rules
//! - TOML study configuration

pub mod config;
pub mod fitness;
pub mod metrics;
pub mod overfitting;
pub mod params;
pub mod runner;
pub mod scanner;
pub mod sensitivity;
pub mod stats;
pub mod walk_forward;

pub use config::{AxisConfig, ConfigError, StudyConfig};
pub use fitness::{FitnessMetric, UnknownMetric};
pub use metrics::PerformanceMetrics;
pub use overfitting::{
    consistency, default_rules, detect_overfitting, FlagRule, OverfitFlag, OverfitThresholds,
    OverfittingDetector, OverfittingReport, RecommendationRule,
};
pub use params::{GridError, ParamGrid, ParamSet, ParamValue};
pub use runner::{
    result_fingerprint, run, run_with_generator, signals_for, BacktestResult, RunError,
    SCHEMA_VERSION,
};
pub use scanner::{
    best_index, rank_results, ParameterScanner, ParameterSearchResult, ScanError,
    SignalGeneratorFactory,
};
pub use sensitivity::SensitivityReport;
pub use stats::{one_sided_t_test, TTest};
pub use walk_forward::{
    create_windows, optimize, OptimizerState, SelectionProvenance, WalkForwardConfig,
    WalkForwardError, WalkForwardOptimizer, WalkForwardResult, WalkForwardWindow, WindowResult,
};
