//! End-to-end scan, walk-forward and overfitting scenarios.

use chrono::{Duration, NaiveDate};
use holdout_core::{BacktestConfig, Bar, DateRange, MarketData, Signal, SignalGenerator};
use holdout_runner::{
    create_windows, detect_overfitting, optimize, run, signals_for, OptimizerState,
    OverfittingDetector, ParamGrid, ParamSet, ParameterScanner, ScanError, WalkForwardConfig,
    WalkForwardError, WalkForwardOptimizer,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn day(i: usize) -> NaiveDate {
    start() + Duration::days(i as i64)
}

/// Trend plus two cycles, one bar per calendar day.
fn wavy(days: usize) -> MarketData {
    MarketData::from_bars((0..days).map(|i| {
        let x = i as f64;
        let close = 100.0 + 0.05 * x + 8.0 * (x / 15.0).sin() + 3.0 * (x / 4.3).sin();
        Bar::flat("AAA", day(i), close, 5_000)
    }))
    .unwrap()
}

/// Hold while the close is above the close `lookback` bars earlier.
fn momentum(params: &ParamSet) -> Result<Box<dyn SignalGenerator>, String> {
    let lookback = params
        .get_i64("lookback")
        .filter(|v| *v > 0)
        .ok_or("lookback must be a positive integer")? as usize;
    Ok(Box::new(move |bars: &[Bar]| -> Vec<Signal> {
        (0..bars.len())
            .map(|i| Signal::from(i >= lookback && bars[i].close > bars[i - lookback].close))
            .collect()
    }))
}

fn lookback_grid() -> ParamGrid {
    ParamGrid::new().axis("lookback", [3i64, 10, 25])
}

// ── Scanner ──────────────────────────────────────────────────────────

#[test]
fn grid_search_matches_direct_runs() {
    let data = wavy(200);
    let range = DateRange::new(day(30), day(200));
    let config = BacktestConfig::new(25_000.0);
    let scanner = ParameterScanner::new(config.clone()).with_workers(2);

    let results = scanner
        .grid_search(&momentum, &lookback_grid(), &data, range)
        .unwrap();
    assert_eq!(results.len(), 3);

    for result in &results {
        let generator = momentum(&result.params).unwrap();
        let signals = signals_for(generator.as_ref(), &data, range).unwrap();
        let direct = run(&config, &data, &signals, range).unwrap();
        assert_eq!(result.metrics, direct.metrics);
        assert_eq!(result.fingerprint, direct.fingerprint);
        assert_eq!(result.score, direct.metrics.sharpe);
    }
}

#[test]
fn worker_count_does_not_change_results() {
    let data = wavy(150);
    let range = DateRange::new(day(0), day(150));
    let grid = ParamGrid::new()
        .axis("lookback", [2i64, 5, 8, 13])
        .axis("unused", [0i64, 1]);
    let one = ParameterScanner::new(BacktestConfig::default())
        .with_workers(1)
        .grid_search(&momentum, &grid, &data, range)
        .unwrap();
    let four = ParameterScanner::new(BacktestConfig::default())
        .with_workers(4)
        .grid_search(&momentum, &grid, &data, range)
        .unwrap();
    assert_eq!(one, four);
}

// ── Walk-forward ─────────────────────────────────────────────────────

#[test]
fn six_rolling_windows_over_630_days() {
    let windows = create_windows(start(), day(630), 252, 63, 63, false).unwrap();
    assert_eq!(windows.len(), 6);
    for pair in windows.windows(2) {
        assert_eq!(pair[0].test_start(), pair[0].train_end());
        assert!(pair[0].test_end() <= pair[1].test_start());
    }
}

#[test]
fn optimize_end_to_end() {
    let data = wavy(630);
    let config = WalkForwardConfig {
        workers: 2,
        ..WalkForwardConfig::default()
    };
    let result = optimize(
        &momentum,
        &lookback_grid(),
        &data,
        DateRange::new(day(0), day(630)),
        &BacktestConfig::new(50_000.0),
        &config,
    )
    .unwrap();

    assert_eq!(result.windows.len(), 6);
    for (i, w) in result.windows.iter().enumerate() {
        assert_eq!(w.window.id, i);
        assert_eq!(w.candidates, 3);
        assert!(lookback_grid().combinations().contains(&w.best_params));
        assert!((0.0..=1.0).contains(&w.sensitivity));
    }
    assert!(result.selection.frequency >= 2);
    assert_eq!(result.selection.selected_in.len(), result.selection.frequency);
    for id in &result.selection.selected_in {
        assert_eq!(result.windows[*id].best_params, result.best_params);
    }
    assert!((0.0..=1.0).contains(&result.consistency));
    assert!((0.0..=1.0).contains(&result.param_sensitivity));
    assert!(result.t_test.is_some());

    let in_sample: f64 = result.in_sample_scores().iter().sum::<f64>() / 6.0;
    assert!((result.mean_in_sample - in_sample).abs() < 1e-12);
}

#[test]
fn optimize_is_deterministic_across_worker_counts() {
    let data = wavy(400);
    let range = DateRange::new(day(0), day(400));
    let run_with = |workers: usize| {
        let config = WalkForwardConfig {
            train_days: 120,
            test_days: 40,
            step_days: 40,
            workers,
            ..WalkForwardConfig::default()
        };
        let mut result =
            optimize(&momentum, &lookback_grid(), &data, range, &BacktestConfig::default(), &config)
                .unwrap();
        result.config.workers = 0;
        serde_json::to_string(&result).unwrap()
    };
    let a = run_with(1);
    let b = run_with(3);
    assert_eq!(a, b);
}

#[test]
fn anchored_train_windows_share_a_start() {
    let data = wavy(400);
    let config = WalkForwardConfig {
        train_days: 120,
        test_days: 40,
        step_days: 40,
        anchored: true,
        ..WalkForwardConfig::default()
    };
    let result = optimize(
        &momentum,
        &lookback_grid(),
        &data,
        DateRange::new(day(0), day(400)),
        &BacktestConfig::default(),
        &config,
    )
    .unwrap();
    assert_eq!(result.windows.len(), 7);
    assert!(result.windows.iter().all(|w| w.window.train_start() == day(0)));
}

#[test]
fn optimizer_state_machine() {
    let data = wavy(300);
    let config = WalkForwardConfig {
        train_days: 100,
        test_days: 50,
        step_days: 50,
        ..WalkForwardConfig::default()
    };
    let mut optimizer = WalkForwardOptimizer::new(BacktestConfig::default(), config);
    assert_eq!(optimizer.state(), OptimizerState::Configured);

    optimizer.build_windows(DateRange::new(day(0), day(300))).unwrap();
    assert_eq!(optimizer.state(), OptimizerState::WindowsBuilt);
    assert_eq!(optimizer.windows().len(), 4);

    optimizer.run(&momentum, &lookback_grid(), &data).unwrap();
    assert_eq!(optimizer.state(), OptimizerState::Done);

    let again = optimizer.run(&momentum, &lookback_grid(), &data).unwrap_err();
    assert!(matches!(again, WalkForwardError::InvalidState { state: OptimizerState::Done, .. }));
    assert!(optimizer.build_windows(DateRange::new(day(0), day(300))).is_err());
}

#[test]
fn cancellation_aborts_without_partial_result() {
    let data = wavy(300);
    let config = WalkForwardConfig {
        train_days: 100,
        test_days: 50,
        step_days: 50,
        ..WalkForwardConfig::default()
    };
    let mut optimizer = WalkForwardOptimizer::new(BacktestConfig::default(), config);
    optimizer.build_windows(DateRange::new(day(0), day(300))).unwrap();
    optimizer
        .cancel_flag()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let err = optimizer.run(&momentum, &lookback_grid(), &data).unwrap_err();
    assert_eq!(err, WalkForwardError::Cancelled);
    assert_eq!(optimizer.state(), OptimizerState::WindowsBuilt);
}

#[test]
fn train_failure_names_the_window() {
    // Bars stop at day 200; window 4 trains on [200, 300), which is empty.
    let data = wavy(200);
    let config = WalkForwardConfig {
        train_days: 100,
        test_days: 50,
        step_days: 50,
        ..WalkForwardConfig::default()
    };
    let err = optimize(
        &momentum,
        &lookback_grid(),
        &data,
        DateRange::new(day(0), day(400)),
        &BacktestConfig::default(),
        &config,
    )
    .unwrap_err();
    match err {
        WalkForwardError::Scan { window, source } => {
            assert_eq!(window, 4);
            assert!(matches!(source, ScanError::Backtest { .. }));
        }
        other => panic!("expected scan error, got {other:?}"),
    }
}

// ── Overfitting ──────────────────────────────────────────────────────

#[test]
fn in_sample_two_out_of_sample_half() {
    let report = OverfittingDetector::default().detect(2.0, 0.5, None);
    assert_eq!(report.degradation_pct, Some(0.75));
    assert!(report.is_overfit);
}

#[test]
fn detection_is_idempotent() {
    let data = wavy(400);
    let config = WalkForwardConfig {
        train_days: 120,
        test_days: 40,
        step_days: 40,
        ..WalkForwardConfig::default()
    };
    let result = optimize(
        &momentum,
        &lookback_grid(),
        &data,
        DateRange::new(day(0), day(400)),
        &BacktestConfig::default(),
        &config,
    )
    .unwrap();

    let first = serde_json::to_string(&detect_overfitting(&result)).unwrap();
    let second = serde_json::to_string(&detect_overfitting(&result)).unwrap();
    assert_eq!(first, second);

    let report = detect_overfitting(&result);
    assert_eq!(report.degradation_pct, result.degradation);
    assert_eq!(report.param_sensitivity, Some(result.param_sensitivity));
}
