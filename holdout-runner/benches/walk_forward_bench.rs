//! Criterion benchmarks for search and validation.
//!
//! Benchmarks:
//! 1. Grid search at several worker counts
//! 2. Full walk-forward optimization
//! 3. Metric computation over a long equity curve

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use holdout_core::engine::TradeStats;
use holdout_core::{BacktestConfig, Bar, DateRange, EquityPoint, MarketData, Signal, SignalGenerator};
use holdout_runner::{
    optimize, ParamGrid, ParamSet, ParameterScanner, PerformanceMetrics, WalkForwardConfig,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn base_date() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
}

fn make_market(symbols: usize, n: usize) -> MarketData {
    let bars = (0..symbols).flat_map(|s| {
        (0..n).map(move |i| {
            let close = 100.0 + ((i + s * 11) as f64 * 0.07).sin() * 12.0 + i as f64 * 0.02;
            Bar::flat(format!("S{s:02}"), base_date() + chrono::Duration::days(i as i64), close, 100_000)
        })
    });
    MarketData::from_bars(bars).unwrap()
}

fn momentum(params: &ParamSet) -> Result<Box<dyn SignalGenerator>, String> {
    let lookback = params.get_i64("lookback").ok_or("missing lookback")? as usize;
    Ok(Box::new(move |bars: &[Bar]| -> Vec<Signal> {
        (0..bars.len())
            .map(|t| {
                if t < lookback {
                    return Signal::flat();
                }
                let change = bars[t].close / bars[t - lookback].close - 1.0;
                Signal::ranked(change > 0.0, change)
            })
            .collect()
    }))
}

fn grid() -> ParamGrid {
    ParamGrid::new().axis("lookback", [5i64, 10, 20, 40, 60, 90])
}

// ── 1. Grid search ───────────────────────────────────────────────────

fn bench_grid_search(c: &mut Criterion) {
    let data = make_market(5, 756);
    let range = DateRange::inclusive(data.first_date().unwrap(), data.last_date().unwrap());
    let mut group = c.benchmark_group("grid_search");
    for workers in [1usize, 4] {
        let scanner = ParameterScanner::new(BacktestConfig::new(1_000_000.0)).with_workers(workers);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| scanner.grid_search(&momentum, &grid(), black_box(&data), range).unwrap())
        });
    }
    group.finish();
}

// ── 2. Walk-forward ──────────────────────────────────────────────────

fn bench_walk_forward(c: &mut Criterion) {
    let data = make_market(3, 1_260);
    let range = DateRange::inclusive(data.first_date().unwrap(), data.last_date().unwrap());
    let backtest = BacktestConfig::new(1_000_000.0);
    let config = WalkForwardConfig::default();
    c.bench_function("walk_forward_1260d", |b| {
        b.iter(|| optimize(&momentum, &grid(), black_box(&data), range, &backtest, &config).unwrap())
    });
}

// ── 3. Metrics ───────────────────────────────────────────────────────

fn bench_metrics(c: &mut Criterion) {
    let equity: Vec<EquityPoint> = (0..5_000)
        .map(|i| EquityPoint {
            date: base_date() + chrono::Duration::days(i),
            value: 100_000.0 * (1.0 + (i as f64 * 0.01).sin() * 0.05 + i as f64 * 1e-4),
            cash: 10_000.0,
        })
        .collect();
    c.bench_function("metrics_5000", |b| {
        b.iter(|| PerformanceMetrics::compute(black_box(&equity), &TradeStats::default(), 0.0))
    });
}

criterion_group!(benches, bench_grid_search, bench_walk_forward, bench_metrics);
criterion_main!(benches);
