//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function of the equity values. Trade-level figures
//! (win rate, profit factor, holding period) come from the engine's
//! [`TradeStats`] so there is one source for them. Annualization assumes 252
//! bars per year.

use holdout_core::engine::{RunResult, TradeStats};
use holdout_core::EquityPoint;
use serde::{Deserialize, Serialize};

pub const BARS_PER_YEAR: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Mean bars held per closed leg.
    pub avg_holding_period: f64,
    pub total_costs: f64,
    pub trade_count: usize,
    /// Fraction of bars with capital in the market.
    pub exposure: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and the run's trade stats.
    pub fn compute(equity: &[EquityPoint], trades: &TradeStats, total_costs: f64) -> Self {
        let values: Vec<f64> = equity.iter().map(|p| p.value).collect();
        let bars = values.len();
        Self {
            total_return: total_return(&values),
            annualized_return: annualized_return(&values, bars),
            sharpe: sharpe_ratio(&values, 0.0),
            sortino: sortino_ratio(&values, 0.0),
            calmar: calmar_ratio(&values, bars),
            max_drawdown: max_drawdown(&values),
            win_rate: trades.win_rate,
            profit_factor: trades.profit_factor,
            avg_holding_period: trades.avg_bars_held,
            total_costs,
            trade_count: trades.trade_count,
            exposure: exposure(equity),
        }
    }

    pub fn from_run(result: &RunResult) -> Self {
        Self::compute(&result.equity_curve, &result.trade_stats, result.total_costs())
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || initial <= 0.0 {
        return 0.0;
    }
    (final_eq - initial) / initial
}

/// Compound annual growth rate over `bars` bars.
///
/// Returns 0.0 for fewer than 2 bars or a non-positive endpoint.
pub fn annualized_return(equity_curve: &[f64], bars: usize) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if bars < 2 || initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = bars as f64 / BARS_PER_YEAR;
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from per-bar returns.
///
/// Returns 0.0 if variance is zero or there are fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let bar_rf = risk_free_rate / BARS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - bar_rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / std * BARS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let bar_rf = risk_free_rate / BARS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - bar_rf).collect();
    let downside_sq: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / downside_std * BARS_PER_YEAR.sqrt()
}

/// Calmar ratio: annualized return / |max drawdown|.
pub fn calmar_ratio(equity_curve: &[f64], bars: usize) -> f64 {
    let ann = annualized_return(equity_curve, bars);
    let dd = max_drawdown(equity_curve);
    if dd >= 0.0 || ann <= 0.0 {
        return 0.0;
    }
    ann / dd.abs()
}

/// Maximum drawdown as a negative fraction (-0.15 = 15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of equity points where some value sits outside cash.
pub fn exposure(equity: &[EquityPoint]) -> f64 {
    if equity.is_empty() {
        return 0.0;
    }
    let invested = equity
        .iter()
        .filter(|p| (p.value - p.cash).abs() > 1e-9 * p.value.abs().max(1.0))
        .count();
    invested as f64 / equity.len() as f64
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity values.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
