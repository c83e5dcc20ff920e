//! Fitness function — configurable metric selector for parameter ranking.

use crate::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which metric to optimize/sort by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMetric {
    #[default]
    Sharpe,
    Sortino,
    Calmar,
    AnnualizedReturn,
    TotalReturn,
    WinRate,
    ProfitFactor,
    MaxDrawdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown fitness metric '{0}'")]
pub struct UnknownMetric(pub String);

impl FitnessMetric {
    pub const ALL: [FitnessMetric; 8] = [
        Self::Sharpe,
        Self::Sortino,
        Self::Calmar,
        Self::AnnualizedReturn,
        Self::TotalReturn,
        Self::WinRate,
        Self::ProfitFactor,
        Self::MaxDrawdown,
    ];

    /// Extract the relevant metric value from a PerformanceMetrics struct.
    pub fn extract(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Self::Sharpe => metrics.sharpe,
            Self::Sortino => metrics.sortino,
            Self::Calmar => metrics.calmar,
            Self::AnnualizedReturn => metrics.annualized_return,
            Self::TotalReturn => metrics.total_return,
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => metrics.profit_factor,
            Self::MaxDrawdown => metrics.max_drawdown,
        }
    }

    /// Compare two scores, best first. Non-finite scores rank last.
    ///
    /// Every metric is higher-is-better; drawdown is stored negative so
    /// -0.05 beats -0.20.
    pub fn rank(&self, a: f64, b: f64) -> Ordering {
        match (a.is_finite(), b.is_finite()) {
            (true, true) => b.total_cmp(&a),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        }
    }

    /// True if `a` is strictly better than `b`.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        self.rank(a, b) == Ordering::Less
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sharpe => "sharpe",
            Self::Sortino => "sortino",
            Self::Calmar => "calmar",
            Self::AnnualizedReturn => "annualized_return",
            Self::TotalReturn => "total_return",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
            Self::MaxDrawdown => "max_drawdown",
        }
    }
}

impl fmt::Display for FitnessMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitnessMetric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let key = match key.as_str() {
            "cagr" => "annualized_return",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}
