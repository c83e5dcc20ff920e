//! Parameter sensitivity — how sharply the score falls off around the winner.
//!
//! For the selected set, each grid neighbour (one step along one axis) is
//! scored by its relative drop `(best - neighbour) / |best|`, clamped to
//! `[0, 1]`. A plateau scores near 0; an isolated spike scores near 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::mean;
use crate::params::{ParamGrid, ParamSet};
use crate::scanner::ParameterSearchResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivityReport {
    /// Mean neighbour drop, averaged over windows.
    pub overall: f64,
    /// Same, restricted to neighbours along each axis.
    pub per_axis: BTreeMap<String, f64>,
}

/// Relative score drop from `best` to `other`, in `[0, 1]`.
pub fn relative_drop(best: f64, other: f64) -> f64 {
    if !best.is_finite() || best.abs() < 1e-12 {
        return 0.0;
    }
    if !other.is_finite() {
        return 1.0;
    }
    ((best - other) / best.abs()).clamp(0.0, 1.0)
}

/// (axis, drop) for every scored neighbour of `best`.
fn neighbor_drops(
    grid: &ParamGrid,
    results: &[ParameterSearchResult],
    best: &ParamSet,
) -> Vec<(String, f64)> {
    let scores: BTreeMap<String, f64> = results
        .iter()
        .map(|r| (r.params.fingerprint(), r.score))
        .collect();
    let Some(&best_score) = scores.get(&best.fingerprint()) else {
        return Vec::new();
    };

    grid.neighbors(best)
        .into_iter()
        .filter_map(|n| {
            let score = *scores.get(&n.fingerprint())?;
            let axis = grid
                .axes()
                .iter()
                .map(|(name, _)| name)
                .find(|name| n.get(name) != best.get(name))?
                .clone();
            Some((axis, relative_drop(best_score, score)))
        })
        .collect()
}

/// Mean drop over all neighbours of `best`; 0 when it has none.
pub fn neighborhood_sensitivity(
    grid: &ParamGrid,
    results: &[ParameterSearchResult],
    best: &ParamSet,
) -> f64 {
    let drops: Vec<f64> = neighbor_drops(grid, results, best)
        .into_iter()
        .map(|(_, d)| d)
        .collect();
    mean(&drops)
}

/// Mean drop per axis.
pub fn axis_sensitivity(
    grid: &ParamGrid,
    results: &[ParameterSearchResult],
    best: &ParamSet,
) -> BTreeMap<String, f64> {
    let mut by_axis: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (axis, drop) in neighbor_drops(grid, results, best) {
        by_axis.entry(axis).or_default().push(drop);
    }
    by_axis.into_iter().map(|(k, v)| (k, mean(&v))).collect()
}

/// Combine per-window sensitivities. Windows whose winner has no scored
/// neighbours are left out of the average.
pub fn aggregate<'a>(
    grid: &ParamGrid,
    windows: impl IntoIterator<Item = (&'a [ParameterSearchResult], &'a ParamSet)>,
) -> SensitivityReport {
    let mut overall = Vec::new();
    let mut per_axis: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (results, best) in windows {
        let drops = neighbor_drops(grid, results, best);
        if drops.is_empty() {
            continue;
        }
        let values: Vec<f64> = drops.iter().map(|(_, d)| *d).collect();
        overall.push(mean(&values));
        for (axis, value) in axis_sensitivity(grid, results, best) {
            per_axis.entry(axis).or_default().push(value);
        }
    }
    SensitivityReport {
        overall: mean(&overall),
        per_axis: per_axis.into_iter().map(|(k, v)| (k, mean(&v))).collect(),
    }
}
