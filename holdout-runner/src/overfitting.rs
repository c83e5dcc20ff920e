//! Overfitting detection — classify a walk-forward result as robust or overfit.
//!
//! Inputs are the in-sample and out-of-sample scores (optionally per window)
//! and the parameter sensitivity. Three thresholds decide `is_overfit`:
//! degradation, robustness and sensitivity. Everything else is reported as
//! an informational flag. Recommendations come from a rule list that callers
//! can extend.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metrics::{mean, std_dev};
use crate::walk_forward::{degradation, robustness, WalkForwardResult};

// ─── Thresholds & flags ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverfitThresholds {
    /// Overfit above this degradation (default 0.20).
    pub max_degradation: f64,
    /// Overfit below this robustness (default 0.5).
    pub min_robustness: f64,
    /// Overfit above this parameter sensitivity (default 0.7).
    pub max_sensitivity: f64,
    /// Significance level for the out-of-sample t-test (default 0.05).
    pub significance: f64,
}

impl Default for OverfitThresholds {
    fn default() -> Self {
        Self {
            max_degradation: 0.20,
            min_robustness: 0.5,
            max_sensitivity: 0.7,
            significance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverfitFlag {
    HighDegradation,
    LowRobustness,
    HighSensitivity,
    /// In-sample score is zero, negative or non-finite; degradation is undefined.
    InvalidBaseline,
    /// Mean out-of-sample score is not positive.
    NegativeOutOfSample,
    /// Fewer than two windows; consistency is not measurable.
    InsufficientWindows,
    /// Out-of-sample scores are not significantly above zero.
    NotSignificant,
}

impl OverfitFlag {
    /// True for flags that decide `is_overfit`.
    pub fn is_decisive(&self) -> bool {
        matches!(
            self,
            Self::HighDegradation | Self::LowRobustness | Self::HighSensitivity
        )
    }
}

impl fmt::Display for OverfitFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HighDegradation => "high_degradation",
            Self::LowRobustness => "low_robustness",
            Self::HighSensitivity => "high_sensitivity",
            Self::InvalidBaseline => "invalid_baseline",
            Self::NegativeOutOfSample => "negative_out_of_sample",
            Self::InsufficientWindows => "insufficient_windows",
            Self::NotSignificant => "not_significant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverfittingReport {
    pub is_overfit: bool,
    /// `(IS - OOS) / IS`; `None` with [`OverfitFlag::InvalidBaseline`].
    pub degradation_pct: Option<f64>,
    pub robustness_score: Option<f64>,
    pub consistency: f64,
    pub param_sensitivity: Option<f64>,
    pub in_sample: f64,
    pub out_of_sample: f64,
    /// One-sided p-value of the per-window out-of-sample scores, if computed.
    pub oos_p_value: Option<f64>,
    pub flags: Vec<OverfitFlag>,
    pub recommendations: Vec<String>,
}

impl OverfittingReport {
    pub fn has_flag(&self, flag: OverfitFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// `1 - stddev / mean` of per-window scores, clamped to `[0, 1]`.
///
/// 1 with fewer than two finite values, 0 when the mean is not positive.
pub fn consistency(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return 1.0;
    }
    let m = mean(&finite);
    if m <= 0.0 {
        return 0.0;
    }
    (1.0 - std_dev(&finite) / m).clamp(0.0, 1.0)
}

// ─── Recommendation rules ────────────────────────────────────────────

/// Turns a finished report into zero or one recommendation.
pub trait RecommendationRule: Send + Sync {
    fn recommend(&self, report: &OverfittingReport, thresholds: &OverfitThresholds) -> Option<String>;
}

impl<F> RecommendationRule for F
where
    F: Fn(&OverfittingReport, &OverfitThresholds) -> Option<String> + Send + Sync,
{
    fn recommend(&self, report: &OverfittingReport, thresholds: &OverfitThresholds) -> Option<String> {
        self(report, thresholds)
    }
}

/// Emits a fixed message when a flag is raised.
#[derive(Debug, Clone)]
pub struct FlagRule {
    pub flag: OverfitFlag,
    pub message: String,
}

impl FlagRule {
    pub fn new(flag: OverfitFlag, message: impl Into<String>) -> Self {
        Self {
            flag,
            message: message.into(),
        }
    }
}

impl RecommendationRule for FlagRule {
    fn recommend(&self, report: &OverfittingReport, _: &OverfitThresholds) -> Option<String> {
        report.has_flag(self.flag).then(|| self.message.clone())
    }
}

pub fn default_rules() -> Vec<Box<dyn RecommendationRule>> {
    vec![
        Box::new(FlagRule::new(
            OverfitFlag::HighDegradation,
            "widen the out-of-sample window or add walk-forward windows",
        )),
        Box::new(FlagRule::new(
            OverfitFlag::HighSensitivity,
            "reduce the parameter count or coarsen the grid around the optimum",
        )),
        Box::new(FlagRule::new(
            OverfitFlag::LowRobustness,
            "out-of-sample results vary across windows; test on a longer history",
        )),
        Box::new(FlagRule::new(
            OverfitFlag::InvalidBaseline,
            "in-sample score is not positive; revisit the strategy before tuning it",
        )),
        Box::new(FlagRule::new(
            OverfitFlag::InsufficientWindows,
            "use at least two walk-forward windows to measure consistency",
        )),
        Box::new(FlagRule::new(
            OverfitFlag::NotSignificant,
            "out-of-sample edge is not statistically significant; collect more windows",
        )),
    ]
}

// ─── Detector ────────────────────────────────────────────────────────

pub struct OverfittingDetector {
    thresholds: OverfitThresholds,
    rules: Vec<Box<dyn RecommendationRule>>,
}

impl Default for OverfittingDetector {
    fn default() -> Self {
        Self::new(OverfitThresholds::default())
    }
}

impl fmt::Debug for OverfittingDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverfittingDetector")
            .field("thresholds", &self.thresholds)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl OverfittingDetector {
    pub fn new(thresholds: OverfitThresholds) -> Self {
        Self {
            thresholds,
            rules: default_rules(),
        }
    }

    /// Append a rule after the defaults.
    pub fn with_rule(mut self, rule: impl RecommendationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Replace the whole rule list.
    pub fn with_rules(mut self, rules: Vec<Box<dyn RecommendationRule>>) -> Self {
        self.rules = rules;
        self
    }

    pub fn thresholds(&self) -> &OverfitThresholds {
        &self.thresholds
    }

    /// Single in-sample / out-of-sample pair.
    pub fn detect(
        &self,
        in_sample: f64,
        out_of_sample: f64,
        param_sensitivity: Option<f64>,
    ) -> OverfittingReport {
        self.classify(in_sample, out_of_sample, 1.0, param_sensitivity, Vec::new(), None)
    }

    /// Mean in-sample score against per-window out-of-sample scores.
    pub fn detect_with_windows(
        &self,
        in_sample: f64,
        out_of_sample: &[f64],
        param_sensitivity: Option<f64>,
    ) -> OverfittingReport {
        let mut extra = Vec::new();
        if out_of_sample.len() < 2 {
            extra.push(OverfitFlag::InsufficientWindows);
        }
        self.classify(
            in_sample,
            mean(out_of_sample),
            consistency(out_of_sample),
            param_sensitivity,
            extra,
            None,
        )
    }

    /// Re-derive the report from a walk-forward result. Pure: the same
    /// result always gives the same report.
    pub fn analyze(&self, result: &WalkForwardResult) -> OverfittingReport {
        let oos = result.out_of_sample_scores();
        let mut extra = Vec::new();
        if oos.len() < 2 {
            extra.push(OverfitFlag::InsufficientWindows);
        }
        let p_value = result.t_test.map(|t| t.p_value);
        if p_value.is_some_and(|p| p >= self.thresholds.significance) {
            extra.push(OverfitFlag::NotSignificant);
        }
        self.classify(
            result.mean_in_sample,
            mean(&oos),
            consistency(&oos),
            Some(result.param_sensitivity),
            extra,
            p_value,
        )
    }

    fn classify(
        &self,
        in_sample: f64,
        out_of_sample: f64,
        consistency: f64,
        param_sensitivity: Option<f64>,
        extra: Vec<OverfitFlag>,
        oos_p_value: Option<f64>,
    ) -> OverfittingReport {
        let t = &self.thresholds;
        let mut flags = extra;

        let degradation_pct = degradation(in_sample, out_of_sample);
        let robustness_score = degradation_pct.map(|d| robustness(d, consistency));

        match degradation_pct {
            None => flags.push(OverfitFlag::InvalidBaseline),
            Some(d) if d > t.max_degradation => flags.push(OverfitFlag::HighDegradation),
            Some(_) => {}
        }
        if robustness_score.is_some_and(|r| r < t.min_robustness) {
            flags.push(OverfitFlag::LowRobustness);
        }
        if param_sensitivity.is_some_and(|s| s > t.max_sensitivity) {
            flags.push(OverfitFlag::HighSensitivity);
        }
        if out_of_sample.is_nan() || out_of_sample <= 0.0 {
            flags.push(OverfitFlag::NegativeOutOfSample);
        }
        flags.sort();
        flags.dedup();

        let mut report = OverfittingReport {
            is_overfit: flags.iter().any(OverfitFlag::is_decisive),
            degradation_pct,
            robustness_score,
            consistency,
            param_sensitivity,
            in_sample,
            out_of_sample,
            oos_p_value,
            flags,
            recommendations: Vec::new(),
        };
        report.recommendations = self
            .rules
            .iter()
            .filter_map(|rule| rule.recommend(&report, t))
            .collect();
        report
    }
}

/// Default thresholds and rules applied to a walk-forward result.
pub fn detect_overfitting(result: &WalkForwardResult) -> OverfittingReport {
    OverfittingDetector::default().analyze(result)
}
