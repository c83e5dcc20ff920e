//! Study configuration loaded from TOML.
//!
//! A study bundles everything needed to reproduce a walk-forward run apart
//! from the data and the strategy factory: engine settings, lot sizes, window
//! lengths, overfitting thresholds, the parameter grid and the date range.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use holdout_core::{BacktestConfig, DateRange, Instrument};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::overfitting::{OverfitThresholds, OverfittingDetector};
use crate::params::{GridError, ParamGrid, ParamValue};
use crate::walk_forward::WalkForwardConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid parameter grid: {0}")]
    Grid(#[from] GridError),
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

/// One `[[grid]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub name: String,
    pub values: Vec<ParamValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub backtest: BacktestConfig,
    /// Symbol → lot size, merged into the backtest's instrument table.
    pub lot_sizes: BTreeMap<String, u64>,
    pub walk_forward: WalkForwardConfig,
    pub overfitting: OverfitThresholds,
    pub grid: Vec<AxisConfig>,
    pub range: Option<DateRange>,
}

impl StudyConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest_config()?
            .validate()
            .map_err(|e| invalid(e.to_string()))?;

        let wf = &self.walk_forward;
        for (name, days) in [
            ("train_days", wf.train_days),
            ("test_days", wf.test_days),
            ("step_days", wf.step_days),
        ] {
            if days <= 0 {
                return Err(invalid(format!("walk_forward.{name} must be positive, got {days}")));
            }
        }

        let t = &self.overfitting;
        if !(t.max_degradation.is_finite() && t.max_degradation >= 0.0) {
            return Err(invalid("overfitting.max_degradation must be finite and >= 0"));
        }
        for (name, value) in [
            ("min_robustness", t.min_robustness),
            ("max_sensitivity", t.max_sensitivity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("overfitting.{name} must be in [0, 1], got {value}")));
            }
        }
        if !(t.significance > 0.0 && t.significance < 1.0) {
            return Err(invalid("overfitting.significance must be in (0, 1)"));
        }

        if !self.grid.is_empty() {
            self.param_grid().validate()?;
        }
        if let Some(range) = self.range {
            if range.is_empty() {
                return Err(invalid(format!("range {range} is empty")));
            }
        }
        Ok(())
    }

    /// Backtest settings with `lot_sizes` merged into the instrument table.
    pub fn backtest_config(&self) -> Result<BacktestConfig, ConfigError> {
        let mut config = self.backtest.clone();
        for (symbol, &lot) in &self.lot_sizes {
            let instrument = Instrument::new(symbol.clone(), lot).map_err(|e| invalid(e.to_string()))?;
            config.instruments.insert(instrument);
        }
        Ok(config)
    }

    pub fn param_grid(&self) -> ParamGrid {
        self.grid
            .iter()
            .fold(ParamGrid::new(), |grid, axis| grid.axis(axis.name.clone(), axis.values.clone()))
    }

    pub fn detector(&self) -> OverfittingDetector {
        OverfittingDetector::new(self.overfitting)
    }

    /// blake3 of the canonical JSON form. Equal configs hash equally.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
