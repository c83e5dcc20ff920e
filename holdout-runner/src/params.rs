//! Parameter values, parameter sets and search grids.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// One parameter value. Untagged so TOML/JSON literals map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    fn is_finite(&self) -> bool {
        !matches!(self, Self::Float(v) if !v.is_finite())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// A named assignment of values, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content hash (blake3 over canonical JSON), stable across runs.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.0).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("parameter grid has no axes")]
    Empty,
    #[error("axis '{axis}' has no values")]
    EmptyAxis { axis: String },
    #[error("axis '{axis}' appears more than once")]
    DuplicateAxis { axis: String },
    #[error("axis '{axis}' contains a non-finite value")]
    NonFiniteValue { axis: String },
}

/// Ordered axes; combinations enumerate with the first axis outermost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn axes(&self) -> &[(String, Vec<ParamValue>)] {
        &self.axes
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.axes.is_empty() {
            return Err(GridError::Empty);
        }
        let mut seen = BTreeSet::new();
        for (name, values) in &self.axes {
            if !seen.insert(name.as_str()) {
                return Err(GridError::DuplicateAxis { axis: name.clone() });
            }
            if values.is_empty() {
                return Err(GridError::EmptyAxis { axis: name.clone() });
            }
            if !values.iter().all(ParamValue::is_finite) {
                return Err(GridError::NonFiniteValue { axis: name.clone() });
            }
        }
        Ok(())
    }

    /// Number of combinations (0 for an empty grid).
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Combination at `index` in grid order (mixed-radix, last axis fastest).
    fn combination(&self, mut index: usize) -> ParamSet {
        let mut set = ParamSet::new();
        for (name, values) in self.axes.iter().rev() {
            let radix = values.len().max(1);
            if let Some(v) = values.get(index % radix) {
                set.insert(name.clone(), v.clone());
            }
            index /= radix;
        }
        set
    }

    /// Full Cartesian product in deterministic grid order.
    pub fn combinations(&self) -> Vec<ParamSet> {
        (0..self.size()).map(|i| self.combination(i)).collect()
    }

    /// `n` distinct combinations chosen with a seeded RNG, returned in grid
    /// order. The same seed always picks the same subset.
    pub fn sample(&self, n: usize, seed: u64) -> Vec<ParamSet> {
        let total = self.size();
        if n >= total {
            return self.combinations();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, total, n).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| self.combination(i)).collect()
    }

    /// Sets that differ from `set` by one step along exactly one axis.
    pub fn neighbors(&self, set: &ParamSet) -> Vec<ParamSet> {
        let mut out = Vec::new();
        for (name, values) in &self.axes {
            let Some(current) = set.get(name) else {
                continue;
            };
            let Some(pos) = values.iter().position(|v| v == current) else {
                continue;
            };
            let steps = [pos.checked_sub(1), Some(pos + 1)];
            for idx in steps.into_iter().flatten() {
                if let Some(v) = values.get(idx) {
                    let mut neighbor = set.clone();
                    neighbor.insert(name.clone(), v.clone());
                    out.push(neighbor);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ParamGrid {
        ParamGrid::new()
            .axis("fast", [5i64, 10])
            .axis("slow", [20i64, 50, 100])
    }

    #[test]
    fn combinations_in_axis_order() {
        let combos = grid().combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], ParamSet::new().with("fast", 5i64).with("slow", 20i64));
        assert_eq!(combos[1], ParamSet::new().with("fast", 5i64).with("slow", 50i64));
        assert_eq!(combos[5], ParamSet::new().with("fast", 10i64).with("slow", 100i64));
    }

    #[test]
    fn validation_errors() {
        assert_eq!(ParamGrid::new().validate(), Err(GridError::Empty));
        assert_eq!(
            ParamGrid::new().axis("a", Vec::<i64>::new()).validate(),
            Err(GridError::EmptyAxis { axis: "a".into() })
        );
        assert_eq!(
            ParamGrid::new().axis("a", [1i64]).axis("a", [2i64]).validate(),
            Err(GridError::DuplicateAxis { axis: "a".into() })
        );
        assert_eq!(
            ParamGrid::new().axis("x", [0.5, f64::NAN]).validate(),
            Err(GridError::NonFiniteValue { axis: "x".into() })
        );
        assert!(grid().validate().is_ok());
    }

    #[test]
    fn sample_is_seeded_and_ordered() {
        let g = ParamGrid::new()
            .axis("a", (0..10).map(i64::from))
            .axis("b", (0..10).map(i64::from));
        let first = g.sample(7, 42);
        assert_eq!(first.len(), 7);
        assert_eq!(first, g.sample(7, 42));

        let all = g.combinations();
        let positions: Vec<usize> = first
            .iter()
            .map(|s| all.iter().position(|c| c == s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(g.sample(500, 1).len(), 100);
    }

    #[test]
    fn neighbors_step_one_axis() {
        let center = ParamSet::new().with("fast", 5i64).with("slow", 50i64);
        let n = grid().neighbors(&center);
        assert_eq!(
            n,
            vec![
                ParamSet::new().with("fast", 10i64).with("slow", 50i64),
                ParamSet::new().with("fast", 5i64).with("slow", 20i64),
                ParamSet::new().with("fast", 5i64).with("slow", 100i64),
            ]
        );
    }

    #[test]
    fn fingerprint_depends_on_content_only() {
        let a = ParamSet::new().with("x", 1i64).with("y", 2.5);
        let b = ParamSet::new().with("y", 2.5).with("x", 1i64);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), a.clone().with("x", 2i64).fingerprint());
        assert_eq!(a.to_string(), "x=1, y=2.5");
    }

    #[test]
    fn untagged_values_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            v: Vec<ParamValue>,
        }
        let doc: Doc = toml::from_str(r#"v = [3, 0.25, true, "ema"]"#).unwrap();
        assert_eq!(
            doc.v,
            vec![
                ParamValue::Int(3),
                ParamValue::Float(0.25),
                ParamValue::Bool(true),
                ParamValue::Text("ema".into())
            ]
        );
    }
}
