//! Signal interpreter — per-bar signals to target quantities.
//!
//! Candidates are the instruments whose signal reads hold and that have a
//! price on the bar. When there are more candidates than `max_positions`,
//! the configured [`TieBreak`] decides who gets a slot. Everything not
//! selected targets zero.

use crate::domain::InstrumentTable;
use crate::signal::Signal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How much to buy for each selected instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SizingMode {
    /// `portfolio_value / min(active, max_positions)` notional each.
    #[default]
    EqualWeight,
    /// A fixed fraction of portfolio value each.
    FixedFraction(f64),
    /// A fixed share count each.
    Shares(u64),
}

/// Selection order among candidates when capacity is limited.
///
/// Equal ranks, and missing or NaN ranks, fall back to symbol order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    RankDescending,
    RankAscending,
    SymbolOrder,
}

/// What happens to an instrument that is already held and still reads hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldPolicy {
    /// Keep its current quantity and give it priority for a slot.
    #[default]
    KeepExisting,
    /// Resize it every bar like a fresh entry.
    Rebalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalInterpreter {
    pub sizing: SizingMode,
    pub max_positions: usize,
    pub tie_break: TieBreak,
    pub hold_policy: HoldPolicy,
}

impl Default for SignalInterpreter {
    fn default() -> Self {
        Self {
            sizing: SizingMode::EqualWeight,
            max_positions: 1,
            tie_break: TieBreak::default(),
            hold_policy: HoldPolicy::default(),
        }
    }
}

impl SignalInterpreter {
    pub fn new(sizing: SizingMode, max_positions: usize) -> Self {
        Self {
            sizing,
            max_positions,
            ..Self::default()
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_hold_policy(mut self, hold_policy: HoldPolicy) -> Self {
        self.hold_policy = hold_policy;
        self
    }

    /// Target quantity for every instrument that is held or selected.
    ///
    /// Held instruments that are not selected (signal flat, signal absent,
    /// or displaced by capacity) appear with a target of 0.
    pub fn target_positions(
        &self,
        signals: &BTreeMap<String, Signal>,
        holdings: &BTreeMap<String, u64>,
        prices: &BTreeMap<String, f64>,
        instruments: &InstrumentTable,
        portfolio_value: f64,
    ) -> BTreeMap<String, u64> {
        let mut targets: BTreeMap<String, u64> = holdings
            .iter()
            .filter(|(_, &qty)| qty > 0)
            .map(|(sym, _)| (sym.clone(), 0))
            .collect();

        let candidates: Vec<(&str, Option<f64>)> = signals
            .iter()
            .filter(|(sym, sig)| sig.hold && prices.get(*sym).is_some_and(|p| *p > 0.0))
            .map(|(sym, sig)| (sym.as_str(), sig.rank.filter(|r| !r.is_nan())))
            .collect();
        if candidates.is_empty() || self.max_positions == 0 {
            return targets;
        }

        let selected = self.select(candidates, holdings);
        let slots = selected.len();

        for symbol in selected {
            let held = holdings.get(symbol).copied().unwrap_or(0);
            let target = if held > 0 && self.hold_policy == HoldPolicy::KeepExisting {
                held
            } else {
                let instrument = instruments.get(symbol);
                let price = prices.get(symbol).copied().unwrap_or(0.0);
                match self.sizing {
                    SizingMode::EqualWeight => {
                        instrument.quantity_for_notional(portfolio_value / slots as f64, price)
                    }
                    SizingMode::FixedFraction(fraction) => {
                        instrument.quantity_for_notional(portfolio_value * fraction, price)
                    }
                    SizingMode::Shares(n) => instrument.round_down(n),
                }
            };
            targets.insert(symbol.to_string(), target);
        }
        targets
    }

    /// Order candidates and keep the first `max_positions`.
    fn select<'a>(
        &self,
        mut candidates: Vec<(&'a str, Option<f64>)>,
        holdings: &BTreeMap<String, u64>,
    ) -> Vec<&'a str> {
        let is_held = |sym: &str| holdings.get(sym).is_some_and(|q| *q > 0);
        let keep_existing = self.hold_policy == HoldPolicy::KeepExisting;

        // candidates arrive in symbol order; sort_by is stable
        candidates.sort_by(|a, b| {
            let priority = if keep_existing {
                is_held(b.0).cmp(&is_held(a.0))
            } else {
                Ordering::Equal
            };
            priority.then_with(|| self.compare_rank(a.1, b.1))
        });

        candidates
            .into_iter()
            .take(self.max_positions)
            .map(|(sym, _)| sym)
            .collect()
    }

    fn compare_rank(&self, a: Option<f64>, b: Option<f64>) -> Ordering {
        match self.tie_break {
            TieBreak::SymbolOrder => Ordering::Equal,
            TieBreak::RankDescending => rank_order(a, b, |x, y| y.total_cmp(&x)),
            TieBreak::RankAscending => rank_order(a, b, |x, y| x.total_cmp(&y)),
        }
    }
}

/// Ranked before unranked; ranked compared by `cmp`.
fn rank_order(a: Option<f64>, b: Option<f64>, cmp: impl Fn(f64, f64) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Instrument;

    fn signals(entries: &[(&str, bool, Option<f64>)]) -> BTreeMap<String, Signal> {
        entries
            .iter()
            .map(|(sym, hold, rank)| (sym.to_string(), Signal { hold: *hold, rank: *rank }))
            .collect()
    }

    fn prices(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn holdings(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries.iter().map(|(s, q)| (s.to_string(), *q)).collect()
    }

    #[test]
    fn equal_weight_splits_value() {
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 5);
        let targets = interp.target_positions(
            &signals(&[("A", true, None), ("B", true, None), ("C", false, None)]),
            &BTreeMap::new(),
            &prices(&[("A", 10.0), ("B", 20.0), ("C", 5.0)]),
            &InstrumentTable::new(),
            10_000.0,
        );
        assert_eq!(targets, holdings(&[("A", 500), ("B", 250)]));
    }

    #[test]
    fn equal_weight_rounds_to_lots() {
        let instruments = InstrumentTable::new().with(Instrument::new("A", 100).unwrap());
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 1);
        let targets = interp.target_positions(
            &signals(&[("A", true, None)]),
            &BTreeMap::new(),
            &prices(&[("A", 3.0)]),
            &instruments,
            10_000.0,
        );
        assert_eq!(targets["A"], 3_300);
    }

    #[test]
    fn capacity_selects_by_rank_descending() {
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 2);
        let targets = interp.target_positions(
            &signals(&[("A", true, Some(1.0)), ("B", true, Some(3.0)), ("C", true, Some(2.0))]),
            &BTreeMap::new(),
            &prices(&[("A", 10.0), ("B", 10.0), ("C", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets, holdings(&[("B", 50), ("C", 50)]));
    }

    #[test]
    fn capacity_selects_by_rank_ascending() {
        let interp =
            SignalInterpreter::new(SizingMode::EqualWeight, 1).with_tie_break(TieBreak::RankAscending);
        let targets = interp.target_positions(
            &signals(&[("A", true, Some(1.0)), ("B", true, Some(3.0))]),
            &BTreeMap::new(),
            &prices(&[("A", 10.0), ("B", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets, holdings(&[("A", 100)]));
    }

    #[test]
    fn missing_rank_and_ties_fall_back_to_symbol_order() {
        let interp = SignalInterpreter::new(SizingMode::Shares(1), 2);
        let targets = interp.target_positions(
            &signals(&[("A", true, None), ("B", true, Some(1.0)), ("C", true, Some(1.0))]),
            &BTreeMap::new(),
            &prices(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]),
            &InstrumentTable::new(),
            100.0,
        );
        assert_eq!(targets, holdings(&[("B", 1), ("C", 1)]));

        let by_symbol = interp.with_tie_break(TieBreak::SymbolOrder);
        let targets = by_symbol.target_positions(
            &signals(&[("C", true, Some(9.0)), ("A", true, None), ("B", true, Some(1.0))]),
            &BTreeMap::new(),
            &prices(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]),
            &InstrumentTable::new(),
            100.0,
        );
        assert_eq!(targets, holdings(&[("A", 1), ("B", 1)]));
    }

    #[test]
    fn held_instruments_keep_quantity_and_priority() {
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 1);
        let targets = interp.target_positions(
            &signals(&[("A", true, Some(1.0)), ("B", true, Some(5.0))]),
            &holdings(&[("A", 7)]),
            &prices(&[("A", 10.0), ("B", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets, holdings(&[("A", 7)]));
    }

    #[test]
    fn rebalance_resizes_and_can_displace() {
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 1)
            .with_hold_policy(HoldPolicy::Rebalance);
        let targets = interp.target_positions(
            &signals(&[("A", true, Some(1.0)), ("B", true, Some(5.0))]),
            &holdings(&[("A", 7)]),
            &prices(&[("A", 10.0), ("B", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets, holdings(&[("A", 0), ("B", 100)]));
    }

    #[test]
    fn exit_on_flat_or_missing_signal() {
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 3);
        let targets = interp.target_positions(
            &signals(&[("A", false, None)]),
            &holdings(&[("A", 10), ("B", 20)]),
            &prices(&[("A", 10.0), ("B", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets, holdings(&[("A", 0), ("B", 0)]));
    }

    #[test]
    fn fixed_fraction_and_shares() {
        let fraction = SignalInterpreter::new(SizingMode::FixedFraction(0.25), 4);
        let targets = fraction.target_positions(
            &signals(&[("A", true, None)]),
            &BTreeMap::new(),
            &prices(&[("A", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets["A"], 25);

        let instruments = InstrumentTable::new().with(Instrument::new("A", 10).unwrap());
        let shares = SignalInterpreter::new(SizingMode::Shares(55), 4);
        let targets = shares.target_positions(
            &signals(&[("A", true, None)]),
            &BTreeMap::new(),
            &prices(&[("A", 10.0)]),
            &instruments,
            1_000.0,
        );
        assert_eq!(targets["A"], 50);
    }

    #[test]
    fn unpriced_candidates_are_ignored() {
        let interp = SignalInterpreter::new(SizingMode::EqualWeight, 2);
        let targets = interp.target_positions(
            &signals(&[("A", true, None), ("B", true, None)]),
            &BTreeMap::new(),
            &prices(&[("A", 10.0)]),
            &InstrumentTable::new(),
            1_000.0,
        );
        assert_eq!(targets, holdings(&[("A", 100)]));
    }
}
