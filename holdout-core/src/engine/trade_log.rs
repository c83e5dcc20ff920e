//! Trade logger — append-only ledger of closed legs.

use crate::domain::TradeRecord;
use serde::{Deserialize, Serialize};

/// Aggregate statistics over a set of closed legs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trade_count: usize,
    pub winners: usize,
    pub losers: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// gross_profit / gross_loss, capped at [`PROFIT_FACTOR_CAP`].
    pub profit_factor: f64,
    pub net_pnl: f64,
    pub total_costs: f64,
    pub avg_bars_held: f64,
}

/// Profit factor reported when there are winners but no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

#[derive(Debug, Clone, Default)]
pub struct TradeLogger {
    trades: Vec<TradeRecord>,
}

impl TradeLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    pub fn stats(&self) -> TradeStats {
        trade_stats(&self.trades)
    }
}

pub fn trade_stats(trades: &[TradeRecord]) -> TradeStats {
    if trades.is_empty() {
        return TradeStats::default();
    }

    let mut stats = TradeStats {
        trade_count: trades.len(),
        ..TradeStats::default()
    };
    let mut bars = 0usize;
    for t in trades {
        if t.is_winner() {
            stats.winners += 1;
            stats.gross_profit += t.net_pnl;
        } else if t.net_pnl < 0.0 {
            stats.losers += 1;
            stats.gross_loss += -t.net_pnl;
        }
        stats.net_pnl += t.net_pnl;
        stats.total_costs += t.costs;
        bars += t.bars_held;
    }

    let n = trades.len() as f64;
    stats.win_rate = stats.winners as f64 / n;
    stats.avg_bars_held = bars as f64 / n;
    stats.profit_factor = if stats.gross_loss > 1e-10 {
        (stats.gross_profit / stats.gross_loss).min(PROFIT_FACTOR_CAP)
    } else if stats.gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    };
    stats
}
