//! Trade statistics over closed positions, all measured in pips.

use std::collections::BTreeMap;

use super::position::{CloseReason, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    /// Fraction in `[0, 1]`.
    pub win_rate: f64,
    pub total_pnl_pips: f64,
    pub avg_win_pips: f64,
    /// Magnitude, always >= 0.
    pub avg_loss_pips: f64,
    pub largest_win_pips: f64,
    /// Magnitude, always >= 0.
    pub largest_loss_pips: f64,
    pub profit_factor: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Largest peak-to-trough fall of the cumulative pip curve.
    pub max_drawdown_pips: f64,
    pub exit_reasons: BTreeMap<CloseReason, usize>,
}

impl Metrics {
    /// Positions are taken in the order given; open ones are skipped.
    pub fn compute(positions: &[Position], pip_value: f64) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut win_streak = 0usize;
        let mut loss_streak = 0usize;
        let mut max_consecutive_wins = 0usize;
        let mut max_consecutive_losses = 0usize;
        let mut exit_reasons = BTreeMap::new();
        let mut curve = Vec::with_capacity(positions.len());
        let mut cumulative = 0.0_f64;

        for pos in positions {
            let Some(pnl) = pos.pnl_pips(pip_value) else {
                continue;
            };
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
                win_streak += 1;
                loss_streak = 0;
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
                loss_streak += 1;
                win_streak = 0;
            } else {
                // breakeven leaves both streaks as they are
                trades_breakeven += 1;
            }
            max_consecutive_wins = max_consecutive_wins.max(win_streak);
            max_consecutive_losses = max_consecutive_losses.max(loss_streak);

            if let Some(reason) = pos.close_reason {
                *exit_reasons.entry(reason).or_insert(0) += 1;
            }
            cumulative += pnl;
            curve.push(cumulative);
        }

        let total_trades = trades_won + trades_lost + trades_breakeven;
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win_pips = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss_pips = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        Metrics {
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            total_pnl_pips: total_wins - total_losses,
            avg_win_pips,
            avg_loss_pips,
            largest_win_pips: largest_win,
            largest_loss_pips: largest_loss,
            profit_factor,
            max_consecutive_wins,
            max_consecutive_losses,
            max_drawdown_pips: compute_drawdown(&curve),
            exit_reasons,
        }
    }

    pub fn exit_count(&self, reason: CloseReason) -> usize {
        self.exit_reasons.get(&reason).copied().unwrap_or(0)
    }
}

/// The curve starts from an implicit zero before the first trade.
fn compute_drawdown(curve: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for &point in curve {
        if point > peak {
            peak = point;
        } else {
            max_dd = max_dd.max(peak - point);
        }
    }
    max_dd
}
