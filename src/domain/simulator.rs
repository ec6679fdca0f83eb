//! Position lifecycle under fixed take-profit / stop-loss and a cap on
//! concurrently open positions.
//!
//! Levels are set once at open: `entry ± tp_pips × pip_value` and
//! `entry ∓ sl_pips × pip_value`. On every price update each open position
//! is checked against the update's high/low range; when both levels fall
//! inside the range the stop-loss wins. Closes happen at the level price.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::entry::EntrySignal;
use super::error::TraderError;
use super::ohlcv::Bar;
use super::position::{CloseReason, Direction, Position, PositionId, PositionStatus};
use crate::ports::execution_port::ExecutionGateway;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub tp_pips: f64,
    pub sl_pips: f64,
    pub max_concurrent_positions: usize,
    pub pip_value: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            tp_pips: 80.0,
            sl_pips: 20.0,
            max_concurrent_positions: 10,
            pip_value: 0.0001,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        let positive = [
            ("tp_pips", self.tp_pips),
            ("sl_pips", self.sl_pips),
            ("pip_value", self.pip_value),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TraderError::Validation {
                    reason: format!("{name} must be positive, got {value}"),
                });
            }
        }
        if self.max_concurrent_positions == 0 {
            return Err(TraderError::Validation {
                reason: "max_concurrent_positions must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn take_profit_distance(&self) -> f64 {
        self.tp_pips * self.pip_value
    }

    pub fn stop_loss_distance(&self) -> f64 {
        self.sl_pips * self.pip_value
    }
}

/// Why a signal did not become a position.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// The book is full. A normal business outcome, not a failure.
    #[error("concurrency cap reached")]
    ConcurrencyCapReached,

    #[error("invalid signal: {0}")]
    Invalid(String),

    #[error("gateway refused order: {0}")]
    Gateway(String),
}

impl Rejection {
    pub fn is_cap(&self) -> bool {
        matches!(self, Rejection::ConcurrencyCapReached)
    }
}

pub struct PositionSimulator<G: ExecutionGateway> {
    risk: RiskConfig,
    gateway: G,
    open: BTreeMap<PositionId, Position>,
    next_id: u64,
    rejected_count: usize,
}

impl<G: ExecutionGateway> PositionSimulator<G> {
    pub fn new(risk: RiskConfig, gateway: G) -> Result<Self, TraderError> {
        risk.validate()?;
        Ok(PositionSimulator {
            risk,
            gateway,
            open: BTreeMap::new(),
            next_id: 1,
            rejected_count: 0,
        })
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Open positions in id order.
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Signals refused for any reason since construction.
    pub fn rejected_count(&self) -> usize {
        self.rejected_count
    }

    pub fn on_signal(&mut self, signal: &EntrySignal) -> Result<PositionId, Rejection> {
        let result = self.try_open(signal);
        if let Err(rejection) = &result {
            self.rejected_count += 1;
            debug!(timestamp = %signal.timestamp, %rejection, "signal rejected");
        }
        result
    }

    fn try_open(&mut self, signal: &EntrySignal) -> Result<PositionId, Rejection> {
        let entry = signal.reference_price;
        if !entry.is_finite() || entry <= 0.0 {
            return Err(Rejection::Invalid(format!(
                "reference price must be positive, got {entry}"
            )));
        }
        if self.open.len() >= self.risk.max_concurrent_positions {
            return Err(Rejection::ConcurrencyCapReached);
        }

        let tp = self.risk.take_profit_distance();
        let sl = self.risk.stop_loss_distance();
        let (take_profit, stop_loss) = match signal.direction {
            Direction::Buy => (entry + tp, entry - sl),
            Direction::Sell => (entry - tp, entry + sl),
        };
        if take_profit <= 0.0 || stop_loss <= 0.0 {
            return Err(Rejection::Invalid(format!(
                "levels not positive: tp {take_profit}, sl {stop_loss}"
            )));
        }

        let order_id = self
            .gateway
            .place_order(signal.direction, entry)
            .map_err(|e| Rejection::Gateway(e.to_string()))?;

        let id = PositionId(self.next_id);
        self.next_id += 1;
        info!(
            position = %id,
            direction = %signal.direction,
            entry,
            take_profit,
            stop_loss,
            time = %signal.timestamp,
            "position opened"
        );
        self.open.insert(
            id,
            Position {
                id,
                order_id,
                direction: signal.direction,
                entry_price: entry,
                entry_time: signal.timestamp,
                take_profit,
                stop_loss,
                status: PositionStatus::Open,
                close_reason: None,
                close_price: None,
                close_time: None,
            },
        );
        Ok(id)
    }

    /// Check every open position against the bar's range; returns the
    /// positions closed by it, in id order.
    pub fn on_price_update(&mut self, bar: &Bar) -> Vec<Position> {
        let hits: Vec<(PositionId, CloseReason, f64)> = self
            .open
            .values()
            .filter_map(|pos| {
                if pos.stop_hit(bar) {
                    Some((pos.id, CloseReason::StopLoss, pos.stop_loss))
                } else if pos.target_hit(bar) {
                    Some((pos.id, CloseReason::TakeProfit, pos.take_profit))
                } else {
                    None
                }
            })
            .collect();

        hits.into_iter()
            .filter_map(|(id, reason, price)| self.close_one(id, reason, price, bar.timestamp))
            .collect()
    }

    /// Close everything still open, e.g. at the end of a replay.
    pub fn close_all(&mut self, price: f64, time: NaiveDateTime) -> Vec<Position> {
        let ids: Vec<PositionId> = self.open.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.close_one(id, CloseReason::Manual, price, time))
            .collect()
    }

    fn close_one(
        &mut self,
        id: PositionId,
        reason: CloseReason,
        price: f64,
        time: NaiveDateTime,
    ) -> Option<Position> {
        let mut pos = self.open.remove(&id)?;
        pos.close(reason, price, time);
        if let Err(e) = self.gateway.close_order(pos.order_id, price) {
            warn!(position = %id, order = %pos.order_id, error = %e, "gateway close failed");
        }
        info!(
            position = %id,
            %reason,
            price,
            %time,
            pnl_pips = pos.pnl_pips(self.risk.pip_value).unwrap_or(0.0),
            "position closed"
        );
        Some(pos)
    }
}
