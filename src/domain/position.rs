//! Simulated position records.

use chrono::NaiveDateTime;
use std::fmt;

use super::ohlcv::Bar;
use crate::ports::execution_port::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1 for Buy, -1 for Sell.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "Buy"),
            Direction::Sell => write!(f, "Sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "TP"),
            CloseReason::StopLoss => write!(f, "SL"),
            CloseReason::Manual => write!(f, "Manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub order_id: OrderId,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    pub close_price: Option<f64>,
    pub close_time: Option<NaiveDateTime>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Buy
    }

    /// Did the bar's range reach the stop-loss level?
    pub fn stop_hit(&self, bar: &Bar) -> bool {
        if self.is_long() {
            bar.low <= self.stop_loss
        } else {
            bar.high >= self.stop_loss
        }
    }

    /// Did the bar's range reach the take-profit level?
    pub fn target_hit(&self, bar: &Bar) -> bool {
        if self.is_long() {
            bar.high >= self.take_profit
        } else {
            bar.low <= self.take_profit
        }
    }

    /// Realised result in pips; `None` while open.
    pub fn pnl_pips(&self, pip_value: f64) -> Option<f64> {
        let close = self.close_price?;
        Some(self.direction.sign() * (close - self.entry_price) / pip_value)
    }

    /// Closed with a strictly positive result.
    pub fn is_win(&self, pip_value: f64) -> bool {
        self.pnl_pips(pip_value).is_some_and(|p| p > 0.0)
    }

    pub(crate) fn close(&mut self, reason: CloseReason, price: f64, time: NaiveDateTime) {
        self.status = PositionStatus::Closed;
        self.close_reason = Some(reason);
        self.close_price = Some(price);
        self.close_time = Some(time);
    }
}
