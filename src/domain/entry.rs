//! Fast-timeframe entry evaluation.
//!
//! The decision on bar `i` looks only at bar `i-1`: its close against the
//! EMA value as of that bar, widened by a pip threshold. The trend state
//! passed in gates direction; Neutral never produces a signal.

use chrono::NaiveDateTime;
use tracing::debug;

use super::indicator::Ema;
use super::ohlcv::Bar;
use super::position::Direction;
use super::trend::TrendState;

/// Which price of the signalling bar becomes the reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPrice {
    Close,
    Open,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryConfig {
    pub ema_period: usize,
    pub pip_threshold: f64,
    pub entry_price: EntryPrice,
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig {
            ema_period: 10,
            pip_threshold: 5.0,
            entry_price: EntryPrice::Close,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub reference_price: f64,
    /// Trend state the signal was gated by.
    pub trend: TrendState,
}

#[derive(Debug, Clone)]
pub struct EntryEvaluator {
    config: EntryConfig,
    threshold: f64,
    ema: Ema,
    prev_close: Option<f64>,
    prev_ema: Option<f64>,
}

impl EntryEvaluator {
    pub fn new(config: EntryConfig, pip_value: f64) -> Self {
        EntryEvaluator {
            threshold: config.pip_threshold * pip_value,
            ema: Ema::new(config.ema_period),
            config,
            prev_close: None,
            prev_ema: None,
        }
    }

    /// Current EMA, including the latest bar.
    pub fn ema(&self) -> Option<f64> {
        self.ema.value()
    }

    /// Threshold in price units.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn on_fast_bar(&mut self, bar: &Bar, trend: TrendState) -> Option<EntrySignal> {
        let direction = match (self.prev_close, self.prev_ema, trend) {
            (Some(close), Some(ema), TrendState::Up) if close > ema + self.threshold => {
                Some(Direction::Buy)
            }
            (Some(close), Some(ema), TrendState::Down) if close < ema - self.threshold => {
                Some(Direction::Sell)
            }
            _ => None,
        };

        self.prev_ema = self.ema.update(bar.close);
        self.prev_close = Some(bar.close);

        let direction = direction?;
        let reference_price = match self.config.entry_price {
            EntryPrice::Close => bar.close,
            EntryPrice::Open => bar.open,
        };
        debug!(
            timestamp = %bar.timestamp,
            %direction,
            %trend,
            reference_price,
            "entry signal"
        );
        Some(EntrySignal {
            timestamp: bar.timestamp,
            direction,
            reference_price,
            trend,
        })
    }
}
