//! Slow-timeframe trend detection.
//!
//! Each closed slow bar is classified against the Bollinger band built from
//! the `band_lookback` closes *before* it: a close above the prior upper
//! band with enough volume is a breakout up, below the prior lower band a
//! breakout down. Until that many prior closes exist the state is Neutral.

use chrono::NaiveDateTime;
use std::fmt;
use tracing::{debug, info};

use super::error::TraderError;
use super::indicator::{BollingerBands, RollingWindow};
use super::ohlcv::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendState {
    Up,
    Down,
    Neutral,
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendState::Up => write!(f, "Up"),
            TrendState::Down => write!(f, "Down"),
            TrendState::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Volume confirmation a breakout bar must pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeFilter {
    /// volume >= mean volume of the prior window × multiplier
    Relative { multiplier: f64 },
    /// volume > a fixed threshold, separately for each direction
    Absolute { up: i64, down: i64 },
    Disabled,
}

/// What a bar that breaks out of neither band does to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPolicy {
    /// Keep the last Up/Down state until an opposite breakout.
    HoldUntilReversal,
    /// Fall back to Neutral.
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendConfig {
    pub band_lookback: usize,
    pub band_k: f64,
    pub volume_filter: VolumeFilter,
    pub hold_policy: HoldPolicy,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            band_lookback: 20,
            band_k: 2.0,
            volume_filter: VolumeFilter::Relative { multiplier: 1.0 },
            hold_policy: HoldPolicy::HoldUntilReversal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendDetector {
    config: TrendConfig,
    closes: RollingWindow,
    volumes: RollingWindow,
    state: TrendState,
    last_timestamp: Option<NaiveDateTime>,
    last_bands: Option<BollingerBands>,
}

impl TrendDetector {
    pub fn new(config: TrendConfig) -> Self {
        TrendDetector {
            closes: RollingWindow::new(config.band_lookback),
            volumes: RollingWindow::new(config.band_lookback),
            config,
            state: TrendState::Neutral,
            last_timestamp: None,
            last_bands: None,
        }
    }

    pub fn state(&self) -> TrendState {
        self.state
    }

    /// Bands the most recent bar was classified against.
    pub fn last_bands(&self) -> Option<BollingerBands> {
        self.last_bands
    }

    /// Classify one closed slow bar and return the resulting trend state.
    pub fn on_slow_bar(&mut self, bar: &Bar) -> Result<TrendState, TraderError> {
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                return Err(TraderError::DataOrdering {
                    timeframe: "slow".to_string(),
                    previous,
                    received: bar.timestamp,
                });
            }
        }
        self.last_timestamp = Some(bar.timestamp);

        let bands = BollingerBands::from_window(&self.closes, self.config.band_k);
        let breakout = match bands {
            Some(b) if bar.close > b.upper && self.volume_passes(bar.volume, TrendState::Up) => {
                TrendState::Up
            }
            Some(b) if bar.close < b.lower && self.volume_passes(bar.volume, TrendState::Down) => {
                TrendState::Down
            }
            _ => TrendState::Neutral,
        };

        let next = match (breakout, self.config.hold_policy) {
            (TrendState::Neutral, HoldPolicy::HoldUntilReversal) => self.state,
            (state, _) => state,
        };

        if next != self.state {
            info!(
                timestamp = %bar.timestamp,
                from = %self.state,
                to = %next,
                close = bar.close,
                "trend state changed"
            );
        } else {
            debug!(timestamp = %bar.timestamp, state = %next, "trend state held");
        }

        self.state = next;
        self.last_bands = bands;
        self.closes.push(bar.close);
        self.volumes.push(bar.volume as f64);
        Ok(next)
    }

    fn volume_passes(&self, volume: i64, direction: TrendState) -> bool {
        match self.config.volume_filter {
            VolumeFilter::Disabled => true,
            VolumeFilter::Relative { multiplier } => self
                .volumes
                .mean()
                .is_some_and(|avg| volume as f64 >= avg * multiplier),
            VolumeFilter::Absolute { up, down } => match direction {
                TrendState::Up => volume > up,
                TrendState::Down => volume > down,
                TrendState::Neutral => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(30 * i as i64)
    }

    fn bar(i: usize, close: f64, volume: i64) -> Bar {
        Bar {
            timestamp: ts(i),
            open: close,
            high: close + 0.0005,
            low: close - 0.0005,
            close,
            volume,
        }
    }

    fn config(lookback: usize) -> TrendConfig {
        TrendConfig {
            band_lookback: lookback,
            band_k: 2.0,
            volume_filter: VolumeFilter::Disabled,
            hold_policy: HoldPolicy::HoldUntilReversal,
        }
    }

    /// Alternating closes give a non-zero band around 1.1000.
    fn warm_up(detector: &mut TrendDetector, lookback: usize) -> usize {
        for i in 0..lookback {
            let close = if i % 2 == 0 { 1.0990 } else { 1.1010 };
            assert_eq!(
                detector.on_slow_bar(&bar(i, close, 1000)).unwrap(),
                TrendState::Neutral
            );
        }
        lookback
    }

    #[test]
    fn neutral_during_warmup_even_on_spikes() {
        let mut d = TrendDetector::new(config(5));
        for i in 0..5 {
            let close = 1.0 + i as f64;
            assert_eq!(d.on_slow_bar(&bar(i, close, 1000)).unwrap(), TrendState::Neutral);
        }
        assert!(d.last_bands().is_none());
    }

    #[test]
    fn close_above_prior_upper_band_is_up() {
        let mut d = TrendDetector::new(config(4));
        let next = warm_up(&mut d, 4);
        assert_eq!(d.on_slow_bar(&bar(next, 1.1050, 1000)).unwrap(), TrendState::Up);
        let bands = d.last_bands().unwrap();
        assert!(1.1050 > bands.upper);
    }

    #[test]
    fn close_below_prior_lower_band_is_down() {
        let mut d = TrendDetector::new(config(4));
        let next = warm_up(&mut d, 4);
        assert_eq!(d.on_slow_bar(&bar(next, 1.0950, 1000)).unwrap(), TrendState::Down);
    }

    #[test]
    fn hold_policy_keeps_trend_until_reversal() {
        let mut d = TrendDetector::new(config(4));
        let mut i = warm_up(&mut d, 4);
        assert_eq!(d.on_slow_bar(&bar(i, 1.1050, 1000)).unwrap(), TrendState::Up);
        i += 1;
        // inside the band: still Up
        assert_eq!(d.on_slow_bar(&bar(i, 1.1010, 1000)).unwrap(), TrendState::Up);
        i += 1;
        assert_eq!(d.on_slow_bar(&bar(i, 1.0900, 1000)).unwrap(), TrendState::Down);
    }

    #[test]
    fn reset_policy_returns_to_neutral() {
        let mut d = TrendDetector::new(TrendConfig {
            hold_policy: HoldPolicy::Reset,
            ..config(4)
        });
        let i = warm_up(&mut d, 4);
        assert_eq!(d.on_slow_bar(&bar(i, 1.1050, 1000)).unwrap(), TrendState::Up);
        assert_eq!(d.on_slow_bar(&bar(i + 1, 1.1030, 1000)).unwrap(), TrendState::Neutral);
    }

    #[test]
    fn relative_volume_filter_blocks_thin_breakout() {
        let mut d = TrendDetector::new(TrendConfig {
            volume_filter: VolumeFilter::Relative { multiplier: 1.5 },
            ..config(4)
        });
        let i = warm_up(&mut d, 4);
        assert_eq!(d.on_slow_bar(&bar(i, 1.1050, 1200)).unwrap(), TrendState::Neutral);
        assert_eq!(d.on_slow_bar(&bar(i + 1, 1.1100, 1600)).unwrap(), TrendState::Up);
    }

    #[test]
    fn absolute_volume_filter_is_per_direction() {
        let mut d = TrendDetector::new(TrendConfig {
            volume_filter: VolumeFilter::Absolute { up: 2000, down: 5000 },
            ..config(4)
        });
        let i = warm_up(&mut d, 4);
        assert_eq!(d.on_slow_bar(&bar(i, 1.0900, 3000)).unwrap(), TrendState::Neutral);
        assert_eq!(d.on_slow_bar(&bar(i + 1, 1.1100, 3000)).unwrap(), TrendState::Up);
    }

    #[test]
    fn out_of_order_bar_is_rejected() {
        let mut d = TrendDetector::new(config(4));
        d.on_slow_bar(&bar(3, 1.1, 1000)).unwrap();
        let err = d.on_slow_bar(&bar(2, 1.1, 1000)).unwrap_err();
        assert!(matches!(err, TraderError::DataOrdering { .. }));
        let err = d.on_slow_bar(&bar(3, 1.1, 1000)).unwrap_err();
        assert!(matches!(err, TraderError::DataOrdering { .. }));
    }

    #[test]
    fn separate_detectors_do_not_share_state() {
        let mut a = TrendDetector::new(config(4));
        let mut b = TrendDetector::new(config(4));
        let i = warm_up(&mut a, 4);
        a.on_slow_bar(&bar(i, 1.1050, 1000)).unwrap();
        assert_eq!(a.state(), TrendState::Up);
        assert_eq!(b.state(), TrendState::Neutral);
        assert_eq!(b.on_slow_bar(&bar(0, 1.1050, 1000)).unwrap(), TrendState::Neutral);
    }
}
