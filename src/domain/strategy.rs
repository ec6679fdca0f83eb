//! Strategy parameter set for one run.

use super::entry::EntryConfig;
use super::error::TraderError;
use super::ohlcv::Timeframe;
use super::simulator::RiskConfig;
use super::trend::{TrendConfig, VolumeFilter};

/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub symbol: String,
    pub slow_timeframe: Timeframe,
    pub fast_timeframe: Timeframe,
    pub trend: TrendConfig,
    pub entry: EntryConfig,
    pub risk: RiskConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            symbol: "EURUSD".into(),
            slow_timeframe: Timeframe::M30,
            fast_timeframe: Timeframe::M3,
            trend: TrendConfig::default(),
            entry: EntryConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        let invalid = |reason: String| Err(TraderError::Validation { reason });

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".into());
        }
        if self.slow_timeframe.minutes() <= self.fast_timeframe.minutes() {
            return invalid(format!(
                "slow timeframe {} must be longer than fast timeframe {}",
                self.slow_timeframe, self.fast_timeframe
            ));
        }
        if self.trend.band_lookback < 2 {
            return invalid(format!(
                "band_lookback must be at least 2, got {}",
                self.trend.band_lookback
            ));
        }
        if !self.trend.band_k.is_finite() || self.trend.band_k <= 0.0 {
            return invalid(format!("band_k must be positive, got {}", self.trend.band_k));
        }
        match self.trend.volume_filter {
            VolumeFilter::Relative { multiplier } if !(multiplier > 0.0) || !multiplier.is_finite() => {
                return invalid(format!("volume_multiplier must be positive, got {multiplier}"));
            }
            VolumeFilter::Absolute { up, down } if up <= 0 || down <= 0 => {
                return invalid(format!(
                    "volume thresholds must be positive, got up={up} down={down}"
                ));
            }
            _ => {}
        }
        if self.entry.ema_period == 0 {
            return invalid("ema_period must be positive".into());
        }
        if !self.entry.pip_threshold.is_finite() || self.entry.pip_threshold <= 0.0 {
            return invalid(format!(
                "pip_threshold must be positive, got {}",
                self.entry.pip_threshold
            ));
        }
        self.risk.validate()
    }
}
