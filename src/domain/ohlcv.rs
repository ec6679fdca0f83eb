//! OHLCV bar and timeframe representation.

use chrono::{Duration, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// One closed price bar. `timestamp` is the bar's open time (UTC).
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Instant at which the bar is complete.
    pub fn close_time(&self, timeframe: Timeframe) -> NaiveDateTime {
        self.timestamp + timeframe.duration()
    }

    /// Structural sanity of the price fields.
    pub fn check(&self) -> Result<(), String> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err("prices must be finite and positive".into());
        }
        if self.high < self.low {
            return Err(format!("high {} below low {}", self.high, self.low));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err("open/close outside high-low range".into());
        }
        if self.volume < 0 {
            return Err(format!("negative volume {}", self.volume));
        }
        Ok(())
    }
}

/// Bar interval, labelled the MetaTrader way (`M3`, `M30`, `H1`, `D1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub const M3: Timeframe = Timeframe { minutes: 3 };
    pub const M30: Timeframe = Timeframe { minutes: 30 };

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes > 0).then_some(Timeframe { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.minutes;
        if m % 1440 == 0 {
            write!(f, "D{}", m / 1440)
        } else if m % 60 == 0 {
            write!(f, "H{}", m / 60)
        } else {
            write!(f, "M{}", m)
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let (unit, count) = s.split_at(s.chars().next().map_or(0, char::len_utf8));
        let count: u32 = count
            .parse()
            .map_err(|_| format!("invalid timeframe '{s}'"))?;
        let per_unit = match unit {
            "M" => 1,
            "H" => 60,
            "D" => 1440,
            _ => return Err(format!("invalid timeframe unit in '{s}'")),
        };
        count
            .checked_mul(per_unit)
            .and_then(Timeframe::from_minutes)
            .ok_or_else(|| format!("invalid timeframe '{s}'"))
    }
}
