//! Bollinger Bands.
//!
//! - Middle: simple moving average over the window
//! - Upper: middle + (k × stddev)
//! - Lower: middle - (k × stddev)
//!
//! StdDev is the population standard deviation (divides by N, not N-1).

use super::RollingWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Bands over a full window; `None` while the window is warming up.
    pub fn from_window(window: &RollingWindow, k: f64) -> Option<Self> {
        if !window.is_full() {
            return None;
        }
        let middle = window.mean()?;
        let stddev = window.stddev()?;
        Some(BollingerBands {
            upper: middle + k * stddev,
            middle,
            lower: middle - k * stddev,
        })
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}
