//! Per-timeframe bar intake: ordering and sanity checks.
//!
//! Holds only the last accepted timestamp; indicator windows live in the
//! components that need them.

use chrono::NaiveDateTime;

use super::error::TraderError;
use super::ohlcv::{Bar, Timeframe};

#[derive(Debug, Clone)]
pub struct BarSeries {
    timeframe: Timeframe,
    last_timestamp: Option<NaiveDateTime>,
    accepted: usize,
}

impl BarSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        BarSeries {
            timeframe,
            last_timestamp: None,
            accepted: 0,
        }
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }

    pub fn len(&self) -> usize {
        self.accepted
    }

    pub fn is_empty(&self) -> bool {
        self.accepted == 0
    }

    /// Accept the next closed bar of this timeframe.
    ///
    /// Timestamps must be strictly increasing. A rejected bar leaves the
    /// series unchanged.
    pub fn append(&mut self, bar: &Bar) -> Result<(), TraderError> {
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                return Err(TraderError::DataOrdering {
                    timeframe: self.timeframe.to_string(),
                    previous,
                    received: bar.timestamp,
                });
            }
        }

        bar.check().map_err(|reason| TraderError::InvalidBar {
            timestamp: bar.timestamp,
            reason,
        })?;

        self.last_timestamp = Some(bar.timestamp);
        self.accepted += 1;
        Ok(())
    }
}
