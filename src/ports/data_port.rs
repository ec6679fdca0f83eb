//! Historical bar source port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{Bar, Timeframe};
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Bars for one symbol and timeframe, in source order, restricted to
    /// `[start, end]` when bounds are given.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, TraderError>;

    /// Every (symbol, timeframe) pair the source can serve.
    fn list_series(&self) -> Result<Vec<(String, Timeframe)>, TraderError>;
}
