//! Reporting sink port trait.

use crate::domain::error::TraderError;
use crate::domain::metrics::Metrics;
use crate::domain::position::Position;

/// Receives every position exactly once, at the moment it closes.
pub trait ReportSink {
    fn record(&mut self, position: &Position) -> Result<(), TraderError>;

    /// Called once at the end of a run. Default: nothing to flush.
    fn finish(&mut self, _metrics: &Metrics) -> Result<(), TraderError> {
        Ok(())
    }
}
