//! In-memory report sink.

use crate::domain::error::TraderError;
use crate::domain::metrics::Metrics;
use crate::domain::position::Position;
use crate::ports::report_port::ReportSink;

#[derive(Debug, Default)]
pub struct TradeLog {
    positions: Vec<Position>,
    metrics: Option<Metrics>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed positions in the order they were reported.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Set once the run has finished.
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }
}

impl ReportSink for TradeLog {
    fn record(&mut self, position: &Position) -> Result<(), TraderError> {
        if position.is_open() {
            return Err(TraderError::Report {
                reason: format!("position {} reported while still open", position.id),
            });
        }
        self.positions.push(position.clone());
        Ok(())
    }

    fn finish(&mut self, metrics: &Metrics) -> Result<(), TraderError> {
        self.metrics = Some(metrics.clone());
        Ok(())
    }
}
