//! CSV report sink: `trades.csv` with one row per closed position, written
//! as positions close, and a single-row `metrics.csv` at the end of the run.

use crate::domain::error::TraderError;
use crate::domain::metrics::Metrics;
use crate::domain::position::{CloseReason, Position};
use crate::ports::report_port::ReportSink;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
struct TradeRow {
    id: u64,
    order_id: u64,
    direction: String,
    entry_time: String,
    entry_price: f64,
    take_profit: f64,
    stop_loss: f64,
    exit_time: String,
    exit_price: f64,
    exit_reason: String,
    pnl_pips: f64,
}

#[derive(Debug, Serialize)]
struct MetricsRow {
    total_trades: usize,
    winning_trades: usize,
    losing_trades: usize,
    breakeven_trades: usize,
    win_rate_pct: f64,
    total_pnl_pips: f64,
    average_win_pips: f64,
    average_loss_pips: f64,
    largest_win_pips: f64,
    largest_loss_pips: f64,
    profit_factor: f64,
    max_consecutive_wins: usize,
    max_consecutive_losses: usize,
    max_drawdown_pips: f64,
    tp_exits: usize,
    sl_exits: usize,
    manual_exits: usize,
}

pub struct CsvReportAdapter {
    output_dir: PathBuf,
    pip_value: f64,
    trades: csv::Writer<File>,
    rows: usize,
}

fn report_err(context: &str, e: impl std::fmt::Display) -> TraderError {
    TraderError::Report {
        reason: format!("{context}: {e}"),
    }
}

impl CsvReportAdapter {
    /// Creates `output_dir` if needed and truncates any previous `trades.csv`.
    pub fn create(output_dir: &Path, pip_value: f64) -> Result<Self, TraderError> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join("trades.csv");
        let trades = csv::Writer::from_path(&path)
            .map_err(|e| report_err(&format!("cannot create {}", path.display()), e))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            pip_value,
            trades,
            rows: 0,
        })
    }

    pub fn trades_path(&self) -> PathBuf {
        self.output_dir.join("trades.csv")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join("metrics.csv")
    }
}

impl ReportSink for CsvReportAdapter {
    fn record(&mut self, position: &Position) -> Result<(), TraderError> {
        let (Some(exit_time), Some(exit_price), Some(reason)) =
            (position.close_time, position.close_price, position.close_reason)
        else {
            return Err(TraderError::Report {
                reason: format!("position {} reported while still open", position.id),
            });
        };
        let row = TradeRow {
            id: position.id.0,
            order_id: position.order_id.0,
            direction: position.direction.to_string(),
            entry_time: position.entry_time.format(TIME_FORMAT).to_string(),
            entry_price: position.entry_price,
            take_profit: position.take_profit,
            stop_loss: position.stop_loss,
            exit_time: exit_time.format(TIME_FORMAT).to_string(),
            exit_price,
            exit_reason: reason.to_string(),
            pnl_pips: position.pnl_pips(self.pip_value).unwrap_or(0.0),
        };
        self.trades
            .serialize(&row)
            .map_err(|e| report_err("cannot write trade row", e))?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self, metrics: &Metrics) -> Result<(), TraderError> {
        self.trades.flush()?;

        let path = self.metrics_path();
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| report_err(&format!("cannot create {}", path.display()), e))?;
        writer
            .serialize(MetricsRow {
                total_trades: metrics.total_trades,
                winning_trades: metrics.trades_won,
                losing_trades: metrics.trades_lost,
                breakeven_trades: metrics.trades_breakeven,
                win_rate_pct: metrics.win_rate * 100.0,
                total_pnl_pips: metrics.total_pnl_pips,
                average_win_pips: metrics.avg_win_pips,
                average_loss_pips: metrics.avg_loss_pips,
                largest_win_pips: metrics.largest_win_pips,
                largest_loss_pips: metrics.largest_loss_pips,
                profit_factor: metrics.profit_factor,
                max_consecutive_wins: metrics.max_consecutive_wins,
                max_consecutive_losses: metrics.max_consecutive_losses,
                max_drawdown_pips: metrics.max_drawdown_pips,
                tp_exits: metrics.exit_count(CloseReason::TakeProfit),
                sl_exits: metrics.exit_count(CloseReason::StopLoss),
                manual_exits: metrics.exit_count(CloseReason::Manual),
            })
            .map_err(|e| report_err("cannot write metrics row", e))?;
        writer.flush()?;

        info!(
            trades = self.rows,
            dir = %self.output_dir.display(),
            "report written"
        );
        Ok(())
    }
}
