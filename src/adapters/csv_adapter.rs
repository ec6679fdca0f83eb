//! CSV file data adapter.
//!
//! One file per series, named `{SYMBOL}_{TIMEFRAME}.csv` (e.g.
//! `EURUSD_M30.csv`). Columns are located by header name so MetaTrader
//! exports (`time`, `tick_volume`) and plain exports (`datetime`,
//! `volume`) both load. Rows are returned in file order: ordering is
//! checked by the core, not repaired here.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{Bar, Timeframe};
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
];

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }

    fn locate_columns(headers: &csv::StringRecord) -> Result<Columns, TraderError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
                .ok_or_else(|| TraderError::DataRead {
                    reason: format!("missing {} column", names[0]),
                })
        };
        Ok(Columns {
            time: find(&["datetime", "time", "date", "timestamp"])?,
            open: find(&["open"])?,
            high: find(&["high"])?,
            low: find(&["low"])?,
            close: find(&["close"])?,
            volume: find(&["volume", "tick_volume", "real_volume"])?,
        })
    }
}

/// Naive UTC timestamp from the formats seen in exported bar files.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_utc());
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn field<'a>(record: &'a csv::StringRecord, index: usize, name: &str, line: u64) -> Result<&'a str, TraderError> {
    record.get(index).map(str::trim).ok_or_else(|| TraderError::DataRead {
        reason: format!("line {line}: missing {name} value"),
    })
}

fn price(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, TraderError> {
    field(record, index, name, line)?
        .parse()
        .map_err(|e| TraderError::DataRead {
            reason: format!("line {line}: invalid {name} value: {e}"),
        })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, TraderError> {
        let path = self.csv_path(symbol, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| TraderError::DataRead {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| TraderError::DataRead {
            reason: format!("CSV header error: {}", e),
        })?;
        let cols = Self::locate_columns(headers)?;
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| TraderError::DataRead {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map_or(0, |p| p.line());

            let raw_time = field(&record, cols.time, "time", line)?;
            let timestamp = parse_timestamp(raw_time).ok_or_else(|| TraderError::DataRead {
                reason: format!("line {line}: invalid timestamp '{raw_time}'"),
            })?;

            if start.is_some_and(|s| timestamp < s) || end.is_some_and(|e| timestamp > e) {
                continue;
            }

            let volume_raw = field(&record, cols.volume, "volume", line)?;
            // some exporters write volume as a float
            let volume = volume_raw
                .parse::<i64>()
                .or_else(|_| volume_raw.parse::<f64>().map(|v| v.round() as i64))
                .map_err(|e| TraderError::DataRead {
                    reason: format!("line {line}: invalid volume value: {e}"),
                })?;

            bars.push(Bar {
                timestamp,
                open: price(&record, cols.open, "open", line)?,
                high: price(&record, cols.high, "high", line)?,
                low: price(&record, cols.low, "low", line)?,
                close: price(&record, cols.close, "close", line)?,
                volume,
            });
        }

        if bars.is_empty() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            });
        }
        info!(symbol, %timeframe, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }

    fn list_series(&self) -> Result<Vec<(String, Timeframe)>, TraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TraderError::DataRead {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut series = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TraderError::DataRead {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            let Some(stem) = name_str.strip_suffix(".csv") else {
                continue;
            };
            match stem.rsplit_once('_') {
                Some((symbol, tf)) => match tf.parse::<Timeframe>() {
                    Ok(timeframe) => series.push((symbol.to_string(), timeframe)),
                    Err(_) => debug!(file = %name_str, "skipping file without timeframe suffix"),
                },
                None => debug!(file = %name_str, "skipping file without timeframe suffix"),
            }
        }

        series.sort_by(|a, b| (&a.0, a.1.minutes()).cmp(&(&b.0, b.1.minutes())));
        Ok(series)
    }
}
