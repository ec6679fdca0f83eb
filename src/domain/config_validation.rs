//! Configuration validation and construction.
//!
//! Every numeric parameter must be positive and every keyword known before
//! a run starts; the resulting `StrategyConfig` is immutable afterwards.

use crate::domain::entry::{EntryConfig, EntryPrice};
use crate::domain::error::TraderError;
use crate::domain::ohlcv::Timeframe;
use crate::domain::simulator::RiskConfig;
use crate::domain::strategy::StrategyConfig;
use crate::domain::trend::{HoldPolicy, TrendConfig, VolumeFilter};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;

/// Where the historical bars come from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub folder: PathBuf,
    pub symbol: String,
    pub slow_timeframe: Timeframe,
    pub fast_timeframe: Timeframe,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    build_data_config(config).map(|_| ())
}

pub fn build_data_config(config: &dyn ConfigPort) -> Result<DataConfig, TraderError> {
    let folder = match config.get_string("data", "folder") {
        Some(f) if !f.trim().is_empty() => PathBuf::from(f.trim()),
        _ => {
            return Err(TraderError::ConfigMissing {
                section: "data".to_string(),
                key: "folder".to_string(),
            });
        }
    };
    let symbol = read_symbol(config)?;
    let (slow_timeframe, fast_timeframe) = read_timeframes(config)?;
    let start = parse_bound(config, "start_date", false)?;
    let end = parse_bound(config, "end_date", true)?;

    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(invalid("data", "start_date", "start_date must be before end_date"));
        }
    }

    Ok(DataConfig {
        folder,
        symbol,
        slow_timeframe,
        fast_timeframe,
        start,
        end,
    })
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    read_trend(config)?;
    read_entry(config)?;
    read_risk(config)?;
    read_timeframes(config)?;
    Ok(())
}

pub fn build_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, TraderError> {
    let (slow_timeframe, fast_timeframe) = read_timeframes(config)?;
    let strategy = StrategyConfig {
        symbol: read_symbol(config)?,
        slow_timeframe,
        fast_timeframe,
        trend: read_trend(config)?,
        entry: read_entry(config)?,
        risk: read_risk(config)?,
    };
    strategy.validate()?;
    Ok(strategy)
}

fn invalid(section: &str, key: &str, reason: &str) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn read_symbol(config: &dyn ConfigPort) -> Result<String, TraderError> {
    let symbol = config
        .get_string("data", "symbol")
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_else(|| "EURUSD".to_string());
    if symbol.is_empty() {
        return Err(invalid("data", "symbol", "symbol must not be empty"));
    }
    Ok(symbol)
}

fn read_timeframe(
    config: &dyn ConfigPort,
    key: &str,
    default: Timeframe,
) -> Result<Timeframe, TraderError> {
    match config.get_string("data", key) {
        None => Ok(default),
        Some(label) => label
            .parse()
            .map_err(|reason: String| invalid("data", key, &reason)),
    }
}

fn read_timeframes(config: &dyn ConfigPort) -> Result<(Timeframe, Timeframe), TraderError> {
    let slow = read_timeframe(config, "slow_timeframe", Timeframe::M30)?;
    let fast = read_timeframe(config, "fast_timeframe", Timeframe::M3)?;
    if slow.minutes() <= fast.minutes() {
        return Err(invalid(
            "data",
            "slow_timeframe",
            &format!("slow timeframe {slow} must be longer than fast timeframe {fast}"),
        ));
    }
    Ok((slow, fast))
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM-DD HH:MM[:SS]`. A bare end date covers
/// the whole day.
fn parse_bound(
    config: &dyn ConfigPort,
    key: &str,
    end_of_day: bool,
) -> Result<Option<NaiveDateTime>, TraderError> {
    let Some(raw) = config.get_string("data", key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(dt));
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        invalid(
            "data",
            key,
            &format!("invalid {key} format, expected YYYY-MM-DD"),
        )
    })?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time)
}

fn positive_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TraderError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(value)
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TraderError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(value)
}

fn read_trend(config: &dyn ConfigPort) -> Result<TrendConfig, TraderError> {
    let band_lookback = positive_int(config, "trend", "band_lookback", 20)?;
    if band_lookback < 2 {
        return Err(invalid("trend", "band_lookback", "band_lookback must be at least 2"));
    }
    let band_k = positive_double(config, "trend", "band_k", 2.0)?;

    let volume_filter = match config.get_keyword("trend", "volume_filter", "relative").as_str() {
        "relative" => VolumeFilter::Relative {
            multiplier: positive_double(config, "trend", "volume_multiplier", 1.0)?,
        },
        "absolute" => VolumeFilter::Absolute {
            up: positive_int(config, "trend", "uptrend_volume_threshold", 8000)?,
            down: positive_int(config, "trend", "downtrend_volume_threshold", 8000)?,
        },
        "none" | "disabled" => VolumeFilter::Disabled,
        other => {
            return Err(invalid(
                "trend",
                "volume_filter",
                &format!("unknown volume filter '{other}', expected relative, absolute or none"),
            ));
        }
    };

    let hold_policy = match config.get_keyword("trend", "hold_policy", "hold").as_str() {
        "hold" => HoldPolicy::HoldUntilReversal,
        "reset" => HoldPolicy::Reset,
        other => {
            return Err(invalid(
                "trend",
                "hold_policy",
                &format!("unknown hold policy '{other}', expected hold or reset"),
            ));
        }
    };

    Ok(TrendConfig {
        band_lookback: band_lookback as usize,
        band_k,
        volume_filter,
        hold_policy,
    })
}

fn read_entry(config: &dyn ConfigPort) -> Result<EntryConfig, TraderError> {
    let ema_period = positive_int(config, "entry", "ema_period", 10)?;
    let pip_threshold = positive_double(config, "entry", "pip_threshold", 5.0)?;
    let entry_price = match config.get_keyword("entry", "entry_price", "close").as_str() {
        "close" => EntryPrice::Close,
        "open" => EntryPrice::Open,
        other => {
            return Err(invalid(
                "entry",
                "entry_price",
                &format!("unknown entry price '{other}', expected close or open"),
            ));
        }
    };
    Ok(EntryConfig {
        ema_period: ema_period as usize,
        pip_threshold,
        entry_price,
    })
}

fn read_risk(config: &dyn ConfigPort) -> Result<RiskConfig, TraderError> {
    Ok(RiskConfig {
        tp_pips: positive_double(config, "risk", "tp_pips", 80.0)?,
        sl_pips: positive_double(config, "risk", "sl_pips", 20.0)?,
        max_concurrent_positions: positive_int(config, "risk", "max_concurrent_positions", 10)?
            as usize,
        pip_value: positive_double(config, "risk", "pip_value", 0.0001)?,
    })
}
