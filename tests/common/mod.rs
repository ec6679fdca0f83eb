#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use mtftrader::domain::entry::EntryConfig;
use mtftrader::domain::error::TraderError;
pub use mtftrader::domain::ohlcv::{Bar, Timeframe};
use mtftrader::domain::position::Direction;
use mtftrader::domain::simulator::RiskConfig;
use mtftrader::domain::strategy::StrategyConfig;
use mtftrader::domain::trend::{HoldPolicy, TrendConfig, VolumeFilter};
use mtftrader::ports::execution_port::{ExecutionGateway, OrderId};
use std::fs;
use std::path::Path;

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn at(minutes: i64) -> NaiveDateTime {
    t0() + Duration::minutes(minutes)
}

pub fn make_bar(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp,
        open,
        high,
        low,
        close,
        volume: 1000,
    }
}

/// Small-window strategy used by the scenario fixtures.
pub fn scenario_config() -> StrategyConfig {
    StrategyConfig {
        trend: TrendConfig {
            band_lookback: 3,
            band_k: 2.0,
            volume_filter: VolumeFilter::Disabled,
            hold_policy: HoldPolicy::HoldUntilReversal,
        },
        entry: EntryConfig {
            ema_period: 3,
            ..EntryConfig::default()
        },
        risk: RiskConfig {
            max_concurrent_positions: 1,
            ..RiskConfig::default()
        },
        ..StrategyConfig::default()
    }
}

/// Three quiet M30 bars, then an upside breakout bar opening at 10:30.
pub fn scenario_slow() -> Vec<Bar> {
    let mut bars: Vec<Bar> = [1.0990, 1.1010, 1.0990]
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(at(30 * i as i64), c, c + 0.0005, c - 0.0005, c))
        .collect();
    bars.push(make_bar(at(90), 1.1000, 1.1055, 1.0995, 1.1050));
    bars
}

/// Flat M3 bars until 10:57, then five bars that take profit on one
/// position, stop out a second and leave a third open.
pub fn scenario_fast() -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..40)
        .map(|i| make_bar(at(3 * i), 1.1000, 1.1002, 1.0998, 1.1000))
        .collect();
    let tail = [
        (1.1000, 1.1022, 1.0999, 1.1020),
        (1.1020, 1.1033, 1.1018, 1.1030),
        (1.1030, 1.1042, 1.1028, 1.1040),
        (1.1040, 1.1115, 1.1038, 1.1100),
        (1.1100, 1.1101, 1.1070, 1.1078),
    ];
    for (k, (o, h, l, c)) in tail.into_iter().enumerate() {
        bars.push(make_bar(at(3 * (40 + k as i64)), o, h, l, c));
    }
    bars
}

/// Deterministic wavy series: a slow drift plus a fast oscillation, enough
/// to trigger breakouts in both directions over a few hundred bars.
pub fn wave_series(start: NaiveDateTime, timeframe: Timeframe, count: usize, seed: u64) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(count);
    let mut prev: f64 = 1.1000;
    for i in 0..count {
        let x = i as f64 + seed as f64 * 0.37;
        let close = 1.1000 + 0.0040 * (x / 23.0).sin() + 0.0008 * (x / 3.0).cos();
        let open = prev;
        let high = open.max(close) + 0.0003;
        let low = open.min(close) - 0.0003;
        bars.push(Bar {
            timestamp: start + timeframe.duration() * i as i32,
            open,
            high,
            low,
            close,
            volume: 500 + ((i * 37 + seed as usize) % 900) as i64,
        });
        prev = close;
    }
    bars
}

/// Write a series in the plain `datetime,open,high,low,close,volume` layout.
pub fn write_series(dir: &Path, symbol: &str, timeframe: Timeframe, bars: &[Bar]) {
    let mut out = String::from("datetime,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    fs::write(dir.join(format!("{symbol}_{timeframe}.csv")), out).unwrap();
}

/// Gateway that refuses every `n`-th order.
pub struct FlakyGateway {
    pub every: u64,
    pub attempts: u64,
    pub closes: Vec<OrderId>,
}

impl FlakyGateway {
    pub fn new(every: u64) -> Self {
        Self {
            every,
            attempts: 0,
            closes: Vec::new(),
        }
    }
}

impl ExecutionGateway for FlakyGateway {
    fn place_order(&mut self, _direction: Direction, _price: f64) -> Result<OrderId, TraderError> {
        self.attempts += 1;
        if self.attempts % self.every == 0 {
            return Err(TraderError::Gateway {
                reason: "requote".into(),
            });
        }
        Ok(OrderId(self.attempts))
    }

    fn close_order(&mut self, order: OrderId, _price: f64) -> Result<(), TraderError> {
        self.closes.push(order);
        Ok(())
    }
}
