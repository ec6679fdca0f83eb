//! One strategy run: the bar series, trend detector, entry evaluator and
//! position simulator wired together with cross-timeframe alignment.
//!
//! A slow bar stamped `t` covers `[t, t + slow)`. The trend state it
//! produces applies to fast bars stamped at or after `t + slow`; until
//! then it waits in a pending queue. Each fast bar is processed as:
//! promote due trend states, check open positions against the bar, then
//! evaluate an entry on the bar. A position opened on a bar is first
//! checked against the following bar.
//!
//! Closed positions always land in the engine's own record before they
//! are offered to the report sink. A sink failure is returned only after
//! the whole step has run, so no position is lost and the bar is never
//! half applied.

use chrono::NaiveDateTime;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::bar_series::BarSeries;
use super::entry::{EntryEvaluator, EntrySignal};
use super::error::TraderError;
use super::metrics::Metrics;
use super::ohlcv::Bar;
use super::position::{Position, PositionId};
use super::simulator::{PositionSimulator, Rejection};
use super::strategy::StrategyConfig;
use super::trend::{TrendDetector, TrendState};
use crate::ports::execution_port::ExecutionGateway;
use crate::ports::report_port::ReportSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub slow_bars: usize,
    pub fast_bars: usize,
    pub signals: usize,
    pub opened: usize,
    pub rejected_cap: usize,
    pub rejected_invalid: usize,
    pub closed: usize,
}

/// What a single fast bar did.
#[derive(Debug, Clone, Default)]
pub struct FastBarOutcome {
    pub signal: Option<EntrySignal>,
    pub opened: Option<PositionId>,
    pub rejection: Option<Rejection>,
    pub closed: Vec<Position>,
}

pub struct Engine<G: ExecutionGateway, R: ReportSink> {
    config: StrategyConfig,
    slow_series: BarSeries,
    fast_series: BarSeries,
    detector: TrendDetector,
    evaluator: EntryEvaluator,
    simulator: PositionSimulator<G>,
    sink: R,
    effective: TrendState,
    pending: VecDeque<(NaiveDateTime, TrendState)>,
    last_fast: Option<Bar>,
    closed: Vec<Position>,
    stats: RunStats,
    finished: bool,
}

impl<G: ExecutionGateway, R: ReportSink> Engine<G, R> {
    pub fn new(config: StrategyConfig, gateway: G, sink: R) -> Result<Self, TraderError> {
        config.validate()?;
        let simulator = PositionSimulator::new(config.risk.clone(), gateway)?;
        Ok(Engine {
            slow_series: BarSeries::new(config.slow_timeframe),
            fast_series: BarSeries::new(config.fast_timeframe),
            detector: TrendDetector::new(config.trend.clone()),
            evaluator: EntryEvaluator::new(config.entry.clone(), config.risk.pip_value),
            simulator,
            sink,
            effective: TrendState::Neutral,
            pending: VecDeque::new(),
            last_fast: None,
            closed: Vec::new(),
            stats: RunStats::default(),
            finished: false,
            config,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Trend state currently gating fast bars.
    pub fn trend_state(&self) -> TrendState {
        self.effective
    }

    /// Latest state computed by the detector, possibly not yet in effect.
    pub fn latest_trend(&self) -> TrendState {
        self.detector.state()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn simulator(&self) -> &PositionSimulator<G> {
        &self.simulator
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Every position closed so far, in close order.
    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_parts(self) -> (G, R) {
        (self.simulator.into_gateway(), self.sink)
    }

    pub fn on_slow_bar(&mut self, bar: &Bar) -> Result<TrendState, TraderError> {
        self.ensure_running()?;
        self.slow_series.append(bar)?;
        let state = self.detector.on_slow_bar(bar)?;
        self.pending
            .push_back((bar.close_time(self.config.slow_timeframe), state));
        self.stats.slow_bars += 1;
        Ok(state)
    }

    pub fn on_fast_bar(&mut self, bar: &Bar) -> Result<FastBarOutcome, TraderError> {
        self.ensure_running()?;
        self.fast_series.append(bar)?;
        self.stats.fast_bars += 1;
        self.promote_pending(bar.timestamp);

        let closed = self.simulator.on_price_update(bar);
        let report_result = self.archive(&closed);

        let mut outcome = FastBarOutcome {
            closed,
            ..FastBarOutcome::default()
        };

        if let Some(signal) = self.evaluator.on_fast_bar(bar, self.effective) {
            self.stats.signals += 1;
            match self.simulator.on_signal(&signal) {
                Ok(id) => {
                    self.stats.opened += 1;
                    outcome.opened = Some(id);
                }
                Err(Rejection::ConcurrencyCapReached) => {
                    self.stats.rejected_cap += 1;
                    debug!(timestamp = %bar.timestamp, "signal dropped: concurrency cap");
                    outcome.rejection = Some(Rejection::ConcurrencyCapReached);
                }
                Err(rejection) => {
                    self.stats.rejected_invalid += 1;
                    warn!(timestamp = %bar.timestamp, %rejection, "signal dropped");
                    outcome.rejection = Some(rejection);
                }
            }
            outcome.signal = Some(signal);
        }

        self.last_fast = Some(bar.clone());
        report_result?;
        Ok(outcome)
    }

    /// Close whatever is still open at the last fast close, report it and
    /// hand the final statistics to the sink.
    ///
    /// Only the first call closes positions and flushes the sink; later
    /// calls return the same metrics. Bars are refused once finished.
    pub fn finish(&mut self) -> Result<Metrics, TraderError> {
        if self.finished {
            return Ok(Metrics::compute(&self.closed, self.config.risk.pip_value));
        }
        self.finished = true;

        let mut report_result = Ok(());
        if let Some(last) = self.last_fast.take() {
            let remaining = self.simulator.close_all(last.close, last.timestamp);
            report_result = self.archive(&remaining);
        }
        let metrics = Metrics::compute(&self.closed, self.config.risk.pip_value);
        let flush_result = self.sink.finish(&metrics);
        report_result.and(flush_result)?;
        info!(
            slow_bars = self.stats.slow_bars,
            fast_bars = self.stats.fast_bars,
            signals = self.stats.signals,
            opened = self.stats.opened,
            rejected_cap = self.stats.rejected_cap,
            trades = metrics.total_trades,
            pnl_pips = metrics.total_pnl_pips,
            "run finished"
        );
        Ok(metrics)
    }

    fn promote_pending(&mut self, now: NaiveDateTime) {
        while let Some(&(effective_at, state)) = self.pending.front() {
            if effective_at > now {
                break;
            }
            self.pending.pop_front();
            self.effective = state;
        }
    }

    fn ensure_running(&self) -> Result<(), TraderError> {
        if self.finished {
            return Err(TraderError::Validation {
                reason: "run already finished".to_string(),
            });
        }
        Ok(())
    }

    /// Keep every closed position, then offer each to the sink. Returns the
    /// first sink error after all of them were offered.
    fn archive(&mut self, closed: &[Position]) -> Result<(), TraderError> {
        self.stats.closed += closed.len();
        self.closed.extend_from_slice(closed);
        let mut first_err = None;
        for pos in closed {
            if let Err(e) = self.sink.record(pos) {
                warn!(position = pos.id.0, error = %e, "report sink refused a closed position");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Drive an engine over two complete historical series.
///
/// Bars are merged by close time; on a tie the fast bar goes first, so a
/// slow bar's state never reaches the fast bar that closes with it.
pub fn replay<G, R>(engine: &mut Engine<G, R>, slow: &[Bar], fast: &[Bar]) -> Result<(), TraderError>
where
    G: ExecutionGateway,
    R: ReportSink,
{
    let slow_tf = engine.config().slow_timeframe;
    let fast_tf = engine.config().fast_timeframe;
    let mut s = 0;
    let mut f = 0;
    while s < slow.len() || f < fast.len() {
        let take_fast = match (slow.get(s), fast.get(f)) {
            (Some(sb), Some(fb)) => fb.close_time(fast_tf) <= sb.close_time(slow_tf),
            (None, Some(_)) => true,
            _ => false,
        };
        if take_fast {
            engine.on_fast_bar(&fast[f])?;
            f += 1;
        } else {
            engine.on_slow_bar(&slow[s])?;
            s += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::recording_gateway::RecordingGateway;
    use crate::adapters::trade_log::TradeLog;
    use crate::domain::entry::EntryConfig;
    use crate::domain::position::CloseReason;
    use crate::domain::simulator::RiskConfig;
    use crate::domain::trend::{HoldPolicy, TrendConfig, VolumeFilter};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn bar(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    fn config() -> StrategyConfig {
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

    /// Three quiet M30 bars then an upside breakout bar opening at 10:30.
    fn slow_bars() -> Vec<Bar> {
        let mut bars: Vec<Bar> = [1.0990, 1.1010, 1.0990]
            .iter()
            .enumerate()
            .map(|(i, &c)| bar(t0() + Duration::minutes(30 * i as i64), c, c + 0.0005, c - 0.0005, c))
            .collect();
        bars.push(bar(t0() + Duration::minutes(90), 1.1000, 1.1055, 1.0995, 1.1050));
        bars
    }

    /// Flat M3 bars up to 10:57, then a run that opens, closes and
    /// re-opens positions.
    fn fast_bars() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..40)
            .map(|i| bar(t0() + Duration::minutes(3 * i), 1.1000, 1.1002, 1.0998, 1.1000))
            .collect();
        let tail = [
            (1.1000, 1.1022, 1.0999, 1.1020),
            (1.1020, 1.1033, 1.1018, 1.1030),
            (1.1030, 1.1042, 1.1028, 1.1040),
            (1.1040, 1.1115, 1.1038, 1.1100),
            (1.1100, 1.1101, 1.1070, 1.1078),
        ];
        for (k, (o, h, l, c)) in tail.into_iter().enumerate() {
            bars.push(bar(t0() + Duration::minutes(3 * (40 + k as i64)), o, h, l, c));
        }
        bars
    }

    fn engine() -> Engine<RecordingGateway, TradeLog> {
        Engine::new(config(), RecordingGateway::new(), TradeLog::new()).unwrap()
    }

    #[test]
    fn full_replay_scenario() {
        let mut e = engine();
        replay(&mut e, &slow_bars(), &fast_bars()).unwrap();
        let metrics = e.finish().unwrap();

        let stats = e.stats();
        assert_eq!(stats.slow_bars, 4);
        assert_eq!(stats.fast_bars, 45);
        assert_eq!(stats.signals, 4);
        assert_eq!(stats.opened, 3);
        assert_eq!(stats.rejected_cap, 1);
        assert_eq!(stats.rejected_invalid, 0);
        assert_eq!(stats.closed, 3);

        let closed = e.sink().positions();
        assert_eq!(closed.len(), 3);
        assert_eq!(closed[0].close_reason, Some(CloseReason::TakeProfit));
        assert_relative_eq!(closed[0].entry_price, 1.1030);
        assert_relative_eq!(closed[0].close_price.unwrap(), 1.1110, epsilon = 1e-10);
        assert_eq!(closed[1].close_reason, Some(CloseReason::StopLoss));
        assert_relative_eq!(closed[1].close_price.unwrap(), 1.1080, epsilon = 1e-10);
        assert_eq!(closed[2].close_reason, Some(CloseReason::Manual));
        assert_relative_eq!(closed[2].close_price.unwrap(), 1.1078);

        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.trades_won, 1);
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.trades_breakeven, 1);
        assert_eq!(e.sink().metrics(), Some(&metrics));
        assert_eq!(e.simulator().open_count(), 0);
    }

    #[test]
    fn slow_state_waits_until_its_bar_has_closed() {
        let mut e = engine();
        let slow = slow_bars();
        let fast = fast_bars();
        for b in &slow[..3] {
            e.on_slow_bar(b).unwrap();
        }
        // deliver the breakout bar at its open time, ahead of its fast bars
        assert_eq!(e.on_slow_bar(&slow[3]).unwrap(), TrendState::Up);
        assert_eq!(e.latest_trend(), TrendState::Up);

        for b in &fast[..40] {
            e.on_fast_bar(b).unwrap();
            assert_eq!(e.trend_state(), TrendState::Neutral, "leak at {}", b.timestamp);
        }
        e.on_fast_bar(&fast[40]).unwrap();
        assert_eq!(e.trend_state(), TrendState::Up);
    }

    #[test]
    fn neutral_trend_produces_no_signals() {
        let mut e = engine();
        let flat: Vec<Bar> = slow_bars()[..3].to_vec();
        replay(&mut e, &flat, &fast_bars()).unwrap();
        assert_eq!(e.trend_state(), TrendState::Neutral);
        assert_eq!(e.stats().signals, 0);
        assert_eq!(e.simulator().gateway().placed_count(), 0);
    }

    #[test]
    fn identical_input_gives_identical_positions() {
        let run = || {
            let mut e = engine();
            replay(&mut e, &slow_bars(), &fast_bars()).unwrap();
            e.finish().unwrap();
            let (_, log) = e.into_parts();
            log.positions().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn out_of_order_fast_bar_is_fatal() {
        let mut e = engine();
        let fast = fast_bars();
        e.on_fast_bar(&fast[1]).unwrap();
        let err = e.on_fast_bar(&fast[0]).unwrap_err();
        assert!(matches!(err, TraderError::DataOrdering { .. }));
        assert!(err.is_data_problem());
        assert_eq!(e.stats().fast_bars, 1);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut cfg = config();
        cfg.entry.ema_period = 0;
        assert!(Engine::new(cfg, RecordingGateway::new(), TradeLog::new()).is_err());
    }

    #[test]
    fn finish_without_bars_is_empty() {
        let mut e = engine();
        let metrics = e.finish().unwrap();
        assert_eq!(metrics.total_trades, 0);
    }

    /// Sink that refuses the first `refuse` records.
    #[derive(Default)]
    struct ShakySink {
        refuse: usize,
        attempts: usize,
        recorded: Vec<Position>,
        finish_calls: usize,
    }

    impl ReportSink for ShakySink {
        fn record(&mut self, position: &Position) -> Result<(), TraderError> {
            self.attempts += 1;
            if self.attempts <= self.refuse {
                return Err(TraderError::Report {
                    reason: "disk full".into(),
                });
            }
            self.recorded.push(position.clone());
            Ok(())
        }

        fn finish(&mut self, _metrics: &Metrics) -> Result<(), TraderError> {
            self.finish_calls += 1;
            Ok(())
        }
    }

    #[test]
    fn sink_failure_keeps_every_closed_position() {
        let mut cfg = config();
        cfg.risk.max_concurrent_positions = 10;
        let sink = ShakySink {
            refuse: 1,
            ..ShakySink::default()
        };
        let mut e = Engine::new(cfg, RecordingGateway::new(), sink).unwrap();
        let fast = fast_bars();
        replay(&mut e, &slow_bars(), &fast[..43]).unwrap();
        assert_eq!(e.simulator().open_count(), 2);

        // both buys stop out on the same bar
        let crash = bar(fast[43].timestamp, 1.1040, 1.1045, 1.0900, 1.0950);
        let err = e.on_fast_bar(&crash).unwrap_err();
        assert!(matches!(err, TraderError::Report { .. }));

        assert_eq!(e.stats().closed, 2);
        assert_eq!(e.stats().fast_bars, 44);
        let closed = e.closed_positions();
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|p| p.close_reason == Some(CloseReason::StopLoss)));
        assert_eq!(e.sink().recorded.len(), 1);
        assert_eq!(e.sink().recorded[0], closed[1]);
        assert!(e.simulator().open_positions().all(|p| p.entry_time == crash.timestamp));

        // the bar was fully applied, so the run carries on with the next one
        e.on_fast_bar(&fast[44]).unwrap();
        let metrics = e.finish().unwrap();
        assert_eq!(metrics.total_trades, e.closed_positions().len());
        assert_eq!(e.sink().recorded.len(), e.closed_positions().len() - 1);
    }

    #[test]
    fn sink_failure_at_finish_still_flushes_metrics() {
        let mut cfg = config();
        cfg.risk.max_concurrent_positions = 10;
        let mut e = Engine::new(cfg, RecordingGateway::new(), ShakySink::default()).unwrap();
        replay(&mut e, &slow_bars(), &fast_bars()[..43]).unwrap();
        e.sink.refuse = e.sink.attempts + 1;

        let err = e.finish().unwrap_err();
        assert!(matches!(err, TraderError::Report { .. }));
        assert_eq!(e.simulator().open_count(), 0);
        assert_eq!(e.closed_positions().len(), 2);
        assert_eq!(e.sink().recorded.len(), 1);
        assert_eq!(e.sink().finish_calls, 1);
    }

    #[test]
    fn finish_runs_once() {
        let mut e = Engine::new(config(), RecordingGateway::new(), ShakySink::default()).unwrap();
        replay(&mut e, &slow_bars(), &fast_bars()).unwrap();
        let first = e.finish().unwrap();
        let second = e.finish().unwrap();
        assert!(e.is_finished());
        assert_eq!(first, second);
        assert_eq!(e.sink().finish_calls, 1);
        assert_eq!(e.sink().recorded.len(), 3);

        let late = bar(t0() + Duration::hours(6), 1.1, 1.1, 1.1, 1.1);
        assert!(matches!(e.on_fast_bar(&late), Err(TraderError::Validation { .. })));
        assert!(matches!(e.on_slow_bar(&late), Err(TraderError::Validation { .. })));
        assert_eq!(e.stats().fast_bars, 45);
    }
}
