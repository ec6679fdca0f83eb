//! Single-writer delivery of live bars into an [`Engine`].
//!
//! Any number of producers (feed listeners, pollers) hold a cloned
//! [`FeedSender`]; exactly one [`FeedReceiver`] applies events to the
//! engine in queue order. A stop request is only observed between events,
//! so every event is either fully applied or not applied at all.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::engine::Engine;
use super::error::TraderError;
use super::ohlcv::Bar;
use crate::ports::execution_port::ExecutionGateway;
use crate::ports::report_port::ReportSink;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Slow(Bar),
    Fast(Bar),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    /// Every sender was dropped.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSummary {
    pub slow_bars: usize,
    pub fast_bars: usize,
    pub stopped_by: StopReason,
}

#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

pub struct FeedReceiver {
    rx: mpsc::UnboundedReceiver<FeedEvent>,
}

pub fn channel() -> (FeedSender, FeedReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FeedSender { tx }, FeedReceiver { rx })
}

impl FeedSender {
    pub fn send(&self, event: FeedEvent) -> Result<(), TraderError> {
        self.tx.send(event).map_err(|_| TraderError::DataRead {
            reason: "feed receiver has been dropped".into(),
        })
    }

    pub fn slow(&self, bar: Bar) -> Result<(), TraderError> {
        self.send(FeedEvent::Slow(bar))
    }

    pub fn fast(&self, bar: Bar) -> Result<(), TraderError> {
        self.send(FeedEvent::Fast(bar))
    }

    pub fn shutdown(&self) -> Result<(), TraderError> {
        self.send(FeedEvent::Shutdown)
    }
}

/// Tally of one drive loop.
struct Tally {
    slow_bars: usize,
    fast_bars: usize,
}

impl Tally {
    fn new() -> Self {
        Tally {
            slow_bars: 0,
            fast_bars: 0,
        }
    }

    /// Apply one event; `Some` means the loop should stop.
    fn apply<G, R>(
        &mut self,
        engine: &mut Engine<G, R>,
        event: Option<FeedEvent>,
    ) -> Result<Option<StopReason>, TraderError>
    where
        G: ExecutionGateway,
        R: ReportSink,
    {
        let result = match event {
            None => return Ok(Some(StopReason::Disconnected)),
            Some(FeedEvent::Shutdown) => return Ok(Some(StopReason::Shutdown)),
            Some(FeedEvent::Slow(bar)) => engine.on_slow_bar(&bar).map(|state| {
                self.slow_bars += 1;
                debug!(timestamp = %bar.timestamp, %state, "slow bar applied");
            }),
            Some(FeedEvent::Fast(bar)) => engine.on_fast_bar(&bar).map(|_| {
                self.fast_bars += 1;
            }),
        };
        if let Err(e) = &result {
            error!(error = %e, "feed aborted");
        }
        result.map(|_| None)
    }

    fn summary(self, stopped_by: StopReason) -> DriveSummary {
        info!(
            slow_bars = self.slow_bars,
            fast_bars = self.fast_bars,
            ?stopped_by,
            "feed stopped"
        );
        DriveSummary {
            slow_bars: self.slow_bars,
            fast_bars: self.fast_bars,
            stopped_by,
        }
    }
}

impl FeedReceiver {
    /// Drain events on the current thread until shutdown or disconnect.
    ///
    /// Blocks; must not be called from inside an async runtime. Use
    /// [`FeedReceiver::drive_async`] there.
    pub fn drive<G, R>(&mut self, engine: &mut Engine<G, R>) -> Result<DriveSummary, TraderError>
    where
        G: ExecutionGateway,
        R: ReportSink,
    {
        let mut tally = Tally::new();
        loop {
            if let Some(stop) = tally.apply(engine, self.rx.blocking_recv())? {
                return Ok(tally.summary(stop));
            }
        }
    }

    pub async fn drive_async<G, R>(
        &mut self,
        engine: &mut Engine<G, R>,
    ) -> Result<DriveSummary, TraderError>
    where
        G: ExecutionGateway,
        R: ReportSink,
    {
        let mut tally = Tally::new();
        loop {
            if let Some(stop) = tally.apply(engine, self.rx.recv().await)? {
                return Ok(tally.summary(stop));
            }
        }
    }
}
