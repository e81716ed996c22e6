use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::progress::ProgressStore;
use crate::session::{Feedback, Interaction, SessionId};
use crate::trainer::Trainer;

/// Interaction tagged with the session it was produced for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session: SessionId,
    pub at_ms: u64,
    #[serde(flatten)]
    pub interaction: Interaction,
}

/// Unified event type consumed by the runner
#[derive(Clone, Debug, PartialEq)]
pub enum DrillEvent {
    Input(Envelope),
    Tick,
}

/// Source of pointer events from the presentation layer
pub trait DrillEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<DrillEvent, RecvTimeoutError>;
}

/// Event source fed through an mpsc channel
pub struct ChannelEventSource {
    rx: Receiver<DrillEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<DrillEvent>) -> Self {
        Self { rx }
    }
}

impl DrillEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<DrillEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Millisecond time source handed to sessions
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the clock was created
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Runner that advances the trainer one event/tick at a time
pub struct Runner<E: DrillEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: DrillEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> DrillEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => DrillEvent::Tick,
        }
    }

    /// Feed events into `trainer` until its session finishes or `max_steps`
    /// is exhausted. Waits never overshoot the session's next deadline. Once
    /// the source disconnects each step sleeps until that deadline.
    pub fn drive<S: ProgressStore, C: Clock>(
        &self,
        trainer: &mut Trainer<S>,
        clock: &C,
        max_steps: usize,
    ) -> Vec<Feedback> {
        let mut feedback = Vec::new();
        for _ in 0..max_steps {
            let Some(deadline) = trainer.session().and_then(|s| s.next_deadline_ms()) else {
                break;
            };
            let until_deadline = Duration::from_millis(deadline.saturating_sub(clock.now_ms()));
            let event = match self
                .event_source
                .recv_timeout(self.ticker.interval().min(until_deadline))
            {
                Ok(ev) => ev,
                Err(RecvTimeoutError::Timeout) => DrillEvent::Tick,
                Err(RecvTimeoutError::Disconnected) => {
                    // no more input can arrive, only the clock moves the session on
                    thread::sleep(until_deadline);
                    DrillEvent::Tick
                }
            };
            feedback.extend(trainer.handle_event(event, clock.now_ms()));
        }
        feedback
    }
}
