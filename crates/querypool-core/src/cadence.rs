//! Pacing of successive completion passes.
//!
//! `run_until_idle` asks a [`PollCadence`] for the timeout of each pass and
//! reports back how many queries that pass settled. Swapping the cadence changes
//! how hard the loop spins without touching dispatch logic.

use std::time::Duration;

use crate::config::CadenceConfig;

/// Chooses the poll timeout for the next completion pass.
pub trait PollCadence {
    /// Timeout for the next pass.
    fn next_timeout(&mut self) -> Duration;

    /// Feedback after a pass: how many in-flight queries it settled.
    fn on_pass(&mut self, settled: usize);
}

/// Always re-poll with a zero timeout (busy poll).
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl PollCadence for Immediate {
    fn next_timeout(&mut self) -> Duration {
        Duration::ZERO
    }

    fn on_pass(&mut self, _settled: usize) {}
}

/// Block every pass for the same timeout.
#[derive(Debug, Clone, Copy)]
pub struct Fixed {
    timeout: Duration,
}

impl Fixed {
    /// Creates a fixed cadence.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PollCadence for Fixed {
    fn next_timeout(&mut self) -> Duration {
        self.timeout
    }

    fn on_pass(&mut self, _settled: usize) {}
}

/// Exponential backoff on empty passes, reset as soon as a pass makes progress.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    empty_passes: u32,
}

impl Backoff {
    /// Creates a backoff cadence. The first pass always polls with a zero timeout.
    pub fn new(initial_ms: u64, max_ms: u64, multiplier: f64) -> Self {
        if initial_ms > max_ms {
            tracing::warn!("backoff initial_ms ({}) > max_ms ({})", initial_ms, max_ms);
        }
        Self {
            initial_ms,
            max_ms,
            multiplier,
            empty_passes: 0,
        }
    }

    /// Consecutive passes that settled nothing.
    pub fn empty_passes(&self) -> u32 {
        self.empty_passes
    }
}

impl PollCadence for Backoff {
    fn next_timeout(&mut self) -> Duration {
        if self.empty_passes == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.empty_passes - 1).min(i32::MAX as u32) as i32;
        let calculated = self.initial_ms as f64 * self.multiplier.powi(exponent);
        let delay_ms = if calculated.is_finite() {
            (calculated as u64).min(self.max_ms)
        } else {
            self.max_ms
        };
        Duration::from_millis(delay_ms)
    }

    fn on_pass(&mut self, settled: usize) {
        if settled > 0 {
            self.empty_passes = 0;
        } else {
            self.empty_passes = self.empty_passes.saturating_add(1);
        }
    }
}

/// Builds the cadence described by a config value.
pub fn from_config(config: &CadenceConfig) -> Box<dyn PollCadence> {
    match *config {
        CadenceConfig::Immediate => Box::new(Immediate),
        CadenceConfig::Fixed { timeout_ms } => Box::new(Fixed::new(Duration::from_millis(timeout_ms))),
        CadenceConfig::Backoff {
            initial_ms,
            max_ms,
            multiplier,
        } => Box::new(Backoff::new(initial_ms, max_ms, multiplier)),
    }
}
