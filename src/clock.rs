//! # Exchange Clocks
//!
//! Every exchange carries a clock recording when it was created. Wall-clock
//! time is captured once for reporting, and elapsed time is measured with a
//! monotonic [`Instant`] so it never goes backwards.
//!
//! Pooled exchanges are reused many times, so they use a [`ResetableClock`]
//! which is re-armed each time the exchange is handed out again.

use chrono::Utc;
use std::time::{Duration, Instant};

/// Time source for an exchange
pub trait Clock: Send + Sync {
    /// Creation time in milliseconds since the epoch
    fn created(&self) -> i64;

    /// Time elapsed since creation
    fn elapsed(&self) -> Duration;

    /// Monotonic instant captured at creation
    fn as_instant(&self) -> Instant;
}

/// Clock fixed at construction time
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    created: i64,
    instant: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            created: Utc::now().timestamp_millis(),
            instant: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn created(&self) -> i64 {
        self.created
    }

    fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    fn as_instant(&self) -> Instant {
        self.instant
    }
}

/// Clock that can be re-armed when a pooled exchange is reused
#[derive(Debug, Clone, Copy)]
pub struct ResetableClock {
    inner: MonotonicClock,
}

impl ResetableClock {
    pub fn new() -> Self {
        Self {
            inner: MonotonicClock::new(),
        }
    }

    /// Re-capture both the wall-clock and the monotonic start
    pub fn reset(&mut self) {
        self.inner = MonotonicClock::new();
    }
}

impl Default for ResetableClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ResetableClock {
    fn created(&self) -> i64 {
        self.inner.created()
    }

    fn elapsed(&self) -> Duration {
        self.inner.elapsed()
    }

    fn as_instant(&self) -> Instant {
        self.inner.as_instant()
    }
}

/// The clock variant carried by an exchange
#[derive(Debug, Clone, Copy)]
pub enum ExchangeClock {
    Monotonic(MonotonicClock),
    Resetable(ResetableClock),
}

impl ExchangeClock {
    pub fn monotonic() -> Self {
        Self::Monotonic(MonotonicClock::new())
    }

    pub fn resetable() -> Self {
        Self::Resetable(ResetableClock::new())
    }

    /// Reset the clock; monotonic clocks are replaced by a fresh one
    pub fn reset(&mut self) {
        match self {
            Self::Monotonic(clock) => *clock = MonotonicClock::new(),
            Self::Resetable(clock) => clock.reset(),
        }
    }

    pub fn is_resetable(&self) -> bool {
        matches!(self, Self::Resetable(_))
    }
}

impl Clock for ExchangeClock {
    fn created(&self) -> i64 {
        match self {
            Self::Monotonic(c) => c.created(),
            Self::Resetable(c) => c.created(),
        }
    }

    fn elapsed(&self) -> Duration {
        match self {
            Self::Monotonic(c) => c.elapsed(),
            Self::Resetable(c) => c.elapsed(),
        }
    }

    fn as_instant(&self) -> Instant {
        match self {
            Self::Monotonic(c) => c.as_instant(),
            Self::Resetable(c) => c.as_instant(),
        }
    }
}
