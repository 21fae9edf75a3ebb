//! Monotonic event counter with delta-since-last-sample semantics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A named, thread-safe event counter.
///
/// `mark()` may be called from any number of threads at any rate; it is a
/// single relaxed atomic increment and cannot fail. `sample()` must only be
/// called by one serialized actor (the scheduled reporter's worker): two
/// concurrent samples would lose one window's delta.
#[derive(Debug, Default)]
pub struct Meter {
    /// Cumulative event count, monotonically non-decreasing.
    total: AtomicU64,
    /// Cumulative count as of the previous sample. Written only by `sample()`.
    last_sampled: AtomicU64,
    /// Delta captured by the most recent sample.
    window_count: AtomicU64,
}

/// Point-in-time view of one sampling window, consumed once per report tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterSnapshot {
    /// Events observed since the previous sample.
    pub count: u64,
}

impl MeterSnapshot {
    /// Instantaneous events-per-second over the given sampling window.
    pub fn rate(&self, window: Duration) -> f64 {
        let secs = window.as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event.
    #[inline]
    pub fn mark(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` events at once.
    #[inline]
    pub fn mark_n(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    /// Capture the events observed since the previous sample and advance the
    /// sample boundary. Single-sampler discipline is the caller's job.
    pub fn sample(&self) -> MeterSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let delta = total - self.last_sampled.swap(total, Ordering::Relaxed);
        self.window_count.store(delta, Ordering::Relaxed);
        MeterSnapshot { count: delta }
    }

    /// Events observed in the most recently sampled window. This is a
    /// per-interval delta, not a lifetime total.
    pub fn count(&self) -> u64 {
        self.window_count.load(Ordering::Relaxed)
    }

    /// Lifetime cumulative event count.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
