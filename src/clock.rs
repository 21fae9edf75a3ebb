//! Time sources for duration measurement and export timestamping
//!
//! Metrics never read the system clock directly. The registry owns a single
//! injected [`Clock`] so tests can drive time deterministically.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic ticks and wall-clock timestamps.
///
/// `tick()` is ordering-only and is used exclusively for measuring elapsed
/// durations; `millis()` is wall-clock epoch time used for timestamping
/// exported records. Both are safe to call from any thread and cannot fail.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonically non-decreasing tick in nanoseconds.
    fn tick(&self) -> u64;

    /// Wall-clock time in epoch milliseconds.
    fn millis(&self) -> u64;
}

/// The production clock: `Instant`-anchored ticks plus `SystemTime` millis.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn tick(&self) -> u64 {
        // Saturates after ~584 years of process uptime.
        self.origin.elapsed().as_nanos() as u64
    }

    fn millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A manually driven clock for deterministic tests.
///
/// Both tick and wall time only move when explicitly advanced or set.
#[derive(Debug, Default)]
pub struct ManualClock {
    tick: AtomicU64,
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the monotonic tick by `nanos`.
    pub fn advance_nanos(&self, nanos: u64) {
        self.tick.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Advance the monotonic tick by `millis` and wall time by the same amount.
    pub fn advance_millis(&self, millis: u64) {
        self.tick.fetch_add(millis * 1_000_000, Ordering::Relaxed);
        self.millis.fetch_add(millis, Ordering::Relaxed);
    }

    /// Set the wall-clock epoch milliseconds.
    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::Relaxed);
    }

    /// Set the monotonic tick. Callers are responsible for keeping it
    /// non-decreasing; moving it backwards simulates a clock anomaly.
    pub fn set_tick(&self, nanos: u64) {
        self.tick.store(nanos, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    fn millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }
}
