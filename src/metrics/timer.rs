//! Duration accumulator with delta-since-last-sample semantics

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::metrics::reservoir::{PercentileSet, Reservoir};

/// A named, thread-safe duration accumulator.
///
/// Recording threads measure an operation with [`start`](Timer::start) /
/// [`stop`](Timer::stop): `start` returns an opaque [`TimerContext`] carrying
/// its own start tick, so overlapping measurements on the same timer from
/// any number of threads are safe. `sample()` must only be called by one
/// serialized actor (the scheduled reporter's worker).
///
/// Max and min are *running window* extremes: they reset at every sample
/// boundary and therefore describe only the most recent window, never
/// all-time extremes.
#[derive(Debug)]
pub struct Timer {
    clock: Arc<dyn Clock>,
    /// Cumulative sum of recorded durations, nanoseconds.
    sum_nanos: AtomicU64,
    /// Cumulative number of recorded durations.
    count: AtomicU64,
    /// Largest duration recorded in the current window; `i64::MIN` when empty.
    window_max: AtomicI64,
    /// Smallest duration recorded in the current window; `i64::MAX` when empty.
    window_min: AtomicI64,
    /// Cumulative sum/count as of the previous sample. Written only by `sample()`.
    last_sum: AtomicU64,
    last_count: AtomicU64,
    /// The most recently captured window, exposed through the accessors.
    snapshot: Mutex<TimerSnapshot>,
    reservoir: Option<Box<dyn Reservoir>>,
}

/// Opaque in-flight measurement: created by [`Timer::start`], consumed by
/// [`Timer::stop`].
#[derive(Debug)]
#[must_use = "a started measurement records nothing until passed to Timer::stop"]
pub struct TimerContext {
    started_at: u64,
}

/// Point-in-time view of one sampling window, consumed once per report tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimerSnapshot {
    /// Durations recorded since the previous sample.
    pub count: u64,
    /// Sum of durations recorded since the previous sample.
    pub sum: Duration,
    /// Largest single duration in the window; zero when the window is empty.
    pub max: Duration,
    /// Smallest single duration in the window; zero when the window is empty.
    pub min: Duration,
    /// Percentiles from the attached reservoir, when one is present.
    pub percentiles: Option<PercentileSet>,
}

impl TimerSnapshot {
    /// Mean duration over the window, or zero when nothing was recorded.
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.sum / self.count as u32
        }
    }

    /// Instantaneous recordings-per-second over the given sampling window.
    pub fn rate(&self, window: Duration) -> f64 {
        let secs = window.as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }
}

impl Timer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_reservoir(clock, None)
    }

    pub fn with_reservoir(clock: Arc<dyn Clock>, reservoir: Option<Box<dyn Reservoir>>) -> Self {
        Self {
            clock,
            sum_nanos: AtomicU64::new(0),
            count: AtomicU64::new(0),
            window_max: AtomicI64::new(i64::MIN),
            window_min: AtomicI64::new(i64::MAX),
            last_sum: AtomicU64::new(0),
            last_count: AtomicU64::new(0),
            snapshot: Mutex::new(TimerSnapshot::default()),
            reservoir,
        }
    }

    /// Begin a measurement. The returned context carries its own start tick,
    /// so concurrent measurements on one timer never interfere.
    #[inline]
    pub fn start(&self) -> TimerContext {
        TimerContext {
            started_at: self.clock.tick(),
        }
    }

    /// Complete a measurement started with [`start`](Timer::start).
    ///
    /// A negative elapsed value (clock anomaly) is discarded silently; it is
    /// benign, not an error.
    #[inline]
    pub fn stop(&self, context: TimerContext) {
        let now = self.clock.tick();
        if now < context.started_at {
            return;
        }
        self.record_nanos(now - context.started_at);
    }

    /// Record an externally measured duration.
    pub fn record(&self, duration: Duration) {
        self.record_nanos(duration.as_nanos().min(u64::MAX as u128) as u64);
    }

    /// Run `f`, recording its wall duration as a side effect, and return its
    /// output. This is the explicit replacement for annotation-driven
    /// auto-instrumentation: the caller wraps exactly the operation it wants
    /// measured.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let context = self.start();
        let out = f();
        self.stop(context);
        out
    }

    fn record_nanos(&self, nanos: u64) {
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        let signed = nanos.min(i64::MAX as u64) as i64;
        self.window_max.fetch_max(signed, Ordering::Relaxed);
        self.window_min.fetch_min(signed, Ordering::Relaxed);
        if let Some(reservoir) = &self.reservoir {
            reservoir.update(nanos);
        }
    }

    /// Capture the window since the previous sample: sum and count are
    /// diffed, max/min are copied and then reset for the next window.
    /// Single-sampler discipline is the caller's job.
    pub fn sample(&self) -> TimerSnapshot {
        let total_sum = self.sum_nanos.load(Ordering::Relaxed);
        let total_count = self.count.load(Ordering::Relaxed);
        let sum_delta = total_sum - self.last_sum.swap(total_sum, Ordering::Relaxed);
        let count_delta = total_count - self.last_count.swap(total_count, Ordering::Relaxed);

        let max = self.window_max.swap(i64::MIN, Ordering::Relaxed);
        let min = self.window_min.swap(i64::MAX, Ordering::Relaxed);

        let snapshot = TimerSnapshot {
            count: count_delta,
            sum: Duration::from_nanos(sum_delta),
            max: if max == i64::MIN {
                Duration::ZERO
            } else {
                Duration::from_nanos(max as u64)
            },
            min: if min == i64::MAX {
                Duration::ZERO
            } else {
                Duration::from_nanos(min as u64)
            },
            percentiles: self.reservoir.as_ref().map(|r| r.percentiles()),
        };

        if let Ok(mut last) = self.snapshot.lock() {
            *last = snapshot;
        }
        snapshot
    }

    /// Durations recorded in the most recently sampled window.
    pub fn count(&self) -> u64 {
        self.last_snapshot().count
    }

    /// Sum of durations in the most recently sampled window.
    pub fn sum(&self) -> Duration {
        self.last_snapshot().sum
    }

    /// Mean duration over the most recently sampled window.
    pub fn avg(&self) -> Duration {
        self.last_snapshot().avg()
    }

    /// Largest duration in the most recently sampled window.
    pub fn max(&self) -> Duration {
        self.last_snapshot().max
    }

    /// Smallest duration in the most recently sampled window.
    pub fn min(&self) -> Duration {
        self.last_snapshot().min
    }

    fn last_snapshot(&self) -> TimerSnapshot {
        match self.snapshot.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::metrics::reservoir::HdrReservoir;

    fn manual_timer() -> (Arc<ManualClock>, Timer) {
        let clock = Arc::new(ManualClock::new());
        let timer = Timer::new(clock.clone());
        (clock, timer)
    }

    #[test]
    fn single_measurement_window() {
        let (clock, timer) = manual_timer();

        let ctx = timer.start();
        clock.advance_millis(40);
        timer.stop(ctx);

        let snapshot = timer.sample();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.sum, Duration::from_millis(40));
        assert_eq!(snapshot.max, snapshot.sum);
        assert_eq!(snapshot.min, snapshot.sum);
        assert_eq!(timer.avg(), Duration::from_millis(40));
    }

    #[test]
    fn max_min_reset_at_sample_boundary() {
        let (clock, timer) = manual_timer();

        let ctx = timer.start();
        clock.advance_millis(100);
        timer.stop(ctx);
        timer.sample();

        let ctx = timer.start();
        clock.advance_millis(10);
        timer.stop(ctx);

        let snapshot = timer.sample();
        // The 100ms extreme from the previous window must not leak through.
        assert_eq!(snapshot.max, Duration::from_millis(10));
        assert_eq!(snapshot.min, Duration::from_millis(10));
    }

    #[test]
    fn empty_window_is_all_zero() {
        let (_clock, timer) = manual_timer();
        let snapshot = timer.sample();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.sum, Duration::ZERO);
        assert_eq!(snapshot.max, Duration::ZERO);
        assert_eq!(snapshot.min, Duration::ZERO);
        assert_eq!(snapshot.avg(), Duration::ZERO);
    }

    #[test]
    fn overlapping_measurements_are_independent() {
        let (clock, timer) = manual_timer();

        let outer = timer.start();
        clock.advance_millis(5);
        let inner = timer.start();
        clock.advance_millis(10);
        timer.stop(inner); // 10ms
        clock.advance_millis(5);
        timer.stop(outer); // 20ms

        let snapshot = timer.sample();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.sum, Duration::from_millis(30));
        assert_eq!(snapshot.max, Duration::from_millis(20));
        assert_eq!(snapshot.min, Duration::from_millis(10));
    }

    #[test]
    fn negative_elapsed_is_discarded_silently() {
        let (clock, timer) = manual_timer();
        clock.set_tick(1_000_000);

        let ctx = timer.start();
        clock.set_tick(0); // clock anomaly
        timer.stop(ctx);

        assert_eq!(timer.sample().count, 0);
    }

    #[test]
    fn time_closure_records_and_returns() {
        let (_clock, timer) = manual_timer();
        let out = timer.time(|| 21 * 2);
        assert_eq!(out, 42);
        assert_eq!(timer.sample().count, 1);
    }

    #[test]
    fn sum_and_count_diff_across_windows() {
        let (clock, timer) = manual_timer();
        for _ in 0..3 {
            let ctx = timer.start();
            clock.advance_millis(10);
            timer.stop(ctx);
        }
        assert_eq!(timer.sample().count, 3);

        for _ in 0..2 {
            let ctx = timer.start();
            clock.advance_millis(10);
            timer.stop(ctx);
        }
        let snapshot = timer.sample();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.sum, Duration::from_millis(20));
    }

    #[test]
    fn reservoir_feeds_percentiles_into_snapshot() {
        let clock = Arc::new(ManualClock::new());
        let timer = Timer::with_reservoir(clock.clone(), Some(Box::new(HdrReservoir::new())));

        for _ in 0..100 {
            let ctx = timer.start();
            clock.advance_millis(10);
            timer.stop(ctx);
        }

        let snapshot = timer.sample();
        let p = snapshot.percentiles.expect("reservoir attached");
        assert!((p.p99 - 10.0).abs() < 1.0, "p99 was {}", p.p99);
    }

    #[test]
    fn no_reservoir_means_no_percentiles() {
        let (_clock, timer) = manual_timer();
        assert!(timer.sample().percentiles.is_none());
    }
}
