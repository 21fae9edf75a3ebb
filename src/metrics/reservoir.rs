//! Pluggable percentile reservoirs for timers
//!
//! Percentile computation is deliberately not intrinsic Timer behavior: a
//! timer optionally feeds every recorded duration into a [`Reservoir`], and
//! exports include percentile fields only when one is attached.

use hdrhistogram::Histogram;
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

/// Percentile breakdown of recorded durations, in fractional milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PercentileSet {
    pub p75: f64,
    pub p95: f64,
    pub p98: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Sink for duration samples with percentile readout.
///
/// Implementations must tolerate concurrent `update` calls from recording
/// threads while the sampling worker reads `percentiles`.
pub trait Reservoir: Send + Sync + fmt::Debug {
    /// Record one duration, in nanoseconds.
    fn update(&self, nanos: u64);

    /// Current percentile view over everything recorded so far.
    fn percentiles(&self) -> PercentileSet;
}

/// HdrHistogram-backed reservoir.
///
/// Records in microseconds at three significant figures, which keeps the
/// histogram small while staying well inside latency-measurement accuracy.
pub struct HdrReservoir {
    histogram: Mutex<Histogram<u64>>,
}

impl HdrReservoir {
    pub fn new() -> Self {
        // 1us..1h range, 3 significant figures. The bounds are valid, so
        // construction cannot fail.
        let histogram = Histogram::new_with_bounds(1, 3_600_000_000, 3)
            .unwrap_or_else(|_| Histogram::new(3).expect("3 sigfigs is in range"));
        Self {
            histogram: Mutex::new(histogram),
        }
    }
}

impl Default for HdrReservoir {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HdrReservoir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Histogram contents are neither cheap nor useful to render.
        f.debug_struct("HdrReservoir").finish_non_exhaustive()
    }
}

impl Reservoir for HdrReservoir {
    fn update(&self, nanos: u64) {
        let micros = (nanos / 1_000).max(1);
        let mut histogram = match self.histogram.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if histogram.record(micros).is_err() {
            // Out-of-range values are saturated rather than dropped.
            let max = histogram.high();
            if let Err(err) = histogram.record(max) {
                warn!("reservoir discarded out-of-range sample: {err}");
            }
        }
    }

    fn percentiles(&self) -> PercentileSet {
        let histogram = match self.histogram.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if histogram.is_empty() {
            return PercentileSet::default();
        }
        let ms = |q: f64| histogram.value_at_quantile(q) as f64 / 1_000.0;
        PercentileSet {
            p75: ms(0.75),
            p95: ms(0.95),
            p98: ms(0.98),
            p99: ms(0.99),
            p999: ms(0.999),
        }
    }
}
