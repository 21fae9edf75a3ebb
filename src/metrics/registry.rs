//! Get-or-create registry owning all meters and timers

use dashmap::DashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::metrics::meter::Meter;
use crate::metrics::reservoir::{HdrReservoir, Reservoir};
use crate::metrics::timer::Timer;

/// Which percentile reservoir newly created timers receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReservoirKind {
    /// Timers carry no reservoir; exports omit percentile fields.
    #[default]
    None,
    /// Timers carry an [`HdrReservoir`].
    Hdr,
}

impl ReservoirKind {
    fn build(self) -> Option<Box<dyn Reservoir>> {
        match self {
            ReservoirKind::None => None,
            ReservoirKind::Hdr => Some(Box::new(HdrReservoir::new())),
        }
    }
}

/// Owner of the name→Meter and name→Timer maps.
///
/// For a given name repeated lookups return the identical instance for the
/// registry's lifetime; meter and timer names are independent namespaces.
/// Entries are never removed. Lookups use the concurrent map's atomic
/// get-or-insert, so concurrent first lookups of the same name all observe
/// one canonical instance.
#[derive(Debug)]
pub struct MetricRegistry {
    meters: DashMap<String, Arc<Meter>>,
    timers: DashMap<String, Arc<Timer>>,
    clock: Arc<dyn Clock>,
    reservoirs: ReservoirKind,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Build a registry around an explicit clock. There is no process-wide
    /// default-clock singleton; tests inject a manual clock here.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            meters: DashMap::new(),
            timers: DashMap::new(),
            clock,
            reservoirs: ReservoirKind::default(),
        }
    }

    /// Select the reservoir newly created timers receive. Timers created
    /// before the change keep what they have.
    pub fn with_reservoirs(mut self, kind: ReservoirKind) -> Self {
        self.reservoirs = kind;
        self
    }

    /// Get or atomically create the meter registered under `name`.
    pub fn meter(&self, name: &str) -> Arc<Meter> {
        self.meters
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Meter::new()))
            .clone()
    }

    /// Get or atomically create the timer registered under `name`.
    pub fn timer(&self, name: &str) -> Arc<Timer> {
        self.timers
            .entry(name.to_owned())
            .or_insert_with(|| {
                Arc::new(Timer::with_reservoir(
                    self.clock.clone(),
                    self.reservoirs.build(),
                ))
            })
            .clone()
    }

    /// Run `f` against the timer registered under `name`, recording its wall
    /// duration as a side effect.
    pub fn time<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        self.timer(name).time(f)
    }

    /// Live, thread-safe view of all registered meters. The sampling pass
    /// iterates this; it never creates entries.
    pub fn meters(&self) -> &DashMap<String, Arc<Meter>> {
        &self.meters
    }

    /// Live, thread-safe view of all registered timers.
    pub fn timers(&self) -> &DashMap<String, Arc<Timer>> {
        &self.timers
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn repeated_lookups_return_identical_instance() {
        let registry = MetricRegistry::new();
        let a = registry.meter("requests");
        let b = registry.meter("requests");
        assert!(Arc::ptr_eq(&a, &b));

        let x = registry.timer("latency");
        let y = registry.timer("latency");
        assert!(Arc::ptr_eq(&x, &y));
    }

    #[test]
    fn meter_and_timer_namespaces_are_independent() {
        let registry = MetricRegistry::new();
        let meter = registry.meter("foo");
        let timer = registry.timer("foo");

        meter.mark();
        assert_eq!(meter.sample().count, 1);
        assert_eq!(timer.sample().count, 0);
        assert_eq!(registry.meters().len(), 1);
        assert_eq!(registry.timers().len(), 1);
    }

    #[test]
    fn concurrent_first_lookup_yields_one_canonical_meter() {
        let registry = Arc::new(MetricRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || registry.meter("contended")));
        }
        let meters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for meter in &meters {
            assert!(Arc::ptr_eq(meter, &meters[0]));
        }
        assert_eq!(registry.meters().len(), 1);
    }

    #[test]
    fn timers_use_the_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        let registry = MetricRegistry::with_clock(clock.clone());

        let timer = registry.timer("op");
        let ctx = timer.start();
        clock.advance_millis(7);
        timer.stop(ctx);

        assert_eq!(timer.sample().sum, Duration::from_millis(7));
    }

    #[test]
    fn hdr_reservoirs_are_attached_when_configured() {
        let registry = MetricRegistry::new().with_reservoirs(ReservoirKind::Hdr);
        let timer = registry.timer("latency");
        timer.record(Duration::from_millis(5));
        assert!(timer.sample().percentiles.is_some());

        let plain = MetricRegistry::new();
        assert!(plain.timer("latency").sample().percentiles.is_none());
    }

    #[test]
    fn registry_time_decorator_records() {
        let registry = MetricRegistry::new();
        let out = registry.time("work", || "done");
        assert_eq!(out, "done");
        assert_eq!(registry.timer("work").sample().count, 1);
    }
}
