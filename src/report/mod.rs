//! Scheduled sampling and pluggable report sinks
//!
//! A [`ScheduledReporter`] owns one dedicated background worker that, on a
//! fixed cadence, samples every meter and timer in the registry into a
//! [`SampleSet`] and hands it to a [`Reporter`] sink. Only this worker ever
//! calls `sample()`; passes of one scheduler are mutually exclusive. A
//! failing sink is logged and never stops subsequent sampling.

mod console;
mod elasticsearch;

pub use console::ConsoleReporter;
pub use elasticsearch::{ElasticsearchReporter, ElasticsearchReporterBuilder, Node};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::metrics::{MeterSnapshot, MetricRegistry, TimerSnapshot};
use crate::transport::TransportError;

/// Default sampling period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);
/// Default grace period for cooperative shutdown, and again for forced
/// cancellation.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors a report sink may raise. All of them are contained at the
/// scheduling loop boundary: logged, dropped, never retried.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("sink i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// The product of one sampling pass, consumed exactly once by the paired
/// report call before the next pass overwrites the metrics' windows.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    /// Wall-clock export timestamp, epoch milliseconds.
    pub timestamp_millis: u64,
    /// Elapsed time covered by this window, for deriving per-second rates.
    pub window: Duration,
    pub meters: BTreeMap<String, MeterSnapshot>,
    pub timers: BTreeMap<String, TimerSnapshot>,
}

impl SampleSet {
    pub fn is_empty(&self) -> bool {
        self.meters.is_empty() && self.timers.is_empty()
    }
}

/// A sink that renders one sampled window (console text, remote bulk JSON).
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, samples: &SampleSet) -> Result<(), ReportError>;

    /// Identity used in scheduling-error diagnostics.
    fn name(&self) -> &str {
        "reporter"
    }
}

mod state {
    pub const CREATED: u8 = 0;
    pub const RUNNING: u8 = 1;
    pub const STOPPED: u8 = 2;
}

/// One sampling pass after another, never overlapping.
struct PassWorker {
    registry: Arc<MetricRegistry>,
    sink: Arc<dyn Reporter>,
    period: Duration,
    /// Serializes passes of this scheduler; the sink call happens with no
    /// metric-state lock held, so a slow export never delays producers.
    pass_lock: tokio::sync::Mutex<()>,
    /// Tick of the previous pass, 0 before the first one.
    last_pass_tick: AtomicU64,
}

impl PassWorker {
    /// Phase one: sample every meter, then every timer, into owned maps.
    fn collect(&self) -> SampleSet {
        let clock = self.registry.clock();
        let now_tick = clock.tick();
        let previous = self.last_pass_tick.swap(now_tick, Ordering::Relaxed);
        let window = if previous == 0 {
            self.period
        } else {
            Duration::from_nanos(now_tick.saturating_sub(previous))
        };

        let mut meters = BTreeMap::new();
        for entry in self.registry.meters().iter() {
            meters.insert(entry.key().clone(), entry.value().sample());
        }
        let mut timers = BTreeMap::new();
        for entry in self.registry.timers().iter() {
            timers.insert(entry.key().clone(), entry.value().sample());
        }

        SampleSet {
            timestamp_millis: clock.millis(),
            window,
            meters,
            timers,
        }
    }

    /// One full sample-then-report pass. Sink failures are contained here.
    async fn run_pass(&self) {
        let _pass = self.pass_lock.lock().await;
        let samples = self.collect();
        if let Err(error) = self.sink.report(&samples).await {
            error!(
                reporter = self.sink.name(),
                %error,
                "report failed; schedule continues"
            );
        }
    }
}

/// Drives a [`Reporter`] on a fixed cadence from one dedicated worker task.
///
/// Lifecycle is `Created → Running → Stopped` (terminal). `stop()` is
/// idempotent and safe to call from any task; it cooperatively cancels the
/// worker, waits a bounded grace period, then force-cancels.
pub struct ScheduledReporter {
    worker: Arc<PassWorker>,
    state: AtomicU8,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    graceful_timeout: Duration,
    forced_timeout: Duration,
}

/// Builder for [`ScheduledReporter`] cadence and shutdown bounds.
pub struct ScheduledReporterBuilder {
    registry: Arc<MetricRegistry>,
    sink: Arc<dyn Reporter>,
    period: Duration,
    graceful_timeout: Duration,
    forced_timeout: Duration,
}

impl ScheduledReporterBuilder {
    /// Sampling period; the first pass fires one full period after `start()`.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = timeout;
        self
    }

    pub fn forced_timeout(mut self, timeout: Duration) -> Self {
        self.forced_timeout = timeout;
        self
    }

    pub fn build(self) -> ScheduledReporter {
        let (shutdown, _) = watch::channel(false);
        ScheduledReporter {
            worker: Arc::new(PassWorker {
                registry: self.registry,
                sink: self.sink,
                period: self.period,
                pass_lock: tokio::sync::Mutex::new(()),
                last_pass_tick: AtomicU64::new(0),
            }),
            state: AtomicU8::new(state::CREATED),
            handle: Mutex::new(None),
            shutdown,
            graceful_timeout: self.graceful_timeout,
            forced_timeout: self.forced_timeout,
        }
    }
}

impl ScheduledReporter {
    pub fn new(registry: Arc<MetricRegistry>, sink: Arc<dyn Reporter>) -> Self {
        Self::builder(registry, sink).build()
    }

    pub fn builder(
        registry: Arc<MetricRegistry>,
        sink: Arc<dyn Reporter>,
    ) -> ScheduledReporterBuilder {
        ScheduledReporterBuilder {
            registry,
            sink,
            period: DEFAULT_PERIOD,
            graceful_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            forced_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Begin the periodic schedule. Only valid once, from the created state;
    /// later calls are ignored with a warning.
    pub fn start(&self) {
        if self
            .state
            .compare_exchange(
                state::CREATED,
                state::RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(
                reporter = self.worker.sink.name(),
                "start ignored; reporter already started or stopped"
            );
            return;
        }

        let worker = Arc::clone(&self.worker);
        let mut shutdown = self.shutdown.subscribe();
        let period = self.worker.period;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => worker.run_pass().await,
                    _ = shutdown.changed() => {
                        debug!(reporter = worker.sink.name(), "worker shutting down");
                        break;
                    }
                }
            }
        });
        self.store_handle(handle);
    }

    /// Stop the schedule: cooperative cancellation, a bounded graceful wait,
    /// then forced cancellation with a second bounded wait. Idempotent and
    /// callable from any task. Any in-flight pass is allowed to complete
    /// within the grace period.
    pub async fn stop(&self) {
        let previous = self.state.swap(state::STOPPED, Ordering::AcqRel);
        if previous == state::STOPPED {
            return;
        }
        let _ = self.shutdown.send(true);

        let Some(mut handle) = self.take_handle() else {
            return;
        };
        if timeout(self.graceful_timeout, &mut handle).await.is_ok() {
            return;
        }

        warn!(
            reporter = self.worker.sink.name(),
            "worker did not stop within {:?}; forcing cancellation", self.graceful_timeout
        );
        handle.abort();
        if timeout(self.forced_timeout, &mut handle).await.is_err() {
            error!(
                reporter = self.worker.sink.name(),
                "worker did not terminate after forced cancellation"
            );
        }
    }

    /// Alias for [`stop`](Self::stop).
    pub async fn close(&self) {
        self.stop().await;
    }

    /// Drive one sample-then-report pass immediately, outside the schedule.
    pub async fn report_now(&self) {
        self.worker.run_pass().await;
    }

    /// The sink this scheduler drives.
    pub fn sink(&self) -> Arc<dyn Reporter> {
        Arc::clone(&self.worker.sink)
    }

    fn store_handle(&self, handle: JoinHandle<()>) {
        let mut slot = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(handle);
    }

    fn take_handle(&self) -> Option<JoinHandle<()>> {
        let mut slot = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct CountingSink {
        passes: AtomicUsize,
    }

    #[async_trait]
    impl Reporter for CountingSink {
        async fn report(&self, _samples: &SampleSet) -> Result<(), ReportError> {
            self.passes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting-sink"
        }
    }

    #[tokio::test]
    async fn collect_diffs_every_registered_metric() {
        let clock = Arc::new(ManualClock::new());
        clock.set_millis(1_700_000_000_000);
        let registry = Arc::new(MetricRegistry::with_clock(clock.clone()));

        registry.meter("requests").mark_n(5);
        let timer = registry.timer("latency");
        let ctx = timer.start();
        clock.advance_millis(8);
        timer.stop(ctx);

        let scheduler = ScheduledReporter::new(registry, Arc::new(CountingSink::default()));
        let samples = scheduler.worker.collect();

        assert_eq!(samples.meters["requests"].count, 5);
        assert_eq!(samples.timers["latency"].count, 1);
        assert_eq!(samples.timers["latency"].sum, Duration::from_millis(8));
        assert_eq!(samples.timestamp_millis, 1_700_000_000_008);
        assert!(!samples.is_empty());
    }

    #[tokio::test]
    async fn first_window_falls_back_to_the_period() {
        let registry = Arc::new(MetricRegistry::with_clock(Arc::new(ManualClock::new())));
        let scheduler = ScheduledReporter::builder(registry, Arc::new(CountingSink::default()))
            .period(Duration::from_millis(250))
            .build();
        let samples = scheduler.worker.collect();
        assert_eq!(samples.window, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn measured_window_tracks_the_clock() {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(MetricRegistry::with_clock(clock.clone()));
        let scheduler = ScheduledReporter::new(registry, Arc::new(CountingSink::default()));

        clock.advance_millis(10);
        scheduler.worker.collect();
        clock.advance_millis(40);
        let samples = scheduler.worker.collect();
        assert_eq!(samples.window, Duration::from_millis(40));
    }

    #[tokio::test]
    async fn report_now_reaches_the_sink() {
        let registry = Arc::new(MetricRegistry::new());
        let sink = Arc::new(CountingSink::default());
        let scheduler = ScheduledReporter::new(registry, sink.clone());

        scheduler.report_now().await;
        scheduler.report_now().await;
        assert_eq!(sink.passes.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn start_twice_is_ignored() {
        let registry = Arc::new(MetricRegistry::new());
        let scheduler = ScheduledReporter::new(registry, Arc::new(CountingSink::default()));
        scheduler.start();
        scheduler.start(); // ignored, no second worker
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_safe() {
        let registry = Arc::new(MetricRegistry::new());
        let scheduler = ScheduledReporter::new(registry, Arc::new(CountingSink::default()));
        scheduler.stop().await;
        scheduler.stop().await;
    }
}
