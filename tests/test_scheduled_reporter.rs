//! End-to-end tests for the scheduled sampling loop

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use windowed_metrics::metrics::MetricRegistry;
use windowed_metrics::report::{ReportError, Reporter, SampleSet, ScheduledReporter};

const PERIOD: Duration = Duration::from_millis(100);

/// Keeps every window it receives, in order.
#[derive(Default)]
struct RecordingSink {
    windows: Mutex<Vec<SampleSet>>,
}

impl RecordingSink {
    fn windows(&self) -> Vec<SampleSet> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reporter for RecordingSink {
    async fn report(&self, samples: &SampleSet) -> Result<(), ReportError> {
        self.windows.lock().unwrap().push(samples.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-sink"
    }
}

/// Fails every report but counts the attempts.
#[derive(Default)]
struct FailingSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl Reporter for FailingSink {
    async fn report(&self, _samples: &SampleSet) -> Result<(), ReportError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(ReportError::Other("sink is down".to_owned()))
    }

    fn name(&self) -> &str {
        "failing-sink"
    }
}

fn scheduler(sink: Arc<dyn Reporter>) -> (Arc<MetricRegistry>, ScheduledReporter) {
    let registry = Arc::new(MetricRegistry::new());
    let reporter = ScheduledReporter::builder(Arc::clone(&registry), sink)
        .period(PERIOD)
        .build();
    (registry, reporter)
}

/// Advance paused tokio time through `n` ticks, yielding so the worker runs.
async fn run_ticks(n: u32) {
    for _ in 0..n {
        tokio::time::sleep(PERIOD).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_each_pass_reports_only_the_new_window() {
    let sink = Arc::new(RecordingSink::default());
    let (registry, reporter) = scheduler(sink.clone());
    reporter.start();

    registry.meter("requests").mark_n(3);
    run_ticks(1).await;
    registry.meter("requests").mark_n(2);
    run_ticks(1).await;
    run_ticks(1).await; // idle window

    reporter.stop().await;
    let windows = sink.windows();
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0].meters["requests"].count, 3);
    assert_eq!(windows[1].meters["requests"].count, 2);
    assert_eq!(windows[2].meters["requests"].count, 0);

    // Lifetime total is untouched by sampling.
    assert_eq!(registry.meter("requests").total(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_timers_reset_between_passes() {
    let sink = Arc::new(RecordingSink::default());
    let (registry, reporter) = scheduler(sink.clone());
    reporter.start();

    registry.timer("latency").record(Duration::from_millis(40));
    registry.timer("latency").record(Duration::from_millis(10));
    run_ticks(1).await;
    registry.timer("latency").record(Duration::from_millis(7));
    run_ticks(1).await;

    reporter.stop().await;
    let windows = sink.windows();
    assert_eq!(windows[0].timers["latency"].count, 2);
    assert_eq!(windows[0].timers["latency"].max, Duration::from_millis(40));
    assert_eq!(windows[0].timers["latency"].min, Duration::from_millis(10));
    assert_eq!(windows[1].timers["latency"].count, 1);
    assert_eq!(windows[1].timers["latency"].max, Duration::from_millis(7));
}

#[tokio::test(start_paused = true)]
async fn test_first_pass_fires_one_full_period_after_start() {
    let sink = Arc::new(RecordingSink::default());
    let (_registry, reporter) = scheduler(sink.clone());
    reporter.start();

    tokio::time::sleep(PERIOD / 2).await;
    tokio::task::yield_now().await;
    assert!(sink.windows().is_empty());

    run_ticks(1).await;
    assert_eq!(sink.windows().len(), 1);

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_does_not_stop_the_schedule() {
    let sink = Arc::new(FailingSink::default());
    let (_registry, reporter) = scheduler(sink.clone());
    reporter.start();

    run_ticks(3).await;
    reporter.stop().await;
    assert_eq!(sink.attempts.load(Ordering::Relaxed), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_sampling() {
    let sink = Arc::new(RecordingSink::default());
    let (_registry, reporter) = scheduler(sink.clone());
    reporter.start();

    run_ticks(2).await;
    reporter.stop().await;
    let before = sink.windows().len();

    run_ticks(3).await;
    assert_eq!(sink.windows().len(), before);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_from_multiple_tasks() {
    let sink = Arc::new(RecordingSink::default());
    let (_registry, reporter) = scheduler(sink);
    let reporter = Arc::new(reporter);
    reporter.start();

    let first = tokio::spawn({
        let reporter = Arc::clone(&reporter);
        async move { reporter.stop().await }
    });
    reporter.close().await;
    first.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_report_now_is_independent_of_the_schedule() {
    let sink = Arc::new(RecordingSink::default());
    let (registry, reporter) = scheduler(sink.clone());

    registry.meter("requests").mark();
    reporter.report_now().await;
    assert_eq!(sink.windows().len(), 1);
    assert_eq!(sink.windows()[0].meters["requests"].count, 1);
}
