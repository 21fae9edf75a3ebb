//! Plain-text report sink for local inspection

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::time::Duration;

use super::{ReportError, Reporter, SampleSet};

/// Renders each sampled window as fixed-width tables on stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }

    fn render(samples: &SampleSet) -> String {
        let stamp = Utc
            .timestamp_millis_opt(samples.timestamp_millis as i64)
            .single()
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
            .unwrap_or_else(|| format!("@{}ms", samples.timestamp_millis));

        let mut out = String::new();
        out.push_str(&format!(
            "-- {} (window {:.3}s) {}\n",
            stamp,
            samples.window.as_secs_f64(),
            "-".repeat(24)
        ));

        if !samples.meters.is_empty() {
            out.push_str(&format!(
                "{:<40} {:>10} {:>12}\n",
                "meter", "count", "rate/s"
            ));
            for (name, meter) in &samples.meters {
                out.push_str(&format!(
                    "{:<40} {:>10} {:>12.2}\n",
                    name,
                    meter.count,
                    meter.rate(samples.window)
                ));
            }
        }

        if !samples.timers.is_empty() {
            out.push_str(&format!(
                "{:<40} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
                "timer", "count", "sum ms", "avg ms", "max ms", "min ms"
            ));
            for (name, timer) in &samples.timers {
                out.push_str(&format!(
                    "{:<40} {:>10} {:>10.3} {:>10.3} {:>10.3} {:>10.3}\n",
                    name,
                    timer.count,
                    millis(timer.sum),
                    millis(timer.avg()),
                    millis(timer.max),
                    millis(timer.min)
                ));
                if let Some(p) = &timer.percentiles {
                    out.push_str(&format!(
                        "{:<40} p75={:.3} p95={:.3} p98={:.3} p99={:.3} p999={:.3}\n",
                        "", p.p75, p.p95, p.p98, p.p99, p.p999
                    ));
                }
            }
        }

        out
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn report(&self, samples: &SampleSet) -> Result<(), ReportError> {
        print!("{}", Self::render(samples));
        Ok(())
    }

    fn name(&self) -> &str {
        "console-reporter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MeterSnapshot, PercentileSet, TimerSnapshot};

    fn samples() -> SampleSet {
        let mut set = SampleSet {
            timestamp_millis: 1_700_000_000_000,
            window: Duration::from_secs(1),
            ..SampleSet::default()
        };
        set.meters
            .insert("requests".to_owned(), MeterSnapshot { count: 50 });
        set.timers.insert(
            "latency".to_owned(),
            TimerSnapshot {
                count: 2,
                sum: Duration::from_millis(30),
                max: Duration::from_millis(20),
                min: Duration::from_millis(10),
                percentiles: None,
            },
        );
        set
    }

    #[test]
    fn render_lists_every_metric_with_rates() {
        let text = ConsoleReporter::render(&samples());
        assert!(text.contains("2023-11-14"));
        assert!(text.contains("requests"));
        assert!(text.contains("50.00"));
        assert!(text.contains("latency"));
        assert!(text.contains("30.000"));
        assert!(text.contains("15.000")); // avg of 10ms and 20ms
    }

    #[test]
    fn render_includes_percentiles_when_present() {
        let mut set = samples();
        set.timers.get_mut("latency").unwrap().percentiles = Some(PercentileSet {
            p75: 1.0,
            p95: 2.0,
            p98: 3.0,
            p99: 4.0,
            p999: 5.0,
        });
        let text = ConsoleReporter::render(&set);
        assert!(text.contains("p999=5.000"));
    }

    #[tokio::test]
    async fn report_never_fails() {
        let reporter = ConsoleReporter::new();
        assert!(reporter.report(&SampleSet::default()).await.is_ok());
        assert_eq!(reporter.name(), "console-reporter");
    }
}
