//! In-process metrics with windowed sampling and Elasticsearch export
//!
//! Applications register named [`Meter`](metrics::Meter)s and
//! [`Timer`](metrics::Timer)s in a [`MetricRegistry`](metrics::MetricRegistry)
//! and update them from any thread. A
//! [`ScheduledReporter`](report::ScheduledReporter) samples the registry on a
//! fixed cadence; each sample reads and resets every metric's window, so
//! reported counts are deltas since the previous pass, not lifetime totals.
//! Windows ship to a [`Reporter`](report::Reporter) sink: plain console
//! tables, or daily-indexed bulk NDJSON to an Elasticsearch cluster over an
//! interchangeable [`HttpSender`](transport::HttpSender) transport.
//!
//! ```no_run
//! use std::sync::Arc;
//! use windowed_metrics::config::MetricsConfig;
//!
//! # async fn demo() -> Result<(), windowed_metrics::config::ConfigError> {
//! let config = MetricsConfig::from_str(r#"
//!     [[nodes]]
//!     host = "es1.internal"
//! "#)?;
//! let registry = config.registry();
//! let reporter = Arc::new(config.build_reporter(Arc::clone(&registry)).await?);
//! reporter.start();
//!
//! registry.meter("requests").mark();
//! let result = registry.time("db.query", || 2 + 2);
//! assert_eq!(result, 4);
//!
//! reporter.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod net;
pub mod report;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::{Meter, MetricRegistry, Timer};
pub use report::{Reporter, SampleSet, ScheduledReporter};
