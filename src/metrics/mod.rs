//! Concurrent metric primitives and the registry that owns them
//!
//! Application threads record events through [`Meter`] and [`Timer`] handles
//! created by a [`MetricRegistry`]. All recording paths are lock-free atomic
//! updates; the only serialized actor is the sampling worker, which calls
//! `sample()` on every metric once per reporting tick to capture the
//! delta-since-last-sample window.

mod meter;
mod registry;
mod reservoir;
mod timer;

pub use meter::{Meter, MeterSnapshot};
pub use registry::{MetricRegistry, ReservoirKind};
pub use reservoir::{HdrReservoir, PercentileSet, Reservoir};
pub use timer::{Timer, TimerContext, TimerSnapshot};
