//! Default values for configuration fields
//!
//! Centralizes the default value functions used in serde deserialization.

/// Default Elasticsearch major version the templates target
#[inline]
pub fn es_major_version() -> u8 {
    7
}

/// Default index name prefix
#[inline]
pub fn index_prefix() -> String {
    "metrics".to_owned()
}

/// Default sampling period (one second)
#[inline]
pub fn sample_interval_ms() -> u64 {
    1_000
}

/// Default graceful shutdown wait
#[inline]
pub fn graceful_shutdown_ms() -> u64 {
    3_000
}

/// Default forced shutdown wait after cancellation
#[inline]
pub fn forced_shutdown_ms() -> u64 {
    3_000
}

/// Default Elasticsearch port
#[inline]
pub fn node_port() -> u16 {
    9200
}
