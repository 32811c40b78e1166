/// Metrics Module - Prometheus Instrumentation
///
/// Process-wide counters and gauges for the indexing pipeline plus a
/// read-latency histogram for the query surface. Registered once
/// against the default registry and exposed through /metrics.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};

/// Latency buckets for point reads (seconds).
const READ_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

lazy_static! {
    /// Heights fully indexed since process start.
    pub static ref HEIGHTS_INDEXED: IntCounter = register_int_counter!(
        "chronicle_heights_indexed_total",
        "Number of heights fully indexed since process start"
    )
    .unwrap();

    /// Trie updates pulled from the WAL and applied.
    pub static ref UPDATES_APPLIED: IntCounter = register_int_counter!(
        "chronicle_trie_updates_applied_total",
        "Number of WAL trie updates applied to the state trie"
    )
    .unwrap();

    /// Register writes persisted to the payload store.
    pub static ref REGISTERS_WRITTEN: IntCounter = register_int_counter!(
        "chronicle_registers_written_total",
        "Number of register values written to the payload store"
    )
    .unwrap();

    /// Last height made durable in the index.
    pub static ref LAST_INDEXED_HEIGHT: IntGauge = register_int_gauge!(
        "chronicle_last_indexed_height",
        "Most recent height made durable in the index"
    )
    .unwrap();

    /// Latency of register point reads served over the API.
    pub static ref REGISTER_READ_SECONDS: Histogram = register_histogram!(
        "chronicle_register_read_seconds",
        "Latency of register point-in-time reads",
        READ_BUCKETS.to_vec()
    )
    .unwrap();
}

/// Render the default registry in Prometheus text exposition format.
pub fn gather() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
