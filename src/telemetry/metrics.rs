//! Metric instrument factories for redq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"redq"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for redq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("redq")
}

/// Counter: calls into a primitive.
/// Labels: `primitive` ("queue" | "unique_queue" | "pool"), `operation`.
pub fn operations() -> Counter<u64> {
    meter()
        .u64_counter("redq.operations")
        .with_description("Number of primitive operations")
        .build()
}

/// Counter: items moved by an operation (added, leased, acked, reclaimed).
/// Labels: `primitive`, `operation`.
pub fn items() -> Counter<u64> {
    meter()
        .u64_counter("redq.items")
        .with_description("Number of items moved by primitive operations")
        .build()
}

/// Counter: pipelines that hit a cold script cache and fell back.
/// Labels: `script`.
pub fn script_cache_misses() -> Counter<u64> {
    meter()
        .u64_counter("redq.script_cache_misses")
        .with_description("Pipelined scripts rejected with NOSCRIPT")
        .build()
}

/// Counter: replica waits that came back short.
/// Labels: `required`.
pub fn replica_sync_shortfalls() -> Counter<u64> {
    meter()
        .u64_counter("redq.replica_sync.shortfalls")
        .with_description("Writes acknowledged by fewer replicas than required")
        .build()
}
