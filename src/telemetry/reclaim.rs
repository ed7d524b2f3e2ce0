//! Reclaim span helpers.
//!
//! Garbage collection of abandoned leases runs under one span per pass so
//! the per-list events can be correlated.

use tracing::Span;

/// Start a span for one reclaim pass over `primitive` named `name`.
///
/// `reclaim.lists` is declared empty and filled in by [`record_lists`].
pub fn start_reclaim_span(primitive: &str, name: &str, mode: &str) -> Span {
    tracing::info_span!(
        "redq.reclaim",
        "reclaim.primitive" = primitive,
        "reclaim.name" = name,
        "reclaim.mode" = mode,
        "reclaim.lists" = tracing::field::Empty,
    )
}

/// Record how many processing lists the pass touched.
pub fn record_lists(span: &Span, lists: usize) {
    span.record("reclaim.lists", lists);
}

/// Emit an event for one processing list returned or dropped.
pub fn record_list(span: &Span, processing: &str, items: i64) {
    span.in_scope(|| {
        tracing::info!(processing = processing, items = items, "processing list reclaimed");
    });
}
