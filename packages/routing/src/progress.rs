//! Progress reporting for routing runs.
//!
//! [`enrich`](crate::enrich::enrich) reports per batch, so a front end can
//! show how many batches came back and how many of them fell back to the
//! haversine approximation. Rendering lives in the CLI crates.

use std::sync::Arc;

/// Receives routing progress. Shared across tasks behind an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Called once before any request, with the number of batches.
    fn start(&self, batches: u64, service: &str);

    /// A batch came back. `failed` is set when it stays approximated.
    fn batch_received(&self, failed: bool);

    /// The run is over; `summary` is a one-line outcome.
    fn finish(&self, summary: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn start(&self, _batches: u64, _service: &str) {}
    fn batch_received(&self, _failed: bool) {}
    fn finish(&self, _summary: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
