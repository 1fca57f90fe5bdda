//! Batched, concurrent travel-time enrichment with approximation fallback.
//!
//! Every match starts as an approximated record (haversine distance, no
//! travel time). Pairs are split into batches which run at most
//! `concurrency` at a time, each under its own timeout. Outcomes are
//! collected first and merged afterwards, so batches never share a mutable
//! accumulator. A failed, timed-out or cancelled batch simply keeps its
//! approximation.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use futures::stream;
use tokio_util::sync::CancellationToken;
use urban_access_geography_models::AccessibilityRecord;
use urban_access_nearest::NearestMatch;

use crate::progress::ProgressCallback;
use crate::{OdPair, RouteLeg, RoutingError, RoutingService};

/// Batching and concurrency settings for [`enrich`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Travel profile passed to the routing service.
    pub profile: String,
    /// Pairs per batch. Zero is treated as one.
    pub batch_size: usize,
    /// Batches in flight. Zero is treated as one.
    pub concurrency: usize,
    /// Upper bound on one batch, retries included.
    pub batch_timeout: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            profile: "foot".to_string(),
            batch_size: 100,
            concurrency: 4,
            batch_timeout: Duration::from_secs(30),
        }
    }
}

/// Lifecycle of one batch. `Routed` and `Approximated` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Routed,
    Approximated,
}

/// Counts describing how an enrichment run went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub batches: usize,
    pub routed_batches: usize,
    pub approximated_batches: usize,
    /// Pairs that received a routed travel time.
    pub routed_pairs: usize,
    /// Whether the run was cut short by the cancellation token.
    pub cancelled: bool,
}

/// Output of [`enrich`]: one record per input match, in input order.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub records: Vec<AccessibilityRecord>,
    pub summary: EnrichmentSummary,
    /// Final state of each batch, by batch index.
    pub batch_states: Vec<BatchState>,
}

type BatchOutcome = (usize, Result<Vec<Option<RouteLeg>>, RoutingError>);

/// Builds the approximated record for a match.
#[must_use]
pub fn approximate(m: &NearestMatch) -> AccessibilityRecord {
    AccessibilityRecord {
        origin_id: m.origin_id.clone(),
        facility_id: m.facility_id.clone(),
        distance_km: m.distance_km,
        travel_time_minutes: None,
    }
}

fn batch_ranges(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// Replaces approximate distances with routed travel times where the
/// service can provide them.
///
/// Never fails and never drops a row: whatever could not be routed keeps
/// its haversine distance and `travel_time_minutes = None`. When `cancel`
/// fires, outstanding batches are dropped (aborting their requests) and
/// stay approximated; batches already received are still merged.
pub async fn enrich(
    service: &dyn RoutingService,
    matches: &[NearestMatch],
    options: &EnrichOptions,
    cancel: &CancellationToken,
    progress: &Arc<dyn ProgressCallback>,
) -> Enrichment {
    let mut records: Vec<AccessibilityRecord> = matches.iter().map(approximate).collect();
    let ranges = batch_ranges(matches.len(), options.batch_size.max(1));
    let mut batch_states = vec![BatchState::Pending; ranges.len()];
    let mut summary = EnrichmentSummary {
        batches: ranges.len(),
        ..EnrichmentSummary::default()
    };

    if ranges.is_empty() {
        return Enrichment {
            records,
            summary,
            batch_states,
        };
    }

    log::info!(
        "Routing {} pairs in {} batches via {} (profile {}, concurrency {})",
        matches.len(),
        ranges.len(),
        service.name(),
        options.profile,
        options.concurrency.max(1)
    );
    progress.start(ranges.len() as u64, service.name());

    let timeout = options.batch_timeout;
    let profile = options.profile.as_str();

    let mut batches = Box::pin(
        stream::iter(ranges.iter().cloned().enumerate())
            .map(|(batch_index, range)| {
                let pairs: Vec<OdPair> = matches[range]
                    .iter()
                    .map(|m| OdPair {
                        origin: m.origin,
                        destination: m.facility,
                    })
                    .collect();
                async move {
                    let result =
                        match tokio::time::timeout(timeout, service.route_batch(profile, &pairs))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(RoutingError::Timeout {
                                batch_index,
                                timeout,
                            }),
                        };
                    (batch_index, result)
                }
            })
            .buffer_unordered(options.concurrency.max(1))
    );

    let mut outcomes: Vec<BatchOutcome> = Vec::with_capacity(ranges.len());
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                log::warn!(
                    "Routing cancelled with {} of {} batches received",
                    outcomes.len(),
                    ranges.len()
                );
                summary.cancelled = true;
                break;
            }
            next = batches.next() => {
                let Some(outcome) = next else { break };
                let (batch_index, result) = &outcome;
                let expected = ranges[*batch_index].len();
                progress.batch_received(!matches!(result, Ok(legs) if legs.len() == expected));
                outcomes.push(outcome);
            }
        }
    }

    // Dropping the stream aborts requests still in flight.
    drop(batches);

    for (batch_index, result) in outcomes {
        let range = ranges[batch_index].clone();
        batch_states[batch_index] = match result {
            Ok(legs) if legs.len() == range.len() => {
                for (record, leg) in records[range].iter_mut().zip(legs) {
                    if let Some(leg) = leg.filter(RouteLeg::is_valid) {
                        record.distance_km = leg.distance_meters / 1000.0;
                        record.travel_time_minutes = Some(leg.duration_seconds / 60.0);
                        summary.routed_pairs += 1;
                    }
                }
                BatchState::Routed
            }
            Ok(legs) => {
                log::warn!(
                    "Routing batch {batch_index}: expected {} legs, got {}; keeping approximation",
                    range.len(),
                    legs.len()
                );
                BatchState::Approximated
            }
            Err(e) => {
                log::warn!("Routing batch {batch_index} failed: {e}; keeping approximation");
                BatchState::Approximated
            }
        };
    }

    for state in &mut batch_states {
        if *state == BatchState::Pending {
            *state = BatchState::Approximated;
        }
    }

    summary.routed_batches = batch_states
        .iter()
        .filter(|s| **s == BatchState::Routed)
        .count();
    summary.approximated_batches = summary.batches - summary.routed_batches;

    let message = format!(
        "Routed {}/{} pairs ({} of {} batches approximated)",
        summary.routed_pairs,
        records.len(),
        summary.approximated_batches,
        summary.batches
    );
    log::info!("{message}");
    progress.finish(message);

    Enrichment {
        records,
        summary,
        batch_states,
    }
}
