#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Routed travel-time enrichment.
//!
//! Replaces the haversine approximation from the nearest-facility stage with
//! travel time and distance from an external routing engine. The engine is
//! abstracted behind [`RoutingService`]; [`osrm::OsrmClient`] talks to an
//! `osrm-routed` instance.
//!
//! Enrichment degrades per batch: a batch that errors or times out keeps
//! its approximate distances and gets no travel time. It never fails the
//! run. See [`enrich::enrich`].

pub mod config;
pub mod enrich;
pub mod osrm;
pub mod progress;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use urban_access_geography_models::Coordinate;

/// Errors from a routing request.
///
/// These are per batch and never escape [`enrich::enrich`].
#[derive(Debug, Error)]
pub enum RoutingError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Routing service returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not have the expected shape.
    #[error("Malformed routing response: {message}")]
    Payload {
        /// Description of the problem.
        message: String,
    },

    /// The batch did not complete within its timeout.
    #[error("Routing batch {batch_index} timed out after {timeout:?}")]
    Timeout {
        /// Index of the batch that timed out.
        batch_index: usize,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

/// An origin/destination pair to route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdPair {
    pub origin: Coordinate,
    pub destination: Coordinate,
}

/// A routed result for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLeg {
    /// Travel time in seconds.
    pub duration_seconds: f64,
    /// Network distance in metres.
    pub distance_meters: f64,
}

impl RouteLeg {
    /// Whether both values are finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.duration_seconds.is_finite()
            && self.distance_meters.is_finite()
            && self.duration_seconds >= 0.0
            && self.distance_meters >= 0.0
    }
}

/// A routing engine that answers batches of origin/destination pairs.
#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Routes every pair with the given travel profile (e.g. `"foot"`,
    /// `"car"`).
    ///
    /// Returns one entry per pair, in order. `None` means the engine found
    /// no route for that pair.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when the whole batch failed.
    async fn route_batch(
        &self,
        profile: &str,
        pairs: &[OdPair],
    ) -> Result<Vec<Option<RouteLeg>>, RoutingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_leg_validity() {
        assert!(RouteLeg {
            duration_seconds: 60.0,
            distance_meters: 500.0
        }
        .is_valid());
        assert!(!RouteLeg {
            duration_seconds: f64::NAN,
            distance_meters: 500.0
        }
        .is_valid());
        assert!(!RouteLeg {
            duration_seconds: 10.0,
            distance_meters: -1.0
        }
        .is_valid());
    }
}
