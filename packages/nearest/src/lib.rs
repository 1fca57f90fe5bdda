#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nearest-facility resolution.
//!
//! Facilities are projected onto the unit sphere and bulk-loaded into an
//! R-tree once. Straight-line (chord) distance between unit vectors grows
//! monotonically with great-circle distance, so the R-tree's Euclidean
//! nearest neighbour is also the haversine nearest neighbour. Each origin is
//! one `O(log M)` query.

use geo::{Distance as _, Haversine};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use thiserror::Error;
use urban_access_geography_models::{Coordinate, Facility};

/// Errors from nearest-facility resolution.
#[derive(Debug, Error)]
pub enum NearestError {
    /// The facility set is empty.
    #[error("No facilities to resolve against")]
    NoFacilities,

    /// The origin set is empty.
    #[error("No origins to resolve")]
    NoOrigins,

    /// An origin or facility has a non-finite or out-of-range coordinate.
    #[error("Invalid coordinate for '{id}': ({lat}, {lon})")]
    InvalidCoordinate {
        /// Identifier of the offending point.
        id: String,
        /// Latitude as given.
        lat: f64,
        /// Longitude as given.
        lon: f64,
    },
}

/// A point to resolve (e.g. a grid cell centroid).
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub id: String,
    pub location: Coordinate,
}

impl Origin {
    #[must_use]
    pub fn new(id: impl Into<String>, location: Coordinate) -> Self {
        Self {
            id: id.into(),
            location,
        }
    }
}

/// The nearest facility for one origin.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    pub origin_id: String,
    pub origin: Coordinate,
    /// Position of the facility in the slice given to
    /// [`FacilityIndex::build`].
    pub facility_index: usize,
    pub facility_id: String,
    pub facility: Coordinate,
    /// Haversine distance in kilometres.
    pub distance_km: f64,
}

type Entry = GeomWithData<[f64; 3], usize>;

/// Spatial index over a static facility set.
pub struct FacilityIndex {
    facilities: Vec<Facility>,
    tree: RTree<Entry>,
}

impl FacilityIndex {
    /// Builds the index over `facilities`.
    ///
    /// # Errors
    ///
    /// Returns [`NearestError::NoFacilities`] for an empty set and
    /// [`NearestError::InvalidCoordinate`] for a facility with an invalid
    /// location.
    pub fn build(facilities: Vec<Facility>) -> Result<Self, NearestError> {
        if facilities.is_empty() {
            return Err(NearestError::NoFacilities);
        }

        let entries = facilities
            .iter()
            .enumerate()
            .map(|(i, f)| {
                check_coordinate(&f.id, f.location)?;
                Ok(Entry::new(unit_vector(f.location), i))
            })
            .collect::<Result<Vec<_>, NearestError>>()?;

        let tree = RTree::bulk_load(entries);
        log::debug!("Indexed {} facilities", tree.size());

        Ok(Self { facilities, tree })
    }

    #[must_use]
    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    /// Finds the nearest facility to a single location.
    ///
    /// Returns `(facility index, distance in km)`. Facilities at exactly the
    /// same chord distance resolve to the lowest index.
    #[must_use]
    pub fn nearest(&self, location: Coordinate) -> Option<(usize, f64)> {
        let query = unit_vector(location);
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);
        let (first, best_d2) = candidates.next()?;

        let index = candidates
            .take_while(|(_, d2)| *d2 <= best_d2)
            .map(|(entry, _)| entry.data)
            .fold(first.data, usize::min);

        let facility = self.facilities[index].location;
        Some((index, haversine_km(location, facility)))
    }

    /// Facilities within `radius_km` (great-circle, inclusive) of
    /// `location`, as `(facility index, distance in km)` sorted by index.
    #[must_use]
    pub fn within(&self, location: Coordinate, radius_km: f64) -> Vec<(usize, f64)> {
        if radius_km.is_nan() || radius_km < 0.0 {
            return Vec::new();
        }
        // Chord length on the unit sphere for the given arc, padded so that
        // rounding never drops a facility right at the radius.
        let half_angle = (radius_km / EARTH_RADIUS_KM / 2.0).min(std::f64::consts::FRAC_PI_2);
        let chord = 2.0 * half_angle.sin() * (1.0 + 1e-9);

        let mut found: Vec<(usize, f64)> = self
            .tree
            .locate_within_distance(unit_vector(location), chord * chord)
            .map(|entry| {
                let index = entry.data;
                (index, haversine_km(location, self.facilities[index].location))
            })
            .filter(|(_, km)| *km <= radius_km)
            .collect();
        found.sort_unstable_by_key(|(index, _)| *index);
        found
    }

    /// Resolves every origin to its nearest facility, preserving origin
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`NearestError::NoOrigins`] for an empty slice and
    /// [`NearestError::InvalidCoordinate`] for an origin with an invalid
    /// location.
    pub fn resolve(&self, origins: &[Origin]) -> Result<Vec<NearestMatch>, NearestError> {
        if origins.is_empty() {
            return Err(NearestError::NoOrigins);
        }

        let matches = origins
            .iter()
            .map(|origin| {
                check_coordinate(&origin.id, origin.location)?;
                let (facility_index, distance_km) = self
                    .nearest(origin.location)
                    .ok_or(NearestError::NoFacilities)?;
                let facility = &self.facilities[facility_index];
                Ok(NearestMatch {
                    origin_id: origin.id.clone(),
                    origin: origin.location,
                    facility_index,
                    facility_id: facility.id.clone(),
                    facility: facility.location,
                    distance_km,
                })
            })
            .collect::<Result<Vec<_>, NearestError>>()?;

        log::info!(
            "Resolved {} origins against {} facilities",
            matches.len(),
            self.facilities.len()
        );

        Ok(matches)
    }
}

/// Mean earth radius used by [`Haversine`], in kilometres.
const EARTH_RADIUS_KM: f64 = 6_371.008_8;

/// Great-circle distance in kilometres.
#[must_use]
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    Haversine.distance(a.to_point(), b.to_point()) / 1000.0
}

fn check_coordinate(id: &str, location: Coordinate) -> Result<(), NearestError> {
    if location.is_valid() {
        Ok(())
    } else {
        Err(NearestError::InvalidCoordinate {
            id: id.to_string(),
            lat: location.lat,
            lon: location.lon,
        })
    }
}

/// Projects a coordinate onto the unit sphere.
fn unit_vector(location: Coordinate) -> [f64; 3] {
    let (lat, lon) = (location.lat.to_radians(), location.lon.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}
