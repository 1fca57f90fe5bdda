#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region, grid cell, feature and accessibility record types.
//!
//! These are the values that flow between the grid, join, nearest-facility
//! and routing stages. Coordinates are WGS84 degrees throughout; `geo`
//! geometries use `x = longitude`, `y = latitude`.

use std::collections::BTreeMap;

use geo::{BoundingRect, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Converts to a `geo` point (`x = lon`, `y = lat`).
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    #[must_use]
    pub fn from_point(point: Point<f64>) -> Self {
        Self {
            lat: point.y(),
            lon: point.x(),
        }
    }

    /// Whether both components are finite and within WGS84 range.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// An axis-aligned bounding box in degrees, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Bounding box of a multipolygon, or `None` when it has no coordinates.
    #[must_use]
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(|rect| Self {
            min_lon: rect.min().x,
            min_lat: rect.min().y,
            max_lon: rect.max().x,
            max_lat: rect.max().y,
        })
    }

    #[must_use]
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (self.min_lon..=self.max_lon).contains(&coordinate.lon)
            && (self.min_lat..=self.max_lat).contains(&coordinate.lat)
    }

    /// Formats as `min_lon,min_lat,max_lon,max_lat`.
    #[must_use]
    pub fn to_bbox_string(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// A boundary polygon (or multipolygon) for an area of interest.
///
/// Immutable once constructed. Validation (non-empty, polygonal) happens in
/// the grid crate where regions enter the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Identifier used in logs and error messages (e.g. the place query).
    pub id: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    #[must_use]
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
        }
    }

    #[must_use]
    pub fn from_polygon(id: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self::new(id, MultiPolygon(vec![polygon]))
    }

    /// Whether the region has no polygon with a non-empty exterior ring.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry
            .0
            .iter()
            .all(|polygon| polygon.exterior().0.len() < 4)
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::of(&self.geometry)
    }
}

/// A hexagonal grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// H3 index in its canonical hexadecimal string form.
    pub id: String,
    pub resolution: u8,
    pub centroid: Coordinate,
    pub geometry: Polygon<f64>,
}

/// A point feature: a population sample or a point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub id: String,
    pub location: Coordinate,
    /// Numeric attributes (e.g. `population_2020`).
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl FeaturePoint {
    #[must_use]
    pub fn new(id: impl Into<String>, location: Coordinate) -> Self {
        Self {
            id: id.into(),
            location,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// A polygonal feature with numeric attributes, such as a census zone.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub attributes: BTreeMap<String, f64>,
}

impl AreaFeature {
    #[must_use]
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// A candidate destination such as a clinic or a school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub location: Coordinate,
    /// Facility type, e.g. `"hospital"` or `"pharmacy"`.
    #[serde(default)]
    pub kind: Option<String>,
}

impl Facility {
    #[must_use]
    pub fn new(id: impl Into<String>, location: Coordinate) -> Self {
        Self {
            id: id.into(),
            location,
            kind: None,
        }
    }
}

/// A grid cell with aggregated attributes from the spatial join.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedCell {
    pub cell: Cell,
    /// Aggregated values keyed by attribute name (e.g. `population`,
    /// `poi_count`).
    pub attributes: BTreeMap<String, f64>,
}

impl EnrichedCell {
    #[must_use]
    pub const fn new(cell: Cell) -> Self {
        Self {
            cell,
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the named attribute, or `0.0` when the join assigned nothing.
    #[must_use]
    pub fn attribute(&self, name: &str) -> f64 {
        self.attributes.get(name).copied().unwrap_or(0.0)
    }
}

/// One row of the accessibility output table.
///
/// `travel_time_minutes` is only present when the routing engine produced a
/// route for this origin; otherwise `distance_km` is the haversine
/// approximation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityRecord {
    pub origin_id: String,
    pub facility_id: String,
    pub distance_km: f64,
    pub travel_time_minutes: Option<f64>,
}

impl AccessibilityRecord {
    #[must_use]
    pub const fn is_routed(&self) -> bool {
        self.travel_time_minutes.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn bounding_box_is_edge_inclusive() {
        let bbox = BoundingBox::new(-77.1, -12.1, -77.0, -12.0);
        assert!(bbox.contains(Coordinate::new(-12.0, -77.0)));
        assert!(bbox.contains(Coordinate::new(-12.05, -77.05)));
        assert!(!bbox.contains(Coordinate::new(-11.99, -77.05)));
        assert_eq!(bbox.to_bbox_string(), "-77.1,-12.1,-77,-12");
    }

    #[test]
    fn empty_region_detected() {
        let empty = Region::new("empty", MultiPolygon(vec![]));
        assert!(empty.is_empty());
        assert!(empty.bounds().is_none());

        let square = Region::from_polygon(
            "square",
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)],
        );
        assert!(!square.is_empty());
        let bounds = square.bounds().unwrap();
        assert!((bounds.max_lat - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn coordinate_validity() {
        assert!(Coordinate::new(-12.0, -77.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn point_conversion_swaps_axes() {
        let c = Coordinate::new(10.0, 20.0);
        let p = c.to_point();
        assert!((p.x() - 20.0).abs() < f64::EPSILON);
        assert_eq!(Coordinate::from_point(p), c);
    }
}
