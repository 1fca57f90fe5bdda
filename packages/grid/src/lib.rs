#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hexagonal grid generation over a region.
//!
//! Cells come from the global H3 tiling, so the same region and resolution
//! always produce the same cell set regardless of the region's bounding
//! box. Coverage uses [`ContainmentMode::Covers`]: every point of the region
//! lies in at least one returned cell.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr as _;

use geo::{Centroid, Coord, LineString, Polygon};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use thiserror::Error;
use urban_access_geography_models::{Cell, Coordinate, EnrichedCell, Region};

/// Finest H3 resolution.
pub const MAX_RESOLUTION: u8 = 15;

/// Errors from grid operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// The region is empty, unparseable or has invalid coordinates.
    #[error("Invalid region '{region_id}': {reason}")]
    InvalidRegion {
        /// Identifier of the offending region.
        region_id: String,
        /// Why the region was rejected.
        reason: String,
    },

    /// Resolution outside `0..=15`, or a downsampling target finer than
    /// the input cells.
    #[error("Unsupported H3 resolution {resolution}")]
    UnsupportedResolution {
        /// The rejected resolution.
        resolution: u8,
    },

    /// A cell identifier is not a valid H3 index.
    #[error("Invalid cell index '{id}'")]
    InvalidCell {
        /// The rejected identifier.
        id: String,
    },
}

/// Validates an H3 resolution.
///
/// # Errors
///
/// Returns [`GridError::UnsupportedResolution`] outside `0..=15`.
pub fn parse_resolution(resolution: u8) -> Result<Resolution, GridError> {
    Resolution::try_from(resolution).map_err(|_| GridError::UnsupportedResolution { resolution })
}

/// Checks that a region has at least one ring and only valid WGS84
/// coordinates.
///
/// # Errors
///
/// Returns [`GridError::InvalidRegion`] describing the first problem found.
pub fn validate_region(region: &Region) -> Result<(), GridError> {
    let invalid = |reason: &str| GridError::InvalidRegion {
        region_id: region.id.clone(),
        reason: reason.to_string(),
    };

    if region.is_empty() {
        return Err(invalid("region has no polygon with a closed exterior ring"));
    }

    let all_valid = region.geometry.0.iter().all(|polygon| {
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .flat_map(|ring| ring.coords())
            .all(|c| Coordinate::new(c.y, c.x).is_valid())
    });
    if !all_valid {
        return Err(invalid("region has coordinates outside WGS84 range"));
    }

    Ok(())
}

/// Parses a region from `GeoJSON` text (geometry, feature or feature
/// collection) and validates it.
///
/// # Errors
///
/// Returns [`GridError::InvalidRegion`] if the text has no polygonal
/// geometry or the geometry fails [`validate_region`].
pub fn region_from_geojson(id: &str, geojson: &str) -> Result<Region, GridError> {
    let geometry = urban_access_spatial::parse_geojson_to_multipolygon(geojson).ok_or_else(|| {
        GridError::InvalidRegion {
            region_id: id.to_string(),
            reason: "no polygon or multipolygon geometry found".to_string(),
        }
    })?;
    let region = Region::new(id, geometry);
    validate_region(&region)?;
    Ok(region)
}

/// Partitions a region into H3 cells at the given resolution.
///
/// Cells are returned sorted by index. A region smaller than one cell
/// yields at least the cell containing its centroid.
///
/// # Errors
///
/// Returns [`GridError::UnsupportedResolution`] before any work when the
/// resolution is out of range, and [`GridError::InvalidRegion`] when the
/// region is empty or cannot be tiled.
pub fn generate_cells(region: &Region, resolution: u8) -> Result<Vec<Cell>, GridError> {
    let h3_resolution = parse_resolution(resolution)?;
    validate_region(region)?;

    let mut tiler = TilerBuilder::new(h3_resolution)
        .containment_mode(ContainmentMode::Covers)
        .build();

    for polygon in &region.geometry.0 {
        tiler
            .add(polygon.clone())
            .map_err(|e| GridError::InvalidRegion {
                region_id: region.id.clone(),
                reason: e.to_string(),
            })?;
    }

    let mut indexes: BTreeSet<CellIndex> = tiler.into_coverage().collect();

    if indexes.is_empty() {
        let centroid = region
            .geometry
            .centroid()
            .ok_or_else(|| GridError::InvalidRegion {
                region_id: region.id.clone(),
                reason: "region has no centroid".to_string(),
            })?;
        let latlng = LatLng::new(centroid.y(), centroid.x()).map_err(|e| {
            GridError::InvalidRegion {
                region_id: region.id.clone(),
                reason: e.to_string(),
            }
        })?;
        log::debug!(
            "Region {} is smaller than one resolution-{resolution} cell, using centroid cell",
            region.id
        );
        indexes.insert(latlng.to_cell(h3_resolution));
    }

    log::info!(
        "Generated {} resolution-{resolution} cells for region {}",
        indexes.len(),
        region.id
    );

    Ok(indexes.into_iter().map(cell_from_index).collect())
}

/// Builds a [`Cell`] (id, centroid, hexagon polygon) from an H3 index.
///
/// A hexagon crossing the antimeridian keeps a contiguous ring: its
/// western-hemisphere vertices are shifted by +360 degrees, so the polygon
/// extends past 180 instead of wrapping around the globe.
#[must_use]
pub fn cell_from_index(index: CellIndex) -> Cell {
    let center = LatLng::from(index);
    let mut ring: Vec<Coord<f64>> = index
        .boundary()
        .iter()
        .map(|vertex| Coord {
            x: vertex.lng(),
            y: vertex.lat(),
        })
        .collect();
    unwrap_antimeridian(&mut ring);

    Cell {
        id: index.to_string(),
        resolution: u8::from(index.resolution()),
        centroid: Coordinate::new(center.lat(), center.lng()),
        geometry: Polygon::new(LineString::from(ring), vec![]),
    }
}

fn unwrap_antimeridian(ring: &mut [Coord<f64>]) {
    let (min, max) = ring
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.x), hi.max(c.x))
        });
    if max - min > 180.0 {
        for coord in ring.iter_mut().filter(|c| c.x < 0.0) {
            coord.x += 360.0;
        }
    }
}

/// Finds which cell of a grid contains a point, by H3 index lookup.
///
/// Exact for any point on the globe, including cells that cross the
/// antimeridian. Every point maps to exactly one H3 cell; the lookup fails
/// when that cell is not part of the grid.
pub struct CellLocator {
    resolution: Resolution,
    positions: HashMap<CellIndex, usize>,
}

impl CellLocator {
    /// Indexes `cells`, which must all be at `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnsupportedResolution`] for a resolution outside
    /// `0..=15` or a cell at another resolution, and
    /// [`GridError::InvalidCell`] for an unparseable id.
    pub fn new(cells: &[Cell], resolution: u8) -> Result<Self, GridError> {
        let h3_resolution = parse_resolution(resolution)?;
        let mut positions = HashMap::with_capacity(cells.len());
        for (position, cell) in cells.iter().enumerate() {
            let index = parse_cell_index(&cell.id)?;
            if index.resolution() != h3_resolution {
                return Err(GridError::UnsupportedResolution {
                    resolution: cell.resolution,
                });
            }
            positions.entry(index).or_insert(position);
        }
        Ok(Self {
            resolution: h3_resolution,
            positions,
        })
    }

    /// Position in the indexed slice of the cell containing `coordinate`.
    #[must_use]
    pub fn locate(&self, coordinate: Coordinate) -> Option<usize> {
        let latlng = LatLng::new(coordinate.lat, coordinate.lon).ok()?;
        self.positions
            .get(&latlng.to_cell(self.resolution))
            .copied()
    }
}

/// Builds a [`Cell`] from its string identifier.
///
/// # Errors
///
/// Returns [`GridError::InvalidCell`] if `id` is not an H3 cell index.
pub fn cell_from_id(id: &str) -> Result<Cell, GridError> {
    parse_cell_index(id).map(cell_from_index)
}

fn parse_cell_index(id: &str) -> Result<CellIndex, GridError> {
    CellIndex::from_str(id).map_err(|_| GridError::InvalidCell { id: id.to_string() })
}

/// Re-indexes enriched cells to their parents at a coarser resolution,
/// summing attributes of all children that share a parent.
///
/// # Errors
///
/// Returns [`GridError::UnsupportedResolution`] when `coarse_resolution` is
/// out of range or finer than any input cell, and [`GridError::InvalidCell`]
/// for unparseable cell ids.
pub fn downsample(
    cells: &[EnrichedCell],
    coarse_resolution: u8,
) -> Result<Vec<EnrichedCell>, GridError> {
    let coarse = parse_resolution(coarse_resolution)?;
    let mut parents: BTreeMap<CellIndex, BTreeMap<String, f64>> = BTreeMap::new();

    for enriched in cells {
        let index = parse_cell_index(&enriched.cell.id)?;
        let parent = index
            .parent(coarse)
            .ok_or(GridError::UnsupportedResolution {
                resolution: coarse_resolution,
            })?;

        let totals = parents.entry(parent).or_default();
        for (name, value) in &enriched.attributes {
            *totals.entry(name.clone()).or_insert(0.0) += value;
        }
    }

    log::info!(
        "Downsampled {} cells to {} resolution-{coarse_resolution} parents",
        cells.len(),
        parents.len()
    );

    Ok(parents
        .into_iter()
        .map(|(index, attributes)| EnrichedCell {
            cell: cell_from_index(index),
            attributes,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{BoundingRect, Contains, MultiPolygon, polygon};

    fn lima_square() -> Region {
        Region::from_polygon(
            "lima-square",
            polygon![
                (x: -77.05, y: -12.05),
                (x: -77.00, y: -12.05),
                (x: -77.00, y: -12.00),
                (x: -77.05, y: -12.00),
            ],
        )
    }

    fn sample_points(region_bounds: (f64, f64, f64, f64), steps: usize) -> Vec<(f64, f64)> {
        let (min_lon, min_lat, max_lon, max_lat) = region_bounds;
        let mut points = Vec::new();
        for i in 0..=steps {
            for j in 0..=steps {
                #[allow(clippy::cast_precision_loss)]
                let (fx, fy) = (i as f64 / steps as f64, j as f64 / steps as f64);
                points.push((
                    (max_lon - min_lon).mul_add(fx, min_lon),
                    (max_lat - min_lat).mul_add(fy, min_lat),
                ));
            }
        }
        points
    }

    #[test]
    fn rejects_out_of_range_resolution_first() {
        let empty = Region::new("empty", MultiPolygon(vec![]));
        let err = generate_cells(&empty, 16).unwrap_err();
        assert!(matches!(
            err,
            GridError::UnsupportedResolution { resolution: 16 }
        ));
    }

    #[test]
    fn rejects_empty_region() {
        let empty = Region::new("empty", MultiPolygon(vec![]));
        let err = generate_cells(&empty, 8).unwrap_err();
        assert!(matches!(err, GridError::InvalidRegion { ref region_id, .. } if region_id == "empty"));
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let region = Region::from_polygon(
            "bad",
            polygon![(x: 0.0, y: 0.0), (x: 200.0, y: 0.0), (x: 200.0, y: 1.0)],
        );
        assert!(matches!(
            validate_region(&region),
            Err(GridError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn cells_cover_every_point_of_the_region() {
        let region = lima_square();
        let resolution = 8;
        let cells = generate_cells(&region, resolution).unwrap();
        assert!(!cells.is_empty());

        let ids: BTreeSet<&str> = cells.iter().map(|c| c.id.as_str()).collect();
        let res = parse_resolution(resolution).unwrap();

        for (lon, lat) in sample_points((-77.05, -12.05, -77.00, -12.00), 25) {
            let cell = LatLng::new(lat, lon).unwrap().to_cell(res).to_string();
            assert!(ids.contains(cell.as_str()), "point ({lat}, {lon}) not covered");
        }
    }

    #[test]
    fn cells_do_not_overlap() {
        let cells = generate_cells(&lima_square(), 8).unwrap();
        let ids: BTreeSet<&str> = cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), cells.len());

        for (lon, lat) in sample_points((-77.05, -12.05, -77.00, -12.00), 20) {
            let point = geo::Point::new(lon, lat);
            let containing = cells
                .iter()
                .filter(|c| c.geometry.contains(&point))
                .count();
            assert!(containing <= 1, "point ({lat}, {lon}) in {containing} cells");
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate_cells(&lima_square(), 9).unwrap();
        let b = generate_cells(&lima_square(), 9).unwrap();
        let ids_a: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert!(a.iter().all(|c| c.resolution == 9));
    }

    #[test]
    fn tiny_region_yields_centroid_cell() {
        let tiny = Region::from_polygon(
            "tiny",
            polygon![
                (x: -77.03001, y: -12.02001),
                (x: -77.03000, y: -12.02001),
                (x: -77.03000, y: -12.02000),
            ],
        );
        let cells = generate_cells(&tiny, 5).unwrap();
        assert!(!cells.is_empty());

        let centroid = tiny.geometry.centroid().unwrap();
        let expected = LatLng::new(centroid.y(), centroid.x())
            .unwrap()
            .to_cell(parse_resolution(5).unwrap())
            .to_string();
        assert!(cells.iter().any(|c| c.id == expected));
    }

    #[test]
    fn cell_round_trips_through_id() {
        let cells = generate_cells(&lima_square(), 7).unwrap();
        let first = &cells[0];
        let rebuilt = cell_from_id(&first.id).unwrap();
        assert_eq!(&rebuilt, first);
        assert!(matches!(
            cell_from_id("not-a-cell"),
            Err(GridError::InvalidCell { .. })
        ));
    }

    #[test]
    fn centroid_lies_inside_cell_polygon() {
        for cell in generate_cells(&lima_square(), 8).unwrap() {
            assert!(cell.geometry.contains(&cell.centroid.to_point()));
        }
    }

    #[test]
    fn downsample_preserves_totals() {
        let cells = generate_cells(&lima_square(), 9).unwrap();
        let enriched: Vec<EnrichedCell> = cells
            .into_iter()
            .map(|cell| {
                let mut e = EnrichedCell::new(cell);
                e.attributes.insert("population".to_string(), 2.0);
                e
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let expected = enriched.len() as f64 * 2.0;

        let coarse = downsample(&enriched, 7).unwrap();
        assert!(coarse.len() < enriched.len());
        assert!(coarse.iter().all(|c| c.cell.resolution == 7));

        let total: f64 = coarse.iter().map(|c| c.attribute("population")).sum();
        assert!((total - expected).abs() < 1e-9);
    }

    #[test]
    fn downsample_rejects_finer_target() {
        let cells = generate_cells(&lima_square(), 7).unwrap();
        let enriched: Vec<EnrichedCell> = cells.into_iter().map(EnrichedCell::new).collect();
        assert!(matches!(
            downsample(&enriched, 9),
            Err(GridError::UnsupportedResolution { resolution: 9 })
        ));
    }

    fn dateline_region() -> Region {
        Region::from_polygon(
            "fiji-east",
            polygon![
                (x: 179.8, y: -17.0),
                (x: 179.99, y: -17.0),
                (x: 179.99, y: -16.8),
                (x: 179.8, y: -16.8),
            ],
        )
    }

    #[test]
    fn antimeridian_cells_stay_contiguous() {
        let cells = generate_cells(&dateline_region(), 3).unwrap();
        assert!(!cells.is_empty());
        for cell in &cells {
            let rect = cell.geometry.bounding_rect().unwrap();
            assert!(rect.width() < 10.0, "cell {} spans {}", cell.id, rect.width());
        }
    }

    #[test]
    fn locator_matches_points_across_the_antimeridian() {
        let cells = generate_cells(&dateline_region(), 3).unwrap();
        let locator = CellLocator::new(&cells, 3).unwrap();

        let inside = locator.locate(Coordinate::new(-16.9, 179.9)).unwrap();
        let expected = LatLng::new(-16.9, 179.9)
            .unwrap()
            .to_cell(parse_resolution(3).unwrap())
            .to_string();
        assert_eq!(cells[inside].id, expected);

        assert!(locator.locate(Coordinate::new(-16.9, 0.0)).is_none());
        assert!(locator.locate(Coordinate::new(95.0, 0.0)).is_none());
    }

    #[test]
    fn locator_rejects_mixed_resolutions() {
        let cells = generate_cells(&lima_square(), 8).unwrap();
        assert!(matches!(
            CellLocator::new(&cells, 7),
            Err(GridError::UnsupportedResolution { resolution: 8 })
        ));
    }

    #[test]
    fn region_from_geojson_validates() {
        let region = region_from_geojson(
            "square",
            r#"{"type":"Polygon","coordinates":[[[-77.05,-12.05],[-77.0,-12.05],[-77.0,-12.0],[-77.05,-12.0],[-77.05,-12.05]]]}"#,
        )
        .unwrap();
        assert_eq!(region.id, "square");

        assert!(matches!(
            region_from_geojson("pt", r#"{"type":"Point","coordinates":[1,2]}"#),
            Err(GridError::InvalidRegion { .. })
        ));
    }
}
