#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for point-in-polygon attribution.
//!
//! Builds an R-tree over polygon envelopes (grid cells or arbitrary
//! boundaries) and assigns point features to the polygon containing them,
//! aggregating caller-chosen statistics per polygon. Points outside every
//! polygon are dropped and tallied.
//!
//! [`overlay_areal`] does the same for polygonal sources: each source value
//! is split across the indexed polygons in proportion to the geodesic area
//! they share with the source.

use std::collections::BTreeMap;

use geo::{BooleanOps as _, BoundingRect, GeodesicArea as _, Intersects, MultiPolygon, Polygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use urban_access_geography_models::{AreaFeature, BoundingBox, FeaturePoint};

/// A polygon stored in the R-tree with its position in the input order.
struct PolygonEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over a fixed, ordered set of polygons.
///
/// Containment is boundary inclusive. A point on an edge shared by several
/// polygons belongs to the one that came first in the input order.
pub struct PolygonIndex {
    ids: Vec<String>,
    tree: RTree<PolygonEntry>,
}

impl PolygonIndex {
    /// Builds the index. Polygons without coordinates are kept in the id
    /// list (so output order is stable) but never match.
    #[must_use]
    pub fn new(polygons: Vec<(String, MultiPolygon<f64>)>) -> Self {
        let mut ids = Vec::with_capacity(polygons.len());
        let mut entries = Vec::with_capacity(polygons.len());

        for (index, (id, polygon)) in polygons.into_iter().enumerate() {
            ids.push(id);
            let Some(envelope) = compute_envelope(&polygon) else {
                log::warn!("Polygon {} has no coordinates, skipping", ids[index]);
                continue;
            };
            entries.push(PolygonEntry {
                index,
                envelope,
                polygon,
            });
        }

        let tree = RTree::bulk_load(entries);
        log::debug!("Loaded {} polygons into spatial index", tree.size());

        Self { ids, tree }
    }

    /// Builds the index from single polygons (e.g. grid cells).
    #[must_use]
    pub fn from_polygons<'a>(polygons: impl IntoIterator<Item = (&'a str, &'a Polygon<f64>)>) -> Self {
        Self::new(
            polygons
                .into_iter()
                .map(|(id, polygon)| (id.to_string(), MultiPolygon(vec![polygon.clone()])))
                .collect(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in input order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Returns the input index of the polygon containing the point.
    #[must_use]
    pub fn locate(&self, lng: f64, lat: f64) -> Option<usize> {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| entry.index)
            .min()
    }

    /// Returns the id of the polygon containing the point.
    #[must_use]
    pub fn locate_id(&self, lng: f64, lat: f64) -> Option<&str> {
        self.locate(lng, lat).map(|i| self.ids[i].as_str())
    }
}

/// A per-polygon statistic computed by [`join_points`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statistic {
    /// Number of points assigned to the polygon.
    Count {
        output: String,
    },
    /// Sum of a point attribute.
    Sum {
        attribute: String,
        output: String,
    },
    /// Minimum of a point attribute.
    Min {
        attribute: String,
        output: String,
    },
    /// Maximum of a point attribute.
    Max {
        attribute: String,
        output: String,
    },
}

impl Statistic {
    #[must_use]
    pub fn count(output: impl Into<String>) -> Self {
        Self::Count {
            output: output.into(),
        }
    }

    #[must_use]
    pub fn sum(attribute: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Sum {
            attribute: attribute.into(),
            output: output.into(),
        }
    }

    #[must_use]
    pub fn min(attribute: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Min {
            attribute: attribute.into(),
            output: output.into(),
        }
    }

    #[must_use]
    pub fn max(attribute: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Max {
            attribute: attribute.into(),
            output: output.into(),
        }
    }

    /// Name of the aggregated value in [`PolygonAggregate::values`].
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Count { output }
            | Self::Sum { output, .. }
            | Self::Min { output, .. }
            | Self::Max { output, .. } => output,
        }
    }

    fn accumulate(&self, values: &mut BTreeMap<String, f64>, point: &FeaturePoint) {
        match self {
            Self::Count { output } => {
                *values.entry(output.clone()).or_insert(0.0) += 1.0;
            }
            Self::Sum { attribute, output } => {
                if let Some(&v) = point.attributes.get(attribute) {
                    *values.entry(output.clone()).or_insert(0.0) += v;
                }
            }
            Self::Min { attribute, output } => {
                if let Some(&v) = point.attributes.get(attribute) {
                    let slot = values.entry(output.clone()).or_insert(v);
                    *slot = slot.min(v);
                }
            }
            Self::Max { attribute, output } => {
                if let Some(&v) = point.attributes.get(attribute) {
                    let slot = values.entry(output.clone()).or_insert(v);
                    *slot = slot.max(v);
                }
            }
        }
    }
}

/// Aggregated values for one polygon of the index.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonAggregate {
    pub id: String,
    /// Number of points assigned to this polygon.
    pub count: u64,
    /// Statistic outputs. `Count` outputs are always present; attribute
    /// statistics are absent when no assigned point carried the attribute.
    pub values: BTreeMap<String, f64>,
}

/// Result of [`join_points`].
#[derive(Debug, Clone, PartialEq)]
pub struct JoinResult {
    /// One aggregate per indexed polygon, in index input order.
    pub aggregates: Vec<PolygonAggregate>,
    /// Points that fell outside every polygon.
    pub outliers: u64,
    /// Total number of input points.
    pub total: u64,
}

impl JoinResult {
    /// Number of points assigned to some polygon.
    #[must_use]
    pub fn assigned(&self) -> u64 {
        self.aggregates.iter().map(|a| a.count).sum()
    }
}

/// Assigns every point to the polygon containing it and aggregates the
/// requested statistics per polygon.
#[must_use]
pub fn join_points(
    points: &[FeaturePoint],
    index: &PolygonIndex,
    statistics: &[Statistic],
) -> JoinResult {
    join_with(points, index.ids(), statistics, |point| {
        index.locate(point.location.lon, point.location.lat)
    })
}

/// Like [`join_points`], with the point-to-polygon assignment supplied by
/// `locate`, which returns a position in `ids` or `None` for an outlier.
///
/// Used when a cheaper exact lookup than point-in-polygon exists, such as an
/// H3 index for grid cells.
#[must_use]
pub fn join_with(
    points: &[FeaturePoint],
    ids: &[String],
    statistics: &[Statistic],
    mut locate: impl FnMut(&FeaturePoint) -> Option<usize>,
) -> JoinResult {
    let mut aggregates: Vec<PolygonAggregate> = ids
        .iter()
        .map(|id| PolygonAggregate {
            id: id.clone(),
            count: 0,
            values: statistics
                .iter()
                .filter_map(|s| match s {
                    Statistic::Count { output } => Some((output.clone(), 0.0)),
                    _ => None,
                })
                .collect(),
        })
        .collect();

    let mut outliers = 0u64;

    for point in points {
        let Some(aggregate) = locate(point).and_then(|i| aggregates.get_mut(i)) else {
            log::trace!("Point {} is outside every polygon", point.id);
            outliers += 1;
            continue;
        };

        aggregate.count += 1;
        for statistic in statistics {
            statistic.accumulate(&mut aggregate.values, point);
        }
    }

    if outliers > 0 {
        log::info!(
            "Spatial join dropped {outliers} of {} points outside all polygons",
            points.len()
        );
    }

    JoinResult {
        aggregates,
        outliers,
        total: points.len() as u64,
    }
}

/// Result of [`overlay_areal`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayResult {
    /// One aggregate per indexed polygon, in index input order. `count` is
    /// the number of sources overlapping the polygon; every requested column
    /// is present, `0.0` where nothing overlapped.
    pub aggregates: Vec<PolygonAggregate>,
    /// Sources that share no area with any indexed polygon, or have no area.
    pub unmatched: u64,
    /// Total number of sources.
    pub total: u64,
}

/// Distributes the `columns` of every source over the indexed polygons,
/// weighting by the share of the source's geodesic area that falls in each
/// polygon.
///
/// A source fully covered by the index is conserved; the part of a source
/// outside every polygon is lost. Overlapping indexed polygons each receive
/// their full share.
#[must_use]
pub fn overlay_areal(
    sources: &[AreaFeature],
    index: &PolygonIndex,
    columns: &[String],
) -> OverlayResult {
    let mut aggregates: Vec<PolygonAggregate> = index
        .ids()
        .iter()
        .map(|id| PolygonAggregate {
            id: id.clone(),
            count: 0,
            values: columns.iter().map(|c| (c.clone(), 0.0)).collect(),
        })
        .collect();

    let mut unmatched = 0u64;

    for source in sources {
        let area = source.geometry.geodesic_area_unsigned();
        let envelope = compute_envelope(&source.geometry).filter(|_| area > 0.0);
        let Some(envelope) = envelope else {
            log::warn!("Area feature {} has no area, skipping", source.id);
            unmatched += 1;
            continue;
        };

        let mut matched = false;
        for entry in index.tree.locate_in_envelope_intersecting(&envelope) {
            let shared = source
                .geometry
                .intersection(&entry.polygon)
                .geodesic_area_unsigned();
            if shared <= 0.0 {
                continue;
            }
            matched = true;

            let share = (shared / area).min(1.0);
            let aggregate = &mut aggregates[entry.index];
            aggregate.count += 1;
            for column in columns {
                if let Some(value) = source.attributes.get(column) {
                    *aggregate.values.entry(column.clone()).or_insert(0.0) += value * share;
                }
            }
        }

        if !matched {
            log::trace!("Area feature {} overlaps no polygon", source.id);
            unmatched += 1;
        }
    }

    if unmatched > 0 {
        log::info!(
            "Areal overlay matched no polygon for {unmatched} of {} sources",
            sources.len()
        );
    }

    OverlayResult {
        aggregates,
        unmatched,
        total: sources.len() as u64,
    }
}

/// Keeps the points inside the bounding box (edges inclusive).
#[must_use]
pub fn filter_to_bounds(points: &[FeaturePoint], bounds: &BoundingBox) -> Vec<FeaturePoint> {
    points
        .iter()
        .filter(|p| bounds.contains(p.location))
        .cloned()
        .collect()
}

/// Drops the points inside the bounding box (edges inclusive).
#[must_use]
pub fn remove_in_bounds(points: &[FeaturePoint], bounds: &BoundingBox) -> Vec<FeaturePoint> {
    points
        .iter()
        .filter(|p| !bounds.contains(p.location))
        .cloned()
        .collect()
}

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
///
/// Accepts a bare geometry, a feature or a feature collection. All polygonal
/// members are gathered into one multipolygon; non-polygonal members are
/// ignored. Returns `None` when nothing polygonal is found.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geom) => vec![geom],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let polygons: Vec<Polygon<f64>> = geometries
        .into_iter()
        .filter_map(multipolygon_from_geometry)
        .flat_map(|mp| mp.0)
        .collect();

    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon(polygons))
    }
}

/// Parse a `GeoJSON` feature collection into [`AreaFeature`]s.
///
/// Non-polygonal features are skipped. Numeric properties (and numeric
/// strings) become attributes; everything else is dropped. A feature's id is
/// its `id` member, or its position in the collection when absent. Returns
/// `None` when the input is not valid `GeoJSON`.
#[must_use]
pub fn parse_area_features(geojson_str: &str) -> Option<Vec<AreaFeature>> {
    let features = match geojson_str.parse::<GeoJson>().ok()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => Vec::new(),
    };

    let areas = features
        .into_iter()
        .enumerate()
        .filter_map(|(position, feature)| {
            let geometry = multipolygon_from_geometry(feature.geometry?)?;
            let id = match feature.id {
                Some(geojson::feature::Id::String(id)) => id,
                Some(geojson::feature::Id::Number(id)) => id.to_string(),
                None => position.to_string(),
            };
            let attributes = feature
                .properties
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(name, value)| {
                    let number = value
                        .as_f64()
                        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))?;
                    Some((name, number))
                })
                .collect();
            Some(AreaFeature {
                id,
                geometry,
                attributes,
            })
        })
        .collect();

    Some(areas)
}

/// Convert one `GeoJSON` geometry into a [`MultiPolygon`], keeping only its
/// polygonal parts.
#[must_use]
pub fn multipolygon_from_geometry(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let polygons = polygons_of(geo::Geometry::<f64>::try_from(geometry).ok()?);
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon(polygons))
    }
}

fn polygons_of(geometry: geo::Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        geo::Geometry::Polygon(p) => vec![p],
        geo::Geometry::MultiPolygon(mp) => mp.0,
        geo::Geometry::GeometryCollection(gc) => gc.0.into_iter().flat_map(polygons_of).collect(),
        _ => Vec::new(),
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use urban_access_geography_models::Coordinate;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]])
    }

    fn two_squares() -> PolygonIndex {
        PolygonIndex::new(vec![
            ("left".to_string(), square(0.0, 0.0, 1.0)),
            ("right".to_string(), square(1.0, 0.0, 1.0)),
        ])
    }

    fn point(id: &str, lon: f64, lat: f64) -> FeaturePoint {
        FeaturePoint::new(id, Coordinate::new(lat, lon))
    }

    #[test]
    fn locates_interior_points() {
        let index = two_squares();
        assert_eq!(index.locate_id(0.5, 0.5), Some("left"));
        assert_eq!(index.locate_id(1.5, 0.5), Some("right"));
        assert_eq!(index.locate_id(2.5, 0.5), None);
    }

    #[test]
    fn shared_edge_goes_to_first_polygon() {
        let index = two_squares();
        assert_eq!(index.locate_id(1.0, 0.5), Some("left"));

        let reversed = PolygonIndex::new(vec![
            ("right".to_string(), square(1.0, 0.0, 1.0)),
            ("left".to_string(), square(0.0, 0.0, 1.0)),
        ]);
        assert_eq!(reversed.locate_id(1.0, 0.5), Some("right"));
    }

    #[test]
    fn outer_boundary_is_inclusive() {
        let index = two_squares();
        assert_eq!(index.locate_id(0.0, 0.0), Some("left"));
        assert_eq!(index.locate_id(2.0, 1.0), Some("right"));
    }

    #[test]
    fn join_conserves_point_count() {
        let index = two_squares();
        let points = vec![
            point("a", 0.2, 0.2).with_attribute("pop", 2.0),
            point("b", 0.7, 0.9).with_attribute("pop", 3.0),
            point("c", 1.0, 0.5).with_attribute("pop", 5.0),
            point("d", 1.5, 0.5).with_attribute("pop", 7.0),
            point("e", 5.0, 5.0).with_attribute("pop", 11.0),
            point("f", -1.0, 0.5),
        ];

        let result = join_points(
            &points,
            &index,
            &[Statistic::count("n"), Statistic::sum("pop", "population")],
        );

        assert_eq!(result.total, 6);
        assert_eq!(result.outliers, 2);
        assert_eq!(result.assigned() + result.outliers, result.total);

        let left = &result.aggregates[0];
        assert_eq!(left.id, "left");
        assert_eq!(left.count, 3);
        assert!((left.values["population"] - 10.0).abs() < 1e-9);
        assert!((left.values["n"] - 3.0).abs() < 1e-9);

        let right = &result.aggregates[1];
        assert_eq!(right.count, 1);
        assert!((right.values["population"] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn join_with_custom_locator_counts_misses_as_outliers() {
        let ids = vec!["even".to_string(), "odd".to_string()];
        let points: Vec<FeaturePoint> = (0..5)
            .map(|i| point(&format!("p{i}"), f64::from(i), 0.0).with_attribute("pop", 1.0))
            .collect();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let result = join_with(&points, &ids, &[Statistic::sum("pop", "pop")], |p| {
            let lon = p.location.lon as usize;
            (lon < 4).then_some(lon % 2).or(Some(9))
        });

        assert_eq!(result.aggregates[0].count, 2);
        assert_eq!(result.aggregates[1].count, 2);
        assert_eq!(result.outliers, 1);
        assert_eq!(result.assigned() + result.outliers, result.total);
    }

    #[test]
    fn empty_polygons_report_zero_count_and_no_sum() {
        let index = two_squares();
        let points = vec![point("a", 0.5, 0.5).with_attribute("pop", 1.0)];
        let result = join_points(
            &points,
            &index,
            &[Statistic::count("n"), Statistic::sum("pop", "population")],
        );
        let right = &result.aggregates[1];
        assert_eq!(right.count, 0);
        assert!((right.values["n"]).abs() < f64::EPSILON);
        assert!(!right.values.contains_key("population"));
    }

    #[test]
    fn min_and_max_statistics() {
        let index = two_squares();
        let points = vec![
            point("a", 0.1, 0.1).with_attribute("v", 4.0),
            point("b", 0.2, 0.2).with_attribute("v", -1.0),
            point("c", 0.3, 0.3).with_attribute("v", 9.0),
            point("d", 0.4, 0.4),
        ];
        let result = join_points(
            &points,
            &index,
            &[Statistic::min("v", "v_min"), Statistic::max("v", "v_max")],
        );
        let left = &result.aggregates[0];
        assert_eq!(left.count, 4);
        assert!((left.values["v_min"] + 1.0).abs() < 1e-9);
        assert!((left.values["v_max"] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn bounds_filters_are_complementary() {
        let points = vec![
            point("in", 0.5, 0.5),
            point("edge", 1.0, 1.0),
            point("out", 3.0, 3.0),
        ];
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);

        let kept = filter_to_bounds(&points, &bbox);
        let removed = remove_in_bounds(&points, &bbox);

        assert_eq!(kept.len(), 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "out");
    }

    #[test]
    fn parses_polygon_and_feature_collection() {
        let polygon = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;
        let mp = parse_geojson_to_multipolygon(polygon).unwrap();
        assert_eq!(mp.0.len(), 1);

        let collection = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[5,5]}},
                {"type":"Feature","properties":{},"geometry":{"type":"MultiPolygon","coordinates":[[[[2,2],[3,2],[3,3],[2,2]]],[[[4,4],[5,4],[5,5],[4,4]]]]}}
            ]
        }"#;
        let mp = parse_geojson_to_multipolygon(collection).unwrap();
        assert_eq!(mp.0.len(), 3);
    }

    fn strip(x0: f64, x1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: 0.0),
            (x: x1, y: 0.0),
            (x: x1, y: 0.01),
            (x: x0, y: 0.01),
        ]])
    }

    fn small_cells() -> PolygonIndex {
        PolygonIndex::new(vec![
            ("west".to_string(), strip(0.0, 0.01)),
            ("east".to_string(), strip(0.01, 0.02)),
        ])
    }

    #[test]
    fn overlay_splits_values_by_shared_area() {
        let zone = AreaFeature::new("zone", strip(0.0, 0.015)).with_attribute("pop", 90.0);
        let result = overlay_areal(&[zone], &small_cells(), &["pop".to_string()]);

        assert_eq!(result.unmatched, 0);
        let west = &result.aggregates[0];
        let east = &result.aggregates[1];
        assert_eq!(west.count, 1);
        assert_eq!(east.count, 1);
        assert!((west.values["pop"] - 60.0).abs() < 1e-6, "{}", west.values["pop"]);
        assert!((east.values["pop"] - 30.0).abs() < 1e-6, "{}", east.values["pop"]);
    }

    #[test]
    fn overlay_sums_sources_and_loses_the_part_outside() {
        let sources = vec![
            AreaFeature::new("inside", strip(0.0, 0.01)).with_attribute("pop", 10.0),
            AreaFeature::new("half-out", strip(-0.01, 0.01)).with_attribute("pop", 8.0),
            AreaFeature::new("far", strip(5.0, 5.01)).with_attribute("pop", 1000.0),
            AreaFeature::new("no-pop", strip(0.01, 0.02)),
        ];
        let result = overlay_areal(&sources, &small_cells(), &["pop".to_string()]);

        assert_eq!(result.total, 4);
        assert_eq!(result.unmatched, 1);
        assert!((result.aggregates[0].values["pop"] - 14.0).abs() < 1e-6);
        assert_eq!(result.aggregates[0].count, 2);
        assert!(result.aggregates[1].values["pop"].abs() < 1e-9);
        assert_eq!(result.aggregates[1].count, 1);
    }

    #[test]
    fn parses_area_features_with_numeric_properties() {
        let collection = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type":"Feature","id":"z1","properties":{"POB":"120","name":"Centro","area":2.5},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{"POB":7},"geometry":{"type":"Point","coordinates":[5,5]}},
                {"type":"Feature","id":42,"properties":null,"geometry":{"type":"MultiPolygon","coordinates":[[[[2,2],[3,2],[3,3],[2,2]]]]}}
            ]
        }"#;
        let areas = parse_area_features(collection).unwrap();

        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].id, "z1");
        assert!((areas[0].attributes["POB"] - 120.0).abs() < f64::EPSILON);
        assert!((areas[0].attributes["area"] - 2.5).abs() < f64::EPSILON);
        assert!(!areas[0].attributes.contains_key("name"));
        assert_eq!(areas[1].id, "42");
        assert!(areas[1].attributes.is_empty());

        assert!(parse_area_features("[").is_none());
    }

    #[test]
    fn rejects_non_polygonal_geojson() {
        assert!(parse_geojson_to_multipolygon(r#"{"type":"Point","coordinates":[1,2]}"#).is_none());
        assert!(parse_geojson_to_multipolygon("not json").is_none());
    }
}
