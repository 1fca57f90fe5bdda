#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Accessibility pipeline.
//!
//! Runs the stages in order: a region is tiled into H3 cells, population
//! and facility points are joined onto the cells, every cell centroid is
//! matched to its nearest facility, and optionally the matches are routed
//! through a [`RoutingService`]. The synchronous part is [`analyze`];
//! [`Analysis::route`] adds travel times.
//!
//! Zone attributes (e.g. census counts) can be spread over the cells by
//! area, and the catchment measures of [`measures`] can be added on top.

pub mod measures;
pub mod output;
pub mod region;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use measures::CatchmentOptions;
use urban_access_geography_models::{
    AccessibilityRecord, AreaFeature, Cell, EnrichedCell, Facility, FeaturePoint, Region,
};
use urban_access_grid::{CellLocator, GridError, generate_cells};
use urban_access_nearest::{FacilityIndex, NearestError, NearestMatch, Origin};
use urban_access_routing::RoutingService;
use urban_access_routing::enrich::{EnrichOptions, EnrichmentSummary, approximate, enrich};
use urban_access_routing::progress::ProgressCallback;
use urban_access_spatial::{JoinResult, PolygonIndex, Statistic, join_with, overlay_areal};

/// Cell attribute holding summed population.
pub const POPULATION: &str = "population";
/// Cell attribute holding the number of facilities inside the cell.
pub const POI_COUNT: &str = "poi_count";
/// Cell attribute holding the distance to the nearest facility.
pub const DISTANCE_KM: &str = "distance_km";
/// Cell attribute holding the routed travel time to the nearest facility.
pub const TRAVEL_TIME_MINUTES: &str = "travel_time_minutes";

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The region could not be tiled.
    #[error("Grid generation failed for region '{region_id}' at resolution {resolution}: {source}")]
    Grid {
        region_id: String,
        resolution: u8,
        source: GridError,
    },

    /// Nearest-facility resolution failed.
    #[error(
        "Nearest-facility resolution failed for region '{region_id}' at resolution {resolution}: {source}"
    )]
    Nearest {
        region_id: String,
        resolution: u8,
        source: NearestError,
    },

    /// A set of regions to merge was empty or had no area.
    #[error("Cannot merge regions: {reason}")]
    Merge { reason: String },

    /// I/O error writing output.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Inputs to one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub region: &'a Region,
    /// H3 resolution of the output grid.
    pub resolution: u8,
    /// Population samples.
    pub population: &'a [FeaturePoint],
    /// Attribute of each population sample to sum into [`POPULATION`].
    pub population_attribute: &'a str,
    /// Destinations. Also counted per cell into [`POI_COUNT`].
    pub facilities: &'a [Facility],
    /// Zones whose `zone_columns` are spread over the cells by shared area.
    pub zones: &'a [AreaFeature],
    pub zone_columns: &'a [String],
    /// Adds [`measures::ACCESS_INDEX`] and [`measures::PRESSURE`], using
    /// [`POPULATION`] as population and demand.
    pub catchment: Option<CatchmentOptions>,
}

impl<'a> PipelineInputs<'a> {
    /// Inputs with no population, zones or catchment measures.
    #[must_use]
    pub const fn new(region: &'a Region, resolution: u8, facilities: &'a [Facility]) -> Self {
        Self {
            region,
            resolution,
            population: &[],
            population_attribute: POPULATION,
            facilities,
            zones: &[],
            zone_columns: &[],
            catchment: None,
        }
    }
}

/// Result of the synchronous stages.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub region_id: String,
    /// Cells in grid order, with population and facility counts.
    pub cells: Vec<EnrichedCell>,
    /// One match per cell, in cell order.
    pub matches: Vec<NearestMatch>,
    /// Population samples outside every cell.
    pub population_outliers: u64,
    /// Facilities outside every cell.
    pub poi_outliers: u64,
}

/// Cells with their join and overlay tallies.
#[derive(Debug, Clone)]
pub struct CellBuild {
    pub cells: Vec<EnrichedCell>,
    pub population_outliers: u64,
    pub poi_outliers: u64,
    /// Zones sharing no area with the grid.
    pub zone_outliers: u64,
}

/// Final output of a run.
#[derive(Debug, Clone)]
pub struct Report {
    /// Cells with [`DISTANCE_KM`] and, when routed, [`TRAVEL_TIME_MINUTES`].
    pub cells: Vec<EnrichedCell>,
    /// One record per cell, in cell order.
    pub records: Vec<AccessibilityRecord>,
    pub population_outliers: u64,
    pub poi_outliers: u64,
    /// Present when routing was attempted.
    pub enrichment: Option<EnrichmentSummary>,
}

/// Joins points onto cells and writes the aggregates into cell attributes.
///
/// Points are matched to cells by H3 index, not by polygon containment, so
/// cells crossing the antimeridian attract only their own points.
///
/// Returns the number of points outside every cell.
fn join_onto(
    cells: &mut [EnrichedCell],
    ids: &[String],
    locator: &CellLocator,
    points: &[FeaturePoint],
    statistic: &Statistic,
) -> u64 {
    let JoinResult {
        aggregates,
        outliers,
        total,
    } = join_with(points, ids, std::slice::from_ref(statistic), |point| {
        locator.locate(point.location)
    });

    for (cell, aggregate) in cells.iter_mut().zip(aggregates) {
        let value = aggregate.values.get(statistic.output()).copied().unwrap_or(0.0);
        cell.attributes.insert(statistic.output().to_string(), value);
    }

    if outliers > 0 {
        log::warn!(
            "{outliers} of {total} points fell outside the grid for '{}'",
            statistic.output()
        );
    }
    outliers
}

/// Spreads the zone columns over the cells by shared geodesic area and
/// writes them into cell attributes.
///
/// Returns the number of zones sharing no area with any cell.
fn overlay_onto(cells: &mut [EnrichedCell], zones: &[AreaFeature], columns: &[String]) -> u64 {
    let index = PolygonIndex::from_polygons(
        cells
            .iter()
            .map(|c| (c.cell.id.as_str(), &c.cell.geometry)),
    );
    let result = overlay_areal(zones, &index, columns);

    for (cell, aggregate) in cells.iter_mut().zip(result.aggregates) {
        cell.attributes.extend(aggregate.values);
    }
    if result.unmatched > 0 {
        log::warn!(
            "{} of {} zones share no area with the grid",
            result.unmatched,
            result.total
        );
    }
    result.unmatched
}

/// Tiles the region, aggregates population and facility counts, and
/// spreads zone attributes over the cells.
///
/// # Errors
///
/// Returns [`AccessError::Grid`] if the region cannot be tiled.
pub fn build_cells(inputs: &PipelineInputs<'_>) -> Result<CellBuild, AccessError> {
    let grid_error = |source| AccessError::Grid {
        region_id: inputs.region.id.clone(),
        resolution: inputs.resolution,
        source,
    };
    let cells: Vec<Cell> = generate_cells(inputs.region, inputs.resolution).map_err(grid_error)?;
    let locator = CellLocator::new(&cells, inputs.resolution).map_err(grid_error)?;

    let ids: Vec<String> = cells.iter().map(|c| c.id.clone()).collect();
    let mut enriched: Vec<EnrichedCell> = cells.into_iter().map(EnrichedCell::new).collect();

    let population_outliers = join_onto(
        &mut enriched,
        &ids,
        &locator,
        inputs.population,
        &Statistic::sum(inputs.population_attribute, POPULATION),
    );

    let poi_points: Vec<FeaturePoint> = inputs
        .facilities
        .iter()
        .map(|f| FeaturePoint::new(f.id.clone(), f.location))
        .collect();
    let poi_outliers = join_onto(
        &mut enriched,
        &ids,
        &locator,
        &poi_points,
        &Statistic::count(POI_COUNT),
    );

    let zone_outliers = if inputs.zones.is_empty() {
        0
    } else {
        overlay_onto(&mut enriched, inputs.zones, inputs.zone_columns)
    };

    Ok(CellBuild {
        cells: enriched,
        population_outliers,
        poi_outliers,
        zone_outliers,
    })
}

/// Runs the grid, join and nearest-facility stages, plus the catchment
/// measures when requested.
///
/// # Errors
///
/// Returns [`AccessError::Grid`] for an invalid region or resolution and
/// [`AccessError::Nearest`] when there are no facilities.
pub fn analyze(inputs: &PipelineInputs<'_>) -> Result<Analysis, AccessError> {
    let region_id = inputs.region.id.clone();
    let CellBuild {
        mut cells,
        population_outliers,
        poi_outliers,
        ..
    } = build_cells(inputs)?;

    let nearest_error = |source| AccessError::Nearest {
        region_id: region_id.clone(),
        resolution: inputs.resolution,
        source,
    };

    let index = FacilityIndex::build(inputs.facilities.to_vec()).map_err(nearest_error)?;
    let origins: Vec<Origin> = cells
        .iter()
        .map(|c| Origin::new(c.cell.id.clone(), c.cell.centroid))
        .collect();
    let matches = index.resolve(&origins).map_err(nearest_error)?;

    if let Some(options) = &inputs.catchment {
        measures::apply(&mut cells, &index, POPULATION, options);
    }

    log::info!(
        "Region {region_id}: {} cells, {} facilities, {population_outliers} population outliers",
        cells.len(),
        inputs.facilities.len()
    );

    Ok(Analysis {
        region_id,
        cells,
        matches,
        population_outliers,
        poi_outliers,
    })
}

impl Analysis {
    /// Finishes without routing: every record carries its haversine
    /// distance and no travel time.
    #[must_use]
    pub fn into_report(self) -> Report {
        let records = self.matches.iter().map(approximate).collect();
        self.finish(records, None)
    }

    /// Routes the matches and finishes.
    ///
    /// Routing failures never fail the run; see
    /// [`urban_access_routing::enrich::enrich`].
    pub async fn route(
        self,
        service: &dyn RoutingService,
        options: &EnrichOptions,
        cancel: &CancellationToken,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Report {
        let enrichment = enrich(service, &self.matches, options, cancel, progress).await;
        self.finish(enrichment.records, Some(enrichment.summary))
    }

    fn finish(self, records: Vec<AccessibilityRecord>, enrichment: Option<EnrichmentSummary>) -> Report {
        let mut cells = self.cells;
        // Records and cells share order: one origin per cell.
        for (cell, record) in cells.iter_mut().zip(&records) {
            cell.attributes
                .insert(DISTANCE_KM.to_string(), record.distance_km);
            if let Some(minutes) = record.travel_time_minutes {
                cell.attributes
                    .insert(TRAVEL_TIME_MINUTES.to_string(), minutes);
            }
        }

        Report {
            cells,
            records,
            population_outliers: self.population_outliers,
            poi_outliers: self.poi_outliers,
            enrichment,
        }
    }
}
