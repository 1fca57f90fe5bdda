//! Catchment accessibility measures over grid cells.
//!
//! Both measures work on cell centroids and facility points with
//! great-circle distances, so they need no projected coordinate system.
//!
//! * [`hu_access_map`] is the enhanced two-step floating catchment area
//!   index (E2SFCA) of Hu et al. (2020). Each facility first gets a
//!   supply-to-demand ratio from the friction-weighted population around
//!   it, then each populated cell sums the friction-weighted ratios of the
//!   facilities it reaches.
//! * [`pressure_map`] is the unaggregated pressure of Ritsema van Eck and
//!   de Jong (1999): a cell's demand divided by one plus the number of
//!   facilities within a buffer of the cell.

use geo::{Closest, ClosestPoint as _, Intersects as _, Point};
use urban_access_geography_models::{Cell, Coordinate, EnrichedCell};
use urban_access_nearest::{FacilityIndex, haversine_km};

/// Cell attribute holding the E2SFCA index. Absent on unpopulated cells.
pub const ACCESS_INDEX: &str = "access_index";
/// Cell attribute holding the facility pressure.
pub const PRESSURE: &str = "pressure";

/// Parameters of the catchment measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatchmentOptions {
    /// Catchment radius of the friction function, in metres.
    pub d0_meters: f64,
    /// Supply of every facility.
    pub weight: f64,
    /// Buffer around a cell for [`pressure_map`], in metres.
    pub buffer_meters: f64,
}

impl Default for CatchmentOptions {
    fn default() -> Self {
        Self {
            d0_meters: 1250.0,
            weight: 1.0,
            buffer_meters: 1250.0,
        }
    }
}

/// Gaussian distance decay, zero beyond `d0_m`:
/// `exp(-0.5 (d/d0)^2) / (1 - exp(-0.5))`.
#[must_use]
pub fn friction(distance_m: f64, d0_m: f64) -> f64 {
    if d0_m.is_nan() || d0_m <= 0.0 || distance_m > d0_m {
        return 0.0;
    }
    let ratio = distance_m / d0_m;
    (-0.5 * ratio * ratio).exp() / (1.0 - (-0.5_f64).exp())
}

/// E2SFCA accessibility of every cell, in cell order.
///
/// Cells without a positive `population_attribute` get `None`; populated
/// cells with no facility in reach get `Some(0.0)`. Population weighted,
/// the indices sum to `weight` times the number of facilities that reach
/// some population.
#[must_use]
pub fn hu_access_map(
    cells: &[EnrichedCell],
    facilities: &FacilityIndex,
    population_attribute: &str,
    options: &CatchmentOptions,
) -> Vec<Option<f64>> {
    let d0 = options.d0_meters;
    let reach: Vec<Vec<(usize, f64)>> = cells
        .iter()
        .map(|c| {
            facilities
                .within(c.cell.centroid, d0 / 1000.0)
                .into_iter()
                .map(|(j, km)| (j, friction(km * 1000.0, d0)))
                .collect()
        })
        .collect();
    let population: Vec<f64> = cells
        .iter()
        .map(|c| c.attribute(population_attribute))
        .collect();

    let mut demand = vec![0.0; facilities.facilities().len()];
    for (links, &pop) in reach.iter().zip(&population) {
        if pop > 0.0 {
            for &(j, f) in links {
                demand[j] += f * pop;
            }
        }
    }
    let ratio: Vec<f64> = demand
        .iter()
        .map(|&d| if d > 0.0 { options.weight / d } else { 0.0 })
        .collect();

    let access: Vec<Option<f64>> = reach
        .iter()
        .zip(&population)
        .map(|(links, &pop)| (pop > 0.0).then(|| links.iter().map(|&(j, f)| f * ratio[j]).sum()))
        .collect();

    log::debug!(
        "E2SFCA: {} of {} facilities reach population within {d0} m",
        ratio.iter().filter(|r| **r > 0.0).count(),
        ratio.len()
    );
    access
}

/// Pressure of every cell, in cell order: the `demand_attribute` divided by
/// one plus the number of facilities within `buffer_meters` of the cell
/// polygon (inside it included).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pressure_map(
    cells: &[EnrichedCell],
    facilities: &FacilityIndex,
    demand_attribute: &str,
    buffer_meters: f64,
) -> Vec<f64> {
    let buffer_km = buffer_meters.max(0.0) / 1000.0;
    cells
        .iter()
        .map(|c| {
            let nearby = facilities_near(&c.cell, facilities, buffer_km);
            c.attribute(demand_attribute) / (nearby as f64 + 1.0)
        })
        .collect()
}

/// Writes [`ACCESS_INDEX`] and [`PRESSURE`] into the cells, with the
/// population attribute used as both population and demand.
pub fn apply(
    cells: &mut [EnrichedCell],
    facilities: &FacilityIndex,
    population_attribute: &str,
    options: &CatchmentOptions,
) {
    let access = hu_access_map(cells, facilities, population_attribute, options);
    let pressure = pressure_map(cells, facilities, population_attribute, options.buffer_meters);

    for ((cell, access), pressure) in cells.iter_mut().zip(access).zip(pressure) {
        if let Some(access) = access {
            cell.attributes.insert(ACCESS_INDEX.to_string(), access);
        }
        cell.attributes.insert(PRESSURE.to_string(), pressure);
    }
}

fn facilities_near(cell: &Cell, facilities: &FacilityIndex, buffer_km: f64) -> usize {
    // Covers every vertex, so every facility within the buffer of any
    // boundary point is a candidate.
    let circumradius_km = cell
        .geometry
        .exterior()
        .coords()
        .map(|c| haversine_km(cell.centroid, Coordinate::new(c.y, c.x)))
        .fold(0.0, f64::max);

    facilities
        .within(cell.centroid, circumradius_km + buffer_km)
        .into_iter()
        .filter(|&(j, _)| {
            distance_to_cell_km(cell, facilities.facilities()[j].location) <= buffer_km
        })
        .count()
}

/// Great-circle distance from `location` to the nearest point of the cell,
/// zero inside it.
fn distance_to_cell_km(cell: &Cell, location: Coordinate) -> f64 {
    let mut point = location.to_point();
    // Cells across the antimeridian carry longitudes past 180.
    let unwrapped = cell.geometry.exterior().coords().any(|c| c.x > 180.0);
    if unwrapped && point.x() < 0.0 {
        point = Point::new(point.x() + 360.0, point.y());
    }

    if cell.geometry.intersects(&point) {
        return 0.0;
    }
    match cell.geometry.closest_point(&point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => {
            haversine_km(location, Coordinate::from_point(p))
        }
        Closest::Indeterminate => haversine_km(location, cell.centroid),
    }
}
