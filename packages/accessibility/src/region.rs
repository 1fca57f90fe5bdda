//! Combining several boundary downloads into one region.

use geo::{BooleanOps as _, MultiPolygon};
use urban_access_geography_models::Region;

use crate::AccessError;

/// Merges regions into one by geometric union.
///
/// Overlapping areas count once, so a merged region tiles into the same
/// cells as its parts without duplicates.
///
/// # Errors
///
/// Returns [`AccessError::Merge`] if `regions` is empty or every region is
/// empty.
pub fn merge_regions(id: impl Into<String>, regions: &[Region]) -> Result<Region, AccessError> {
    let parts: Vec<&Region> = regions.iter().filter(|r| !r.is_empty()).collect();
    if parts.is_empty() {
        return Err(AccessError::Merge {
            reason: "no non-empty regions given".to_string(),
        });
    }

    let geometry = parts
        .iter()
        .fold(MultiPolygon::<f64>::new(Vec::new()), |acc, region| {
            acc.union(&region.geometry)
        });

    let region = Region::new(id, geometry);
    log::info!(
        "Merged {} regions into '{}' ({} polygons)",
        parts.len(),
        region.id,
        region.geometry.0.len()
    );
    Ok(region)
}
