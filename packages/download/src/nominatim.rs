//! Nominatim / OpenStreetMap boundary search.
//!
//! Searches with `polygon_geojson=1&format=geojson` so each result carries
//! its outline. Results come back ranked; the caller picks one by its
//! position in the full result list, since the first hit for a city name is
//! often a point or a smaller area.
//! Nominatim has strict rate limits: **1 request per second** maximum.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use geo::MultiPolygon;
use urban_access_geography_models::Region;
use urban_access_spatial::multipolygon_from_geometry;

use crate::{DownloadError, get_json};

/// Public Nominatim search endpoint.
pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search.php";

/// One polygonal search result.
#[derive(Debug, Clone)]
pub struct BoundaryCandidate {
    /// Position among all results of the search, polygonal or not.
    pub rank: usize,
    pub display_name: String,
    pub osm_type: Option<String>,
    pub osm_id: Option<u64>,
    /// Nominatim's address rank (lower is larger, e.g. 4 = country).
    pub place_rank: Option<u32>,
    pub importance: Option<f64>,
    pub geometry: MultiPolygon<f64>,
}

impl BoundaryCandidate {
    /// Converts this result into a [`Region`] with the given id.
    #[must_use]
    pub fn into_region(self, id: impl Into<String>) -> Region {
        Region::new(id, self.geometry)
    }
}

/// Searches for boundaries matching a free-form query.
///
/// The caller is responsible for rate limiting.
///
/// # Errors
///
/// Returns [`DownloadError`] if the HTTP request or response parsing fails.
pub async fn search_boundaries(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
) -> Result<Vec<BoundaryCandidate>, DownloadError> {
    let body = get_json(
        client,
        base_url,
        &[("q", query), ("polygon_geojson", "1"), ("format", "geojson")],
    )
    .await?;

    let candidates = parse_boundaries(&body)?;
    log::info!(
        "Nominatim: {} polygonal results for '{query}'",
        candidates.len()
    );
    Ok(candidates)
}

/// Searches for `query` and returns the result at `position` as a region.
///
/// # Errors
///
/// Returns [`DownloadError::NoCandidate`] if there is no polygonal result
/// at that position, or any error from [`search_boundaries`].
pub async fn fetch_region(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
    position: usize,
) -> Result<Region, DownloadError> {
    let candidates = search_boundaries(client, base_url, query).await?;
    let candidate = select_candidate(candidates, query, position)?;
    log::info!("Selected boundary: {}", candidate.display_name);
    Ok(candidate.into_region(query))
}

/// Picks the candidate ranked at `position` in the search results.
///
/// # Errors
///
/// Returns [`DownloadError::NoCandidate`] if `position` is out of range or
/// the result there is not polygonal.
pub fn select_candidate(
    candidates: Vec<BoundaryCandidate>,
    query: &str,
    position: usize,
) -> Result<BoundaryCandidate, DownloadError> {
    let available = candidates.len();
    candidates
        .into_iter()
        .find(|c| c.rank == position)
        .ok_or_else(|| DownloadError::NoCandidate {
            query: query.to_string(),
            position,
            available,
        })
}

/// Parses a Nominatim `GeoJSON` response.
///
/// Results whose geometry is not polygonal (e.g. a node) are skipped, but
/// still count towards the [`BoundaryCandidate::rank`] of later results.
///
/// # Errors
///
/// Returns [`DownloadError::Parse`] if the body is not a feature collection.
pub fn parse_boundaries(body: &serde_json::Value) -> Result<Vec<BoundaryCandidate>, DownloadError> {
    let features = body["features"]
        .as_array()
        .ok_or_else(|| DownloadError::Parse {
            message: "Nominatim response has no 'features' array".to_string(),
        })?;

    let mut candidates = Vec::with_capacity(features.len());
    for (rank, feature) in features.iter().enumerate() {
        let props = &feature["properties"];
        let display_name = props["display_name"].as_str().unwrap_or_default().to_string();

        let Some(geometry) = serde_json::from_value::<geojson::Geometry>(feature["geometry"].clone())
            .ok()
            .and_then(multipolygon_from_geometry)
        else {
            log::debug!("Skipping non-polygonal result '{display_name}'");
            continue;
        };

        candidates.push(BoundaryCandidate {
            rank,
            display_name,
            osm_type: props["osm_type"].as_str().map(String::from),
            osm_id: props["osm_id"].as_u64(),
            place_rank: props["place_rank"]
                .as_u64()
                .and_then(|r| u32::try_from(r).ok()),
            importance: props["importance"].as_f64(),
            geometry,
        });
    }

    Ok(candidates)
}
