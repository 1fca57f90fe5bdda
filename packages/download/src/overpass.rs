//! Overpass API point-of-interest download.
//!
//! Facility categories follow the HOT OSM groupings. Each category is a set
//! of node filters run inside a global `[bbox]`. Arbitrary Overpass QL can
//! be run with [`fetch_custom`].
//!
//! See <https://wiki.openstreetmap.org/wiki/Overpass_API/Language_Guide>

use std::fmt;
use std::str::FromStr;

use urban_access_geography_models::{BoundingBox, Coordinate, Facility};

use crate::{DownloadError, get_json};

/// Public Overpass interpreter endpoint.
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Facility category to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacilityKind {
    Food,
    Health,
    Education,
    Finance,
}

impl FacilityKind {
    pub const ALL: [Self; 4] = [Self::Food, Self::Health, Self::Education, Self::Finance];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Health => "health",
            Self::Education => "education",
            Self::Finance => "finance",
        }
    }

    /// Overpass QL node filters for this category.
    #[must_use]
    pub const fn filter(self) -> &'static str {
        match self {
            Self::Food => {
                "node[\"amenity\"=\"marketplace\"];\n\
                 node[\"shop\"~\"supermarket|kiosk|mall|convenience|butcher|greengrocer\"];"
            }
            Self::Health => "node[\"amenity\"~\"doctors|dentist|clinic|hospital|pharmacy\"];",
            Self::Education => "node[\"amenity\"~\"kindergarten|school|college|university\"];",
            Self::Finance => {
                "node[\"amenity\"~\"mobile_money_agent|bureau_de_change|bank|microfinance|atm|sacco|money_transfer|post_office\"];"
            }
        }
    }

    /// Overpass QL query for this category. The bounding box is supplied
    /// separately as the `bbox` request parameter.
    #[must_use]
    pub fn query(self) -> String {
        format!(
            "[timeout:120][out:json][bbox];\n(\n{}\n);\nout body geom;",
            self.filter()
        )
    }
}

impl fmt::Display for FacilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacilityKind {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DownloadError::Parse {
                message: format!(
                    "Unknown facility kind '{s}' (expected food, health, education or finance)"
                ),
            })
    }
}

/// Downloads facilities of one category inside `bounds`.
///
/// # Errors
///
/// Returns [`DownloadError`] if the HTTP request or response parsing fails.
pub async fn fetch_facilities(
    client: &reqwest::Client,
    base_url: &str,
    kind: FacilityKind,
    bounds: &BoundingBox,
) -> Result<Vec<Facility>, DownloadError> {
    let query = kind.query();
    let bbox = bounds.to_bbox_string();
    log::info!("Overpass: fetching {kind} facilities in {bbox}");

    let body = get_json(client, base_url, &[("data", query.as_str()), ("bbox", bbox.as_str())]).await?;
    let facilities = parse_elements(&body, Some(kind))?;

    log::info!("Overpass: {} {kind} facilities", facilities.len());
    Ok(facilities)
}

/// Runs a caller-written Overpass QL query and returns its elements as
/// facilities.
///
/// `bounds` is sent as the `bbox` parameter, so a query declaring a global
/// `[bbox]` is limited to it. The query must ask for JSON output
/// (`[out:json]`); ways and relations need `out center` to have a location.
///
/// # Errors
///
/// Returns [`DownloadError`] if the HTTP request or response parsing fails.
pub async fn fetch_custom(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
    bounds: &BoundingBox,
) -> Result<Vec<Facility>, DownloadError> {
    let bbox = bounds.to_bbox_string();
    log::info!("Overpass: running custom query in {bbox}");

    let body = get_json(client, base_url, &[("data", query), ("bbox", bbox.as_str())]).await?;
    let facilities = parse_elements(&body, None)?;

    log::info!("Overpass: {} elements from custom query", facilities.len());
    Ok(facilities)
}

/// Parses Overpass JSON `elements` into facilities.
///
/// The facility `kind` is the element's `amenity` tag, falling back to
/// `shop` for food and for custom queries (`kind = None`). Ways and
/// relations use their `center`. Elements without any location are
/// skipped.
///
/// # Errors
///
/// Returns [`DownloadError::Parse`] if the body has no `elements` array.
pub fn parse_elements(
    body: &serde_json::Value,
    kind: Option<FacilityKind>,
) -> Result<Vec<Facility>, DownloadError> {
    let elements = body["elements"]
        .as_array()
        .ok_or_else(|| DownloadError::Parse {
            message: "Overpass response has no 'elements' array".to_string(),
        })?;

    let mut skipped = 0usize;
    let facilities: Vec<Facility> = elements
        .iter()
        .filter_map(|element| {
            let located = if element["lat"].is_number() { element } else { &element["center"] };
            let (Some(lat), Some(lon)) = (located["lat"].as_f64(), located["lon"].as_f64()) else {
                skipped += 1;
                return None;
            };

            let element_type = element["type"].as_str().unwrap_or("node");
            let id = element["id"]
                .as_u64()
                .map_or_else(|| format!("{element_type}/unknown"), |id| format!("{element_type}/{id}"));

            let tags = &element["tags"];
            let poi_type = tags["amenity"].as_str().or_else(|| {
                matches!(kind, None | Some(FacilityKind::Food))
                    .then(|| tags["shop"].as_str())
                    .flatten()
            });

            Some(Facility {
                id,
                location: Coordinate::new(lat, lon),
                kind: poi_type.map(String::from),
            })
        })
        .collect();

    if skipped > 0 {
        log::debug!("Overpass: skipped {skipped} elements without coordinates");
    }
    Ok(facilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_names() {
        assert_eq!("Health".parse::<FacilityKind>().unwrap(), FacilityKind::Health);
        assert_eq!(" food ".parse::<FacilityKind>().unwrap(), FacilityKind::Food);
        assert!("parks".parse::<FacilityKind>().is_err());
    }

    #[test]
    fn query_wraps_filters() {
        let query = FacilityKind::Education.query();
        assert!(query.starts_with("[timeout:120][out:json][bbox];"));
        assert!(query.contains("kindergarten|school|college|university"));
        assert!(query.ends_with("out body geom;"));
    }

    #[test]
    fn parses_health_elements() {
        let body = serde_json::json!({
            "elements": [
                {
                    "type": "node", "id": 367_826_732u64,
                    "lat": -0.944_005, "lon": -80.733_941,
                    "tags": {"amenity": "pharmacy", "name": "Fybeca"}
                },
                {
                    "type": "node", "id": 367_830_051u64,
                    "lat": -0.954_086, "lon": -80.742_42,
                    "tags": {"amenity": "hospital", "emergency": "yes"}
                },
                {"type": "way", "id": 5, "tags": {"amenity": "clinic"}}
            ]
        });
        let facilities = parse_elements(&body, Some(FacilityKind::Health)).unwrap();
        assert_eq!(facilities.len(), 2);
        assert_eq!(facilities[0].id, "node/367826732");
        assert_eq!(facilities[0].kind.as_deref(), Some("pharmacy"));
        assert!((facilities[1].location.lon - -80.742_42).abs() < 1e-9);
    }

    #[test]
    fn food_falls_back_to_shop_tag() {
        let body = serde_json::json!({
            "elements": [
                {"type": "node", "id": 1, "lat": 1.0, "lon": 2.0, "tags": {"shop": "kiosk"}},
                {"type": "node", "id": 2, "lat": 1.0, "lon": 2.0, "tags": {"amenity": "marketplace"}}
            ]
        });
        let food = parse_elements(&body, Some(FacilityKind::Food)).unwrap();
        assert_eq!(food[0].kind.as_deref(), Some("kiosk"));
        assert_eq!(food[1].kind.as_deref(), Some("marketplace"));

        let health = parse_elements(&body, Some(FacilityKind::Health)).unwrap();
        assert!(health[0].kind.is_none());
    }

    #[test]
    fn custom_results_use_way_centers_and_shop_tags() {
        let body = serde_json::json!({
            "elements": [
                {
                    "type": "way", "id": 77,
                    "center": {"lat": -12.1, "lon": -77.0},
                    "tags": {"shop": "bakery"}
                },
                {"type": "relation", "id": 8, "tags": {"amenity": "school"}}
            ]
        });
        let facilities = parse_elements(&body, None).unwrap();
        assert_eq!(facilities.len(), 1);
        assert_eq!(facilities[0].id, "way/77");
        assert_eq!(facilities[0].kind.as_deref(), Some("bakery"));
        assert!((facilities[0].location.lat - -12.1).abs() < 1e-12);
    }

    #[test]
    fn missing_elements_is_parse_error() {
        assert!(matches!(
            parse_elements(&serde_json::json!({"remark": "timeout"}), Some(FacilityKind::Finance)),
            Err(DownloadError::Parse { .. })
        ));
    }
}
