//! `OSRM` HTTP client.
//!
//! Batches go through the `table` service: every pair's origin is a
//! source, every distinct destination is a destination, and each pair reads
//! its own cell from the returned duration/distance matrices. Single pairs
//! can use the `route` service directly, and full origin-by-destination
//! matrices come from [`OsrmClient::travel_matrix`].
//!
//! See <https://project-osrm.org/docs/v5.24.0/api/>

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use urban_access_geography_models::Coordinate;

use crate::config::RoutingConfig;
use crate::{OdPair, RouteLeg, RoutingError, RoutingService, retry};

/// Client for an `osrm-routed` instance.
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

/// A prepared `table` request: the URL plus, for each pair, which column
/// of the response matrices holds its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    pub url: String,
    pub destination_columns: Vec<usize>,
}

/// Distance and travel-time matrices with origins as rows and
/// destinations as columns. `None` marks an unroutable pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TravelMatrix {
    pub distances_km: Vec<Vec<Option<f64>>>,
    pub durations_minutes: Vec<Vec<Option<f64>>>,
}

impl TravelMatrix {
    fn append(&mut self, other: Self) {
        self.distances_km.extend(other.distances_km);
        self.durations_minutes.extend(other.durations_minutes);
    }
}

impl OsrmClient {
    /// Creates a client for the service at `base_url`.
    ///
    /// `request_timeout` bounds each individual HTTP attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        max_retries: u32,
        request_timeout: Duration,
    ) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("urban-access/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    /// Creates a client from a [`RoutingConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, RoutingError> {
        Self::new(&config.base_url, config.max_retries, config.batch_timeout())
    }

    /// Builds the `table` request for a batch of pairs.
    #[must_use]
    pub fn table_request(&self, profile: &str, pairs: &[OdPair]) -> TableRequest {
        let mut destinations: Vec<Coordinate> = Vec::new();
        let mut seen: BTreeMap<(u64, u64), usize> = BTreeMap::new();
        let destination_columns = pairs
            .iter()
            .map(|pair| {
                let key = (pair.destination.lat.to_bits(), pair.destination.lon.to_bits());
                *seen.entry(key).or_insert_with(|| {
                    destinations.push(pair.destination);
                    destinations.len() - 1
                })
            })
            .collect();

        let coordinates: Vec<String> = pairs
            .iter()
            .map(|p| format_coordinate(p.origin))
            .chain(destinations.iter().map(|&c| format_coordinate(c)))
            .collect();

        let n = pairs.len();
        let sources = join_indices(0..n);
        let targets = join_indices(n..n + destinations.len());

        let mut url = format!(
            "{}/table/v1/{profile}/{}",
            self.base_url,
            coordinates.join(";")
        );
        let _ = write!(
            url,
            "?sources={sources}&destinations={targets}&annotations=duration,distance"
        );

        TableRequest {
            url,
            destination_columns,
        }
    }

    /// Builds the `table` URL for every origin against every destination.
    #[must_use]
    pub fn matrix_url(
        &self,
        profile: &str,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> String {
        let coordinates: Vec<String> = origins
            .iter()
            .chain(destinations)
            .map(|&c| format_coordinate(c))
            .collect();
        let n = origins.len();
        format!(
            "{}/table/v1/{profile}/{}?sources={}&destinations={}&annotations=duration,distance",
            self.base_url,
            coordinates.join(";"),
            join_indices(0..n),
            join_indices(n..n + destinations.len())
        )
    }

    /// Computes the full origin-by-destination matrix.
    ///
    /// Origins are sent `rows_per_request` at a time (at least one) so each
    /// request stays within the server's table size limit; every request
    /// carries all destinations.
    ///
    /// # Errors
    ///
    /// Returns the first [`RoutingError`] from any request.
    pub async fn travel_matrix(
        &self,
        profile: &str,
        origins: &[Coordinate],
        destinations: &[Coordinate],
        rows_per_request: usize,
    ) -> Result<TravelMatrix, RoutingError> {
        if destinations.is_empty() {
            return Ok(TravelMatrix {
                distances_km: vec![Vec::new(); origins.len()],
                durations_minutes: vec![Vec::new(); origins.len()],
            });
        }

        let mut matrix = TravelMatrix::default();
        let chunks = origins.chunks(rows_per_request.max(1));
        let total = chunks.len();
        for (i, chunk) in chunks.enumerate() {
            let url = self.matrix_url(profile, chunk, destinations);
            log::debug!(
                "OSRM matrix request {}/{total}: {} x {}",
                i + 1,
                chunk.len(),
                destinations.len()
            );
            let body = retry::send_json(|| self.client.get(&url), self.max_retries).await?;
            matrix.append(parse_matrix_response(&body, chunk.len(), destinations.len())?);
        }

        log::info!(
            "OSRM matrix: {} origins x {} destinations in {total} requests",
            origins.len(),
            destinations.len()
        );
        Ok(matrix)
    }

    /// Routes a single pair with the `route` service.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] if the request fails or the response is
    /// malformed. A response with code `NoRoute` yields `Ok(None)`.
    pub async fn route(&self, profile: &str, pair: OdPair) -> Result<Option<RouteLeg>, RoutingError> {
        let url = format!(
            "{}/route/v1/{profile}/{};{}",
            self.base_url,
            format_coordinate(pair.origin),
            format_coordinate(pair.destination)
        );
        log::debug!("OSRM route request: {url}");

        let body = retry::send_json(
            || self.client.get(&url).query(&[("overview", "false")]),
            self.max_retries,
        )
        .await?;

        parse_route_response(&body)
    }
}

#[async_trait]
impl RoutingService for OsrmClient {
    fn name(&self) -> &str {
        "osrm"
    }

    async fn route_batch(
        &self,
        profile: &str,
        pairs: &[OdPair],
    ) -> Result<Vec<Option<RouteLeg>>, RoutingError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.table_request(profile, pairs);
        log::debug!("OSRM table request for {} pairs", pairs.len());

        let body = retry::send_json(|| self.client.get(&request.url), self.max_retries).await?;
        parse_table_response(&body, &request.destination_columns)
    }
}

/// `lon,lat` with fixed precision (~1 cm).
fn format_coordinate(c: Coordinate) -> String {
    format!("{:.7},{:.7}", c.lon, c.lat)
}

fn join_indices(range: std::ops::Range<usize>) -> String {
    range
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn check_code(body: &serde_json::Value) -> Result<(), RoutingError> {
    match body.get("code").and_then(serde_json::Value::as_str) {
        Some("Ok") => Ok(()),
        Some(code) => Err(RoutingError::Payload {
            message: format!(
                "OSRM code {code}: {}",
                body.get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("no message")
            ),
        }),
        None => Err(RoutingError::Payload {
            message: "OSRM response missing 'code'".to_string(),
        }),
    }
}

fn matrix<'a>(body: &'a serde_json::Value, key: &str) -> Result<&'a Vec<serde_json::Value>, RoutingError> {
    body.get(key)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| RoutingError::Payload {
            message: format!("OSRM table response missing '{key}'"),
        })
}

/// Parses an `OSRM` `table` response into one optional leg per pair.
///
/// Row `i` is pair `i`'s origin; `destination_columns[i]` selects the
/// column. `null` cells mean no route.
///
/// # Errors
///
/// Returns [`RoutingError::Payload`] if the code is not `Ok` or the
/// matrices are missing or too small.
pub fn parse_table_response(
    body: &serde_json::Value,
    destination_columns: &[usize],
) -> Result<Vec<Option<RouteLeg>>, RoutingError> {
    check_code(body)?;
    let durations = matrix(body, "durations")?;
    let distances = matrix(body, "distances")?;

    if durations.len() < destination_columns.len() || distances.len() < destination_columns.len() {
        return Err(RoutingError::Payload {
            message: format!(
                "OSRM table has {} rows, expected {}",
                durations.len().min(distances.len()),
                destination_columns.len()
            ),
        });
    }

    destination_columns
        .iter()
        .enumerate()
        .map(|(row, &column)| {
            let cell = |m: &[serde_json::Value]| -> Result<Option<f64>, RoutingError> {
                let value = m[row]
                    .as_array()
                    .and_then(|r| r.get(column))
                    .ok_or_else(|| RoutingError::Payload {
                        message: format!("OSRM table missing cell ({row}, {column})"),
                    })?;
                Ok(value.as_f64())
            };

            Ok(match (cell(durations)?, cell(distances)?) {
                (Some(duration_seconds), Some(distance_meters)) => Some(RouteLeg {
                    duration_seconds,
                    distance_meters,
                }),
                _ => None,
            })
        })
        .collect()
}

/// Parses an `OSRM` `table` response for `rows` sources and `columns`
/// destinations, converting seconds to minutes and metres to kilometres.
///
/// # Errors
///
/// Returns [`RoutingError::Payload`] if the code is not `Ok` or either
/// matrix has the wrong shape.
pub fn parse_matrix_response(
    body: &serde_json::Value,
    rows: usize,
    columns: usize,
) -> Result<TravelMatrix, RoutingError> {
    check_code(body)?;

    let read = |key: &str, scale: f64| -> Result<Vec<Vec<Option<f64>>>, RoutingError> {
        let values = matrix(body, key)?;
        if values.len() != rows {
            return Err(RoutingError::Payload {
                message: format!("OSRM '{key}' has {} rows, expected {rows}", values.len()),
            });
        }
        values
            .iter()
            .map(|row| {
                let row = row
                    .as_array()
                    .filter(|r| r.len() == columns)
                    .ok_or_else(|| RoutingError::Payload {
                        message: format!("OSRM '{key}' row does not have {columns} columns"),
                    })?;
                Ok(row.iter().map(|v| v.as_f64().map(|x| x / scale)).collect())
            })
            .collect()
    };

    Ok(TravelMatrix {
        distances_km: read("distances", 1000.0)?,
        durations_minutes: read("durations", 60.0)?,
    })
}

/// Parses an `OSRM` `route` response, taking the first route.
///
/// # Errors
///
/// Returns [`RoutingError::Payload`] for a non-`Ok` code other than
/// `NoRoute` or a route without duration/distance.
pub fn parse_route_response(body: &serde_json::Value) -> Result<Option<RouteLeg>, RoutingError> {
    if body.get("code").and_then(serde_json::Value::as_str) == Some("NoRoute") {
        return Ok(None);
    }
    check_code(body)?;

    let Some(route) = body
        .get("routes")
        .and_then(serde_json::Value::as_array)
        .and_then(|routes| routes.first())
    else {
        return Ok(None);
    };

    let field = |name: &str| {
        route[name].as_f64().ok_or_else(|| RoutingError::Payload {
            message: format!("OSRM route missing '{name}'"),
        })
    };

    Ok(Some(RouteLeg {
        duration_seconds: field("duration")?,
        distance_meters: field("distance")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OsrmClient {
        OsrmClient::new("http://localhost:5000/", 0, Duration::from_secs(1)).unwrap()
    }

    fn pair(olat: f64, olon: f64, dlat: f64, dlon: f64) -> OdPair {
        OdPair {
            origin: Coordinate::new(olat, olon),
            destination: Coordinate::new(dlat, dlon),
        }
    }

    #[test]
    fn table_request_deduplicates_destinations() {
        let pairs = [
            pair(-12.0, -77.0, -12.1, -77.1),
            pair(-12.01, -77.01, -12.2, -77.2),
            pair(-12.02, -77.02, -12.1, -77.1),
        ];
        let request = client().table_request("foot", &pairs);

        assert_eq!(request.destination_columns, vec![0, 1, 0]);
        assert_eq!(
            request.url,
            "http://localhost:5000/table/v1/foot/\
             -77.0000000,-12.0000000;-77.0100000,-12.0100000;-77.0200000,-12.0200000;\
             -77.1000000,-12.1000000;-77.2000000,-12.2000000\
             ?sources=0;1;2&destinations=3;4&annotations=duration,distance"
        );
    }

    #[test]
    fn parses_table_with_unroutable_cell() {
        let body = serde_json::json!({
            "code": "Ok",
            "durations": [[120.0, 300.0], [null, 60.0]],
            "distances": [[900.0, 2500.0], [null, 400.0]]
        });
        let legs = parse_table_response(&body, &[1, 0]).unwrap();
        assert_eq!(legs.len(), 2);
        let first = legs[0].unwrap();
        assert!((first.duration_seconds - 300.0).abs() < f64::EPSILON);
        assert!((first.distance_meters - 2500.0).abs() < f64::EPSILON);
        assert!(legs[1].is_none());
    }

    #[test]
    fn table_error_code_is_payload_error() {
        let body = serde_json::json!({"code": "InvalidQuery", "message": "Query string malformed"});
        let err = parse_table_response(&body, &[0]).unwrap_err();
        assert!(matches!(err, RoutingError::Payload { ref message } if message.contains("InvalidQuery")));
    }

    #[test]
    fn table_missing_rows_is_payload_error() {
        let body = serde_json::json!({
            "code": "Ok",
            "durations": [[1.0]],
            "distances": [[1.0]]
        });
        assert!(matches!(
            parse_table_response(&body, &[0, 0]),
            Err(RoutingError::Payload { .. })
        ));
    }

    #[test]
    fn table_without_distances_is_payload_error() {
        let body = serde_json::json!({"code": "Ok", "durations": [[1.0]]});
        assert!(matches!(
            parse_table_response(&body, &[0]),
            Err(RoutingError::Payload { .. })
        ));
    }

    #[test]
    fn parses_route_response() {
        let body = serde_json::json!({
            "code": "Ok",
            "routes": [{"duration": 1424.8, "distance": 1976.8, "legs": []}]
        });
        let leg = parse_route_response(&body).unwrap().unwrap();
        assert!((leg.duration_seconds - 1424.8).abs() < 1e-9);
        assert!((leg.distance_meters - 1976.8).abs() < 1e-9);
    }

    #[test]
    fn no_route_is_none() {
        let body = serde_json::json!({"code": "NoRoute", "message": "Impossible route"});
        assert!(parse_route_response(&body).unwrap().is_none());
    }

    #[test]
    fn matrix_url_lists_all_sources_and_destinations() {
        let url = client().matrix_url(
            "foot",
            &[Coordinate::new(-12.0, -77.0), Coordinate::new(-12.1, -77.1)],
            &[Coordinate::new(-12.2, -77.2)],
        );
        assert_eq!(
            url,
            "http://localhost:5000/table/v1/foot/-77.0000000,-12.0000000;-77.1000000,-12.1000000;-77.2000000,-12.2000000\
             ?sources=0;1&destinations=2&annotations=duration,distance"
        );
    }

    #[test]
    fn parses_matrix_in_km_and_minutes() {
        let body = serde_json::json!({
            "code": "Ok",
            "durations": [[120.0, null], [30.0, 600.0]],
            "distances": [[1500.0, null], [250.0, 4000.0]]
        });
        let matrix = parse_matrix_response(&body, 2, 2).unwrap();
        assert_eq!(matrix.durations_minutes[0], vec![Some(2.0), None]);
        assert_eq!(matrix.distances_km[1], vec![Some(0.25), Some(4.0)]);
    }

    #[test]
    fn misshapen_matrix_is_payload_error() {
        let body = serde_json::json!({
            "code": "Ok",
            "durations": [[1.0, 2.0]],
            "distances": [[1.0]]
        });
        assert!(matches!(
            parse_matrix_response(&body, 1, 2),
            Err(RoutingError::Payload { .. })
        ));
    }

    #[tokio::test]
    async fn matrix_without_destinations_needs_no_request() {
        let matrix = client()
            .travel_matrix("foot", &[Coordinate::new(0.0, 0.0)], &[], 10)
            .await
            .unwrap();
        assert_eq!(matrix.distances_km, vec![Vec::<Option<f64>>::new()]);
    }
}
