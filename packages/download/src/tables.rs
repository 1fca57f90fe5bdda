//! Local CSV tables of facilities.
//!
//! Column names are matched case-insensitively. Latitude may be `latitude`
//! or `lat`, longitude `longitude`, `lon` or `lng`. An `id` column is
//! optional (the row number is used instead), as is a `kind`/`poi_type`
//! column.

use std::io::{Read, Write};
use std::path::Path;

use urban_access_geography_models::{Coordinate, Facility};

use crate::DownloadError;

pub(crate) const LAT_COLUMNS: &[&str] = &["latitude", "lat"];
pub(crate) const LON_COLUMNS: &[&str] = &["longitude", "lon", "lng"];
const ID_COLUMNS: &[&str] = &["id", "facility_id"];
const KIND_COLUMNS: &[&str] = &["kind", "poi_type", "type"];

/// Position of the first header matching any of `names`.
pub(crate) fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

pub(crate) fn require_column(
    headers: &csv::StringRecord,
    names: &[&str],
) -> Result<usize, DownloadError> {
    find_column(headers, names).ok_or_else(|| DownloadError::Parse {
        message: format!("CSV has no column named any of {names:?}"),
    })
}

pub(crate) fn parse_coordinate(
    record: &csv::StringRecord,
    lat_idx: usize,
    lon_idx: usize,
) -> Option<Coordinate> {
    let lat = record.get(lat_idx)?.trim().parse::<f64>().ok()?;
    let lon = record.get(lon_idx)?.trim().parse::<f64>().ok()?;
    let coordinate = Coordinate::new(lat, lon);
    coordinate.is_valid().then_some(coordinate)
}

/// Reads facilities from CSV.
///
/// Rows with missing or out-of-range coordinates are skipped and logged.
///
/// # Errors
///
/// Returns [`DownloadError`] if the CSV is malformed or lacks coordinate
/// columns.
pub fn read_facilities<R: Read>(reader: R) -> Result<Vec<Facility>, DownloadError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let lat_idx = require_column(&headers, LAT_COLUMNS)?;
    let lon_idx = require_column(&headers, LON_COLUMNS)?;
    let id_idx = find_column(&headers, ID_COLUMNS);
    let kind_idx = find_column(&headers, KIND_COLUMNS);

    let mut facilities = Vec::new();
    let mut skipped = 0u64;

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let Some(location) = parse_coordinate(&record, lat_idx, lon_idx) else {
            skipped += 1;
            continue;
        };

        let id = id_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| row.to_string(), String::from);

        let kind = kind_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        facilities.push(Facility { id, location, kind });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} facility rows with invalid coordinates");
    }
    log::info!("Read {} facilities", facilities.len());

    Ok(facilities)
}

/// Reads facilities from a CSV file.
///
/// # Errors
///
/// Returns [`DownloadError`] if the file cannot be opened or parsed.
pub fn read_facilities_file(path: &Path) -> Result<Vec<Facility>, DownloadError> {
    let file = std::fs::File::open(path).map_err(|e| DownloadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    read_facilities(std::io::BufReader::new(file))
}

/// Writes facilities as CSV with columns `id`, `latitude`, `longitude`,
/// `kind`, readable by [`read_facilities`].
///
/// # Errors
///
/// Returns [`DownloadError::Csv`] if writing fails.
pub fn write_facilities<W: Write>(writer: W, facilities: &[Facility]) -> Result<(), DownloadError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["id", "latitude", "longitude", "kind"])?;
    for facility in facilities {
        let lat = facility.location.lat.to_string();
        let lon = facility.location.lon.to_string();
        wtr.write_record([
            facility.id.as_str(),
            lat.as_str(),
            lon.as_str(),
            facility.kind.as_deref().unwrap_or_default(),
        ])?;
    }
    wtr.flush().map_err(|e| DownloadError::Csv(e.into()))?;
    Ok(())
}
