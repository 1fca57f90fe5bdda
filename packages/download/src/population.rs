//! HDX high-resolution population density tables.
//!
//! The Data for Good population datasets on HDX ship as CSV (often zipped)
//! with `latitude`, `longitude` and one or more population columns such as
//! `population_2020`. Every row becomes a [`FeaturePoint`] carrying all
//! numeric non-coordinate columns as attributes.
//!
//! See <https://data.humdata.org/organization/facebook>

use std::io::{Read, Seek};
use std::path::Path;

use urban_access_geography_models::FeaturePoint;

use crate::tables::{LAT_COLUMNS, LON_COLUMNS, parse_coordinate, require_column};
use crate::{DownloadError, download_file};

/// Base URL for HDX dataset resources.
pub const HDX_DATASET_URL: &str = "https://data.humdata.org/dataset";

/// Parsed population table.
#[derive(Debug, Clone, Default)]
pub struct PopulationTable {
    pub points: Vec<FeaturePoint>,
    /// Non-coordinate column names, in file order.
    pub value_columns: Vec<String>,
    /// Rows dropped for missing or invalid coordinates.
    pub skipped: u64,
}

impl PopulationTable {
    /// The column holding population counts: the first whose name contains
    /// `population`, otherwise the first value column.
    #[must_use]
    pub fn population_column(&self) -> Option<&str> {
        self.value_columns
            .iter()
            .find(|c| c.to_ascii_lowercase().contains("population"))
            .or_else(|| self.value_columns.first())
            .map(String::as_str)
    }

    /// Sum of `column` over all points.
    #[must_use]
    pub fn total(&self, column: &str) -> f64 {
        self.points
            .iter()
            .filter_map(|p| p.attributes.get(column))
            .sum()
    }
}

/// Reads a population CSV.
///
/// Values that do not parse as numbers are left out of that row's
/// attributes.
///
/// # Errors
///
/// Returns [`DownloadError`] if the CSV is malformed or lacks coordinate
/// columns.
pub fn read_population_csv<R: Read>(reader: R) -> Result<PopulationTable, DownloadError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let lat_idx = require_column(&headers, LAT_COLUMNS)?;
    let lon_idx = require_column(&headers, LON_COLUMNS)?;

    let value_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != lat_idx && *i != lon_idx)
        .map(|(i, name)| (i, name.trim().to_string()))
        .collect();

    let mut table = PopulationTable {
        value_columns: value_columns.iter().map(|(_, name)| name.clone()).collect(),
        ..PopulationTable::default()
    };

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let Some(location) = parse_coordinate(&record, lat_idx, lon_idx) else {
            table.skipped += 1;
            continue;
        };

        let mut point = FeaturePoint::new(row.to_string(), location);
        for (i, name) in &value_columns {
            if let Some(value) = record
                .get(*i)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
            {
                point.attributes.insert(name.clone(), value);
            }
        }
        table.points.push(point);
    }

    if table.skipped > 0 {
        log::warn!(
            "Skipped {} population rows with invalid coordinates",
            table.skipped
        );
    }
    log::info!(
        "Read {} population points (columns: {})",
        table.points.len(),
        table.value_columns.join(", ")
    );

    Ok(table)
}

/// Reads the first `.csv` entry of a zip archive.
///
/// # Errors
///
/// Returns [`DownloadError::Archive`] if the archive is unreadable or has no
/// CSV entry, or any error from [`read_population_csv`].
pub fn read_population_zip<R: Read + Seek>(reader: R) -> Result<PopulationTable, DownloadError> {
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| DownloadError::Archive {
        message: e.to_string(),
    })?;

    let Some(index) = (0..archive.len()).find(|&i| {
        archive
            .name_for_index(i)
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(".csv"))
    }) else {
        return Err(DownloadError::Archive {
            message: "archive contains no .csv entry".to_string(),
        });
    };

    let entry = archive.by_index(index).map_err(|e| DownloadError::Archive {
        message: e.to_string(),
    })?;
    log::info!("Reading {} from archive", entry.name());
    read_population_csv(entry)
}

/// Reads a population file, unzipping it when it ends in `.zip`.
///
/// # Errors
///
/// Returns [`DownloadError`] if the file cannot be opened or parsed.
pub fn read_population_file(path: &Path) -> Result<PopulationTable, DownloadError> {
    let file = std::fs::File::open(path).map_err(|e| DownloadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = std::io::BufReader::new(file);

    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        read_population_zip(reader)
    } else {
        read_population_csv(reader)
    }
}

/// Downloads an HDX resource to `dest` and reads it.
///
/// `resource` is either a full URL or the path after
/// `https://data.humdata.org/dataset/`.
///
/// # Errors
///
/// Returns [`DownloadError`] if the download or parse fails.
pub async fn download_population(
    client: &reqwest::Client,
    resource: &str,
    dest: &Path,
) -> Result<PopulationTable, DownloadError> {
    let url = resource_url(resource);
    download_file(client, &url, dest).await?;

    let path = dest.to_path_buf();
    tokio::task::spawn_blocking(move || read_population_file(&path))
        .await
        .map_err(|e| DownloadError::Parse {
            message: format!("population reader task failed: {e}"),
        })?
}

fn resource_url(resource: &str) -> String {
    if resource.starts_with("http://") || resource.starts_with("https://") {
        resource.to_string()
    } else {
        format!("{HDX_DATASET_URL}/{}", resource.trim_start_matches('/'))
    }
}
