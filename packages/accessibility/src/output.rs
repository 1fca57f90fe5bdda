//! Output writers: the accessibility table and travel matrices as CSV, and
//! the enriched cells as a `GeoJSON` feature collection for choropleth
//! rendering.

use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use urban_access_geography_models::{AccessibilityRecord, EnrichedCell};
use urban_access_routing::osrm::TravelMatrix;

use crate::AccessError;

/// Writes records as CSV with columns `origin_id`, `facility_id`,
/// `distance_km`, `travel_time_minutes` (empty when not routed).
///
/// # Errors
///
/// Returns [`AccessError::Csv`] if writing fails.
pub fn write_records<W: Write>(writer: W, records: &[AccessibilityRecord]) -> Result<(), AccessError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush().map_err(|e| AccessError::Csv(e.into()))?;
    Ok(())
}

/// Writes records to a CSV file.
///
/// # Errors
///
/// Returns [`AccessError`] if the file cannot be created or written.
pub fn write_records_file(path: &Path, records: &[AccessibilityRecord]) -> Result<(), AccessError> {
    let file = create(path)?;
    write_records(file, records)?;
    log::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
struct MatrixRow<'a> {
    origin_id: &'a str,
    destination_id: &'a str,
    distance_km: Option<f64>,
    travel_time_minutes: Option<f64>,
}

/// Writes a travel matrix in long form, one row per origin and destination
/// in row-major order, with columns `origin_id`, `destination_id`,
/// `distance_km` and `travel_time_minutes` (empty when unroutable).
///
/// Ids pair with matrix rows and columns by position; surplus ids or
/// entries on either side are ignored.
///
/// # Errors
///
/// Returns [`AccessError::Csv`] if writing fails.
pub fn write_matrix<W: Write>(
    writer: W,
    origin_ids: &[String],
    destination_ids: &[String],
    matrix: &TravelMatrix,
) -> Result<(), AccessError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let rows = matrix.distances_km.iter().zip(&matrix.durations_minutes);
    for (origin_id, (distances, durations)) in origin_ids.iter().zip(rows) {
        for (destination_id, (distance_km, minutes)) in
            destination_ids.iter().zip(distances.iter().zip(durations))
        {
            wtr.serialize(MatrixRow {
                origin_id,
                destination_id,
                distance_km: *distance_km,
                travel_time_minutes: *minutes,
            })?;
        }
    }
    wtr.flush().map_err(|e| AccessError::Csv(e.into()))?;
    Ok(())
}

/// Writes a travel matrix to a CSV file.
///
/// # Errors
///
/// Returns [`AccessError`] if the file cannot be created or written.
pub fn write_matrix_file(
    path: &Path,
    origin_ids: &[String],
    destination_ids: &[String],
    matrix: &TravelMatrix,
) -> Result<(), AccessError> {
    let file = create(path)?;
    write_matrix(file, origin_ids, destination_ids, matrix)?;
    log::info!(
        "Wrote {} x {} matrix to {}",
        origin_ids.len(),
        destination_ids.len(),
        path.display()
    );
    Ok(())
}

/// Builds a `GeoJSON` `FeatureCollection` with one hexagon feature per cell.
///
/// Properties are `id`, `resolution` and every cell attribute.
#[must_use]
pub fn cells_to_geojson(cells: &[EnrichedCell]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = cells
        .iter()
        .map(|cell| {
            let geometry = geojson::Geometry::new(geojson::Value::from(&cell.cell.geometry));

            let mut properties = serde_json::Map::new();
            properties.insert("id".to_string(), cell.cell.id.clone().into());
            properties.insert("resolution".to_string(), cell.cell.resolution.into());
            for (name, value) in &cell.attributes {
                properties.insert(name.clone(), (*value).into());
            }

            serde_json::json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": properties,
            })
        })
        .collect();

    serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Writes the cell layer as `GeoJSON`, buffered, and flushes it.
///
/// # Errors
///
/// Returns the first I/O error, including one raised by the final flush.
pub fn write_cells<W: Write>(writer: W, cells: &[EnrichedCell]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer(&mut writer, &cells_to_geojson(cells))?;
    writer.flush()
}

/// Writes the cell layer to a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`AccessError::Io`] if the file cannot be created or written.
pub fn write_cells_geojson(path: &Path, cells: &[EnrichedCell]) -> Result<(), AccessError> {
    let file = create(path)?;
    write_cells(file, cells).map_err(|e| io_error(path, e))?;
    log::info!("Wrote {} cells to {}", cells.len(), path.display());
    Ok(())
}

fn create(path: &Path) -> Result<std::fs::File, AccessError> {
    std::fs::File::create(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> AccessError {
    AccessError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use urban_access_grid::cell_from_id;

    use super::*;

    #[test]
    fn csv_leaves_missing_travel_time_empty() {
        let records = vec![
            AccessibilityRecord {
                origin_id: "a".to_string(),
                facility_id: "f1".to_string(),
                distance_km: 1.5,
                travel_time_minutes: Some(12.0),
            },
            AccessibilityRecord {
                origin_id: "b".to_string(),
                facility_id: "f2".to_string(),
                distance_km: 0.25,
                travel_time_minutes: None,
            },
        ];

        let mut buf = Vec::new();
        write_records(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "origin_id,facility_id,distance_km,travel_time_minutes\n\
             a,f1,1.5,12.0\n\
             b,f2,0.25,\n"
        );
    }

    #[test]
    fn matrix_is_written_row_major_with_gaps_empty() {
        let matrix = TravelMatrix {
            distances_km: vec![vec![Some(1.5), None], vec![Some(0.5), Some(2.0)]],
            durations_minutes: vec![vec![Some(18.0), None], vec![Some(6.0), Some(24.0)]],
        };
        let origins = vec!["o1".to_string(), "o2".to_string()];
        let destinations = vec!["d1".to_string(), "d2".to_string()];

        let mut buf = Vec::new();
        write_matrix(&mut buf, &origins, &destinations, &matrix).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "origin_id,destination_id,distance_km,travel_time_minutes\n\
             o1,d1,1.5,18.0\n\
             o1,d2,,\n\
             o2,d1,0.5,6.0\n\
             o2,d2,2.0,24.0\n"
        );
    }

    #[test]
    fn geojson_has_one_polygon_feature_per_cell() {
        let cell = cell_from_id("8828308281fffff").unwrap();
        let mut enriched = EnrichedCell::new(cell);
        enriched.attributes.insert("population".to_string(), 42.0);

        let collection = cells_to_geojson(&[enriched]);
        let features = collection["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["type"], "Polygon");
        assert_eq!(features[0]["properties"]["id"], "8828308281fffff");
        assert_eq!(features[0]["properties"]["resolution"], 8);
        assert_eq!(features[0]["properties"]["population"], 42.0);

        let ring = features[0]["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.first(), ring.last());
    }

    /// Accepts every write but fails to flush.
    struct FlushFails(Vec<u8>);

    impl Write for FlushFails {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn flush_failure_is_reported() {
        let cell = EnrichedCell::new(cell_from_id("8828308281fffff").unwrap());
        let err = write_cells(FlushFails(Vec::new()), &[cell]).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn cells_file_is_complete_geojson() {
        let path = std::env::temp_dir().join(format!("urban_access_cells_{}.geojson", std::process::id()));
        let cell = EnrichedCell::new(cell_from_id("8828308281fffff").unwrap());
        write_cells_geojson(&path, &[cell]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["features"].as_array().unwrap().len(), 1);
    }
}
