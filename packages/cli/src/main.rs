#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the urban access toolchain.
//!
//! Uses `indicatif-log-bridge` (via [`urban_access_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod pipeline;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use urban_access_accessibility::output::write_matrix_file;
use urban_access_cli_utils::IndicatifProgress;
use urban_access_download::hdx::{self, HDX_SEARCH_URL, POPULATION_REPOSITORY};
use urban_access_download::nominatim::{self, NOMINATIM_SEARCH_URL};
use urban_access_download::overpass::{self, FacilityKind, OVERPASS_URL};
use urban_access_download::{http_client, population, tables};
use urban_access_geography_models::{Coordinate, Facility, Region};
use urban_access_grid::{generate_cells, region_from_geojson};
use urban_access_routing::config::RoutingConfig;
use urban_access_routing::osrm::OsrmClient;
use urban_access_routing::progress::ProgressCallback as _;

#[derive(Parser)]
#[command(name = "urban_access", about = "Urban accessibility analysis toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search Nominatim for a boundary and save it as `GeoJSON`
    Boundary {
        /// Free-form place query (e.g., "Lima, Peru")
        query: String,
        /// Position of the polygon within the ranked results
        #[arg(long, default_value = "0")]
        position: usize,
        /// Output `GeoJSON` file
        #[arg(long, default_value = "region.geojson")]
        output: PathBuf,
        /// Only list the polygonal results
        #[arg(long)]
        list: bool,
        /// Nominatim search endpoint
        #[arg(long, default_value = NOMINATIM_SEARCH_URL)]
        endpoint: String,
    },
    /// Download facilities of one category, or the results of an Overpass
    /// QL query, inside a region from Overpass
    Pois {
        /// Region `GeoJSON` file
        #[arg(long)]
        region: PathBuf,
        /// Facility category: food, health, education or finance
        #[arg(long, required_unless_present = "query", conflicts_with = "query")]
        kind: Option<String>,
        /// File with an Overpass QL query (`[out:json]`, `out center`)
        #[arg(long)]
        query: Option<PathBuf>,
        /// Output CSV file
        #[arg(long, default_value = "facilities.csv")]
        output: PathBuf,
        /// Overpass interpreter endpoint
        #[arg(long, default_value = OVERPASS_URL)]
        endpoint: String,
    },
    /// Download an HDX population dataset (CSV or zipped CSV)
    Population {
        /// Resource path after `https://data.humdata.org/dataset/`, or a full URL
        resource: String,
        /// Where to store the downloaded file
        #[arg(long)]
        output: PathBuf,
    },
    /// List the CSV resources of a country's HDX datasets
    HdxSearch {
        /// Country name as used in HDX dataset titles (e.g., "peru")
        country: String,
        /// Dataset repository
        #[arg(long, default_value = POPULATION_REPOSITORY)]
        repository: String,
        /// CKAN search endpoint
        #[arg(long, default_value = HDX_SEARCH_URL)]
        endpoint: String,
    },
    /// Compute the OSRM distance and travel-time matrix between two
    /// facility tables
    Matrix {
        /// Origins CSV (`id`, `latitude`, `longitude`)
        #[arg(long)]
        origins: PathBuf,
        /// Destinations CSV (`id`, `latitude`, `longitude`)
        #[arg(long)]
        destinations: PathBuf,
        /// Routing TOML overriding the built-in OSRM settings
        #[arg(long)]
        routing_config: Option<PathBuf>,
        /// Origins per request
        #[arg(long, default_value = "100")]
        rows_per_request: usize,
        /// Output CSV, one row per origin and destination
        #[arg(long, default_value = "matrix.csv")]
        output: PathBuf,
    },
    /// Tile a region into H3 cells and save them as `GeoJSON`
    Grid {
        /// Region `GeoJSON` file
        #[arg(long)]
        region: PathBuf,
        /// H3 resolution (0-15)
        #[arg(long, default_value = "8")]
        resolution: u8,
        /// Output `GeoJSON` file
        #[arg(long, default_value = "cells.geojson")]
        output: PathBuf,
    },
    /// Run the accessibility pipeline: grid, join, nearest facility and
    /// optional routing
    Run(pipeline::RunArgs),
}

/// Reads a region from a `GeoJSON` file, using the file stem as its id.
pub(crate) fn read_region(path: &Path) -> Result<Region, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let id = path
        .file_stem()
        .map_or_else(|| "region".to_string(), |s| s.to_string_lossy().into_owned());
    Ok(region_from_geojson(&id, &text)?)
}

fn write_region(
    path: &Path,
    region: &Region,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = geojson::Geometry::new(geojson::Value::from(&region.geometry));
    let feature = serde_json::json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": { "id": region.id, "display_name": name },
    });
    std::fs::write(path, serde_json::to_string(&feature)?)?;
    log::info!("Wrote region to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = urban_access_cli_utils::init_logger();
    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Commands::Boundary {
            query,
            position,
            output,
            list,
            endpoint,
        } => {
            let client = http_client()?;
            let candidates = nominatim::search_boundaries(&client, &endpoint, &query).await?;

            if list {
                println!("{:<4} {:<6} {:<10} NAME", "POS", "RANK", "IMPORTANCE");
                println!("{}", "-".repeat(60));
                for c in &candidates {
                    println!(
                        "{:<4} {:<6} {:<10.4} {}",
                        c.rank,
                        c.place_rank.map_or_else(|| "-".to_string(), |r| r.to_string()),
                        c.importance.unwrap_or(0.0),
                        c.display_name
                    );
                }
                return Ok(());
            }

            let candidate = nominatim::select_candidate(candidates, &query, position)?;
            let name = candidate.display_name.clone();
            let id = output
                .file_stem()
                .map_or_else(|| query.clone(), |s| s.to_string_lossy().into_owned());
            write_region(&output, &candidate.into_region(id), &name)?;
        }
        Commands::Pois {
            region,
            kind,
            query,
            output,
            endpoint,
        } => {
            let region = read_region(&region)?;
            let bounds = region
                .bounds()
                .ok_or_else(|| format!("Region {} has no extent", region.id))?;
            let client = http_client()?;

            let facilities = if let Some(path) = query {
                let query = std::fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                let progress = IndicatifProgress::spinner(&multi, "Running Overpass query");
                let facilities = overpass::fetch_custom(&client, &endpoint, &query, &bounds).await?;
                progress.finish(format!("{} elements", facilities.len()));
                facilities
            } else {
                let kind: FacilityKind = kind.ok_or("--kind or --query is required")?.parse()?;
                let progress =
                    IndicatifProgress::spinner(&multi, &format!("Fetching {kind} facilities"));
                let facilities = overpass::fetch_facilities(&client, &endpoint, kind, &bounds).await?;
                progress.finish(format!("{} {kind} facilities", facilities.len()));
                facilities
            };

            let file = std::fs::File::create(&output)
                .map_err(|e| format!("Failed to create {}: {e}", output.display()))?;
            tables::write_facilities(file, &facilities)?;
            log::info!("Wrote {} facilities to {}", facilities.len(), output.display());
        }
        Commands::Population { resource, output } => {
            let progress = IndicatifProgress::spinner(&multi, "Downloading population data");
            let client = http_client()?;
            let table = population::download_population(&client, &resource, &output).await?;

            let column = table.population_column().unwrap_or("-").to_string();
            progress.finish(format!(
                "{} points, total {column} {:.0}",
                table.points.len(),
                table.total(&column)
            ));
        }
        Commands::HdxSearch {
            country,
            repository,
            endpoint,
        } => {
            let client = http_client()?;
            let resources = hdx::search_datasets(&client, &endpoint, &country, &repository).await?;

            println!("{:<12} {:>9} {:<40} NAME", "CREATED", "SIZE MB", "POPULATION");
            println!("{}", "-".repeat(80));
            for r in &resources {
                println!(
                    "{:<12} {:>9} {:<40} {}",
                    r.created.as_deref().unwrap_or("-"),
                    r.size_mb.map_or_else(|| "-".to_string(), |mb| format!("{mb:.2}")),
                    r.population.unwrap_or("-"),
                    r.name
                );
                println!("    {}", r.url);
            }
        }
        Commands::Matrix {
            origins,
            destinations,
            routing_config,
            rows_per_request,
            output,
        } => {
            let origins = tables::read_facilities_file(&origins)?;
            let destinations = tables::read_facilities_file(&destinations)?;
            let config = match &routing_config {
                Some(path) => RoutingConfig::load(path)?,
                None => RoutingConfig::default(),
            };
            let client = OsrmClient::from_config(&config)?;

            let locations = |items: &[Facility]| -> Vec<Coordinate> {
                items.iter().map(|f| f.location).collect()
            };
            let ids = |items: &[Facility]| -> Vec<String> {
                items.iter().map(|f| f.id.clone()).collect()
            };

            let progress = IndicatifProgress::spinner(
                &multi,
                &format!("Routing {} x {} matrix", origins.len(), destinations.len()),
            );
            let matrix = client
                .travel_matrix(
                    &config.profile,
                    &locations(&origins),
                    &locations(&destinations),
                    rows_per_request,
                )
                .await?;
            progress.finish(format!("{} x {} matrix", origins.len(), destinations.len()));

            write_matrix_file(&output, &ids(&origins), &ids(&destinations), &matrix)?;
        }
        Commands::Grid {
            region,
            resolution,
            output,
        } => {
            let region = read_region(&region)?;
            let cells = generate_cells(&region, resolution)?;
            let enriched: Vec<_> = cells
                .into_iter()
                .map(urban_access_geography_models::EnrichedCell::new)
                .collect();
            urban_access_accessibility::output::write_cells_geojson(&output, &enriched)?;
        }
        Commands::Run(args) => pipeline::run(args, &multi).await?,
    }

    log::info!("Done in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}
