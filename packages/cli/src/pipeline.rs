//! `run` subcommand: the full accessibility pipeline.
//!
//! Loads the region(s), population table and facility table, runs grid,
//! join and nearest-facility stages, optionally routes the matches through
//! OSRM, and writes the accessibility table plus an optional cell layer.
//! Zone attributes can be spread over the cells and the catchment measures
//! added to them.
//! Ctrl-C during routing cancels outstanding batches; their rows keep the
//! haversine approximation.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use tokio_util::sync::CancellationToken;
use urban_access_accessibility::output::{write_cells_geojson, write_records_file};
use urban_access_accessibility::region::merge_regions;
use urban_access_accessibility::measures::CatchmentOptions;
use urban_access_accessibility::{POI_COUNT, POPULATION, PipelineInputs, Report, analyze};
use urban_access_cli_utils::{IndicatifProgress, MultiProgress};
use urban_access_download::{population, tables};
use urban_access_geography_models::EnrichedCell;
use urban_access_grid::downsample;
use urban_access_routing::config::RoutingConfig;
use urban_access_routing::osrm::OsrmClient;
use urban_access_spatial::{filter_to_bounds, parse_area_features};

use crate::read_region;

#[derive(Args)]
pub struct RunArgs {
    /// Region `GeoJSON` file. Repeat to merge several regions into one.
    #[arg(long = "region", required = true)]
    regions: Vec<PathBuf>,
    /// Population CSV or zipped CSV (HDX format)
    #[arg(long)]
    population: PathBuf,
    /// Population column to sum (defaults to the first column named like
    /// "population")
    #[arg(long)]
    population_column: Option<String>,
    /// Facilities CSV (`id`, `latitude`, `longitude`, optional `kind`)
    #[arg(long)]
    facilities: PathBuf,
    /// H3 resolution of the grid (0-15)
    #[arg(long, default_value = "8")]
    resolution: u8,
    /// Route cell-to-facility pairs through the OSRM service
    #[arg(long)]
    route: bool,
    /// Routing TOML overriding the built-in OSRM settings
    #[arg(long)]
    routing_config: Option<PathBuf>,
    /// Output CSV of accessibility records
    #[arg(long, default_value = "accessibility.csv")]
    output: PathBuf,
    /// Output `GeoJSON` of enriched cells
    #[arg(long)]
    cells: Option<PathBuf>,
    /// Also write population and facility counts aggregated to this
    /// coarser resolution, next to the cell layer
    #[arg(long, requires = "cells")]
    coarse_resolution: Option<u8>,
    /// Zones `GeoJSON` whose numeric columns are spread over the cells by
    /// shared area
    #[arg(long, requires = "zone_column")]
    zones: Option<PathBuf>,
    /// Zone column to spread. Repeat for several columns
    #[arg(long = "zone-column")]
    zone_column: Vec<String>,
    /// Add the E2SFCA access index and the facility pressure per cell
    #[arg(long)]
    catchment: bool,
    /// Catchment radius in metres
    #[arg(long, default_value = "1250")]
    d0: f64,
    /// Supply per facility
    #[arg(long, default_value = "1")]
    weight: f64,
    /// Pressure buffer around each cell in metres
    #[arg(long, default_value = "1250")]
    buffer: f64,
}

pub async fn run(args: RunArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let regions = args
        .regions
        .iter()
        .map(|path| read_region(path))
        .collect::<Result<Vec<_>, _>>()?;
    let region = if regions.len() == 1 {
        regions.into_iter().next().ok_or("no region")?
    } else {
        let ids: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        let id = ids.join("+");
        merge_regions(id, &regions)?
    };
    let bounds = region
        .bounds()
        .ok_or_else(|| format!("Region {} has no extent", region.id))?;

    let table = population::read_population_file(&args.population)?;
    let column = match args.population_column {
        Some(column) => column,
        None => table
            .population_column()
            .ok_or("Population file has no value columns")?
            .to_string(),
    };
    let points = filter_to_bounds(&table.points, &bounds);
    log::info!(
        "Population: {} of {} points inside region bounds, summing '{column}'",
        points.len(),
        table.points.len()
    );

    let facilities = tables::read_facilities_file(&args.facilities)?;

    let zones = match &args.zones {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            parse_area_features(&text)
                .ok_or_else(|| format!("{} is not valid GeoJSON", path.display()))?
        }
        None => Vec::new(),
    };

    let analysis = analyze(&PipelineInputs {
        population: &points,
        population_attribute: &column,
        zones: &zones,
        zone_columns: &args.zone_column,
        catchment: args.catchment.then_some(CatchmentOptions {
            d0_meters: args.d0,
            weight: args.weight,
            buffer_meters: args.buffer,
        }),
        ..PipelineInputs::new(&region, args.resolution, &facilities)
    })?;
    log::info!(
        "Grid, join and nearest stages took {:.1}s",
        start.elapsed().as_secs_f64()
    );

    let report = if args.route {
        let config = match &args.routing_config {
            Some(path) => RoutingConfig::load(path)?,
            None => RoutingConfig::default(),
        };
        let client = OsrmClient::from_config(&config)?;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling outstanding routing batches");
                trigger.cancel();
            }
        });

        let progress = IndicatifProgress::batch_bar(multi, "Routing");
        analysis
            .route(&client, &config.enrich_options(), &cancel, &progress)
            .await
    } else {
        analysis.into_report()
    };

    summarize(&report);
    write_records_file(&args.output, &report.records)?;

    if let Some(path) = &args.cells {
        write_cells_geojson(path, &report.cells)?;

        if let Some(coarse) = args.coarse_resolution {
            let counts: Vec<EnrichedCell> = report
                .cells
                .iter()
                .map(|c| {
                    let mut cell = EnrichedCell::new(c.cell.clone());
                    for name in [POPULATION, POI_COUNT] {
                        cell.attributes.insert(name.to_string(), c.attribute(name));
                    }
                    cell
                })
                .collect();
            let coarse_cells = downsample(&counts, coarse)?;

            let stem = path
                .file_stem()
                .map_or_else(|| "cells".to_string(), |s| s.to_string_lossy().into_owned());
            let coarse_path = path.with_file_name(format!("{stem}_r{coarse}.geojson"));
            write_cells_geojson(&coarse_path, &coarse_cells)?;
        }
    }

    log::info!("Pipeline complete in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn summarize(report: &Report) {
    let population: f64 = report.cells.iter().map(|c| c.attribute(POPULATION)).sum();
    log::info!(
        "{} cells, population {population:.0} ({} samples outside the grid), {} facilities outside the grid",
        report.cells.len(),
        report.population_outliers,
        report.poi_outliers
    );

    if let Some(summary) = &report.enrichment {
        log::info!(
            "Routing: {}/{} pairs routed, {} of {} batches approximated{}",
            summary.routed_pairs,
            report.records.len(),
            summary.approximated_batches,
            summary.batches,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
    }
}
