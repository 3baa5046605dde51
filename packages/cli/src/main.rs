#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `safe_steps`: operator CLI for the geospatial risk engine.
//!
//! Every subcommand reads JSON input files and prints JSON to stdout.
//! Routing uses the Google Directions API (`GOOGLE_MAPS_API_KEY`) unless a
//! recorded response is supplied with `--routes`.

mod input;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use safe_steps_directions::{DirectionsProvider, GoogleDirections, TravelMode};
use safe_steps_grid::{GeoPoint, H3Grid, HexGrid};
use safe_steps_routing::{Engine, EngineConfig, ExitOptions, LogNotificationSink, RouteOptions};
use safe_steps_severity::timestamp::parse_timestamp_str;
use safe_steps_spatial::RegionIndex;

use crate::input::{
    CatalogSeverities, RecordedDirections, load_incidents, load_polygon, load_severity,
};

#[derive(Parser)]
#[command(name = "safe_steps", about = "SafeSteps geospatial risk engine")]
struct Cli {
    /// Engine configuration file (TOML). Defaults to the built-in config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cell containing a point, with its center and boundary
    Cell {
        /// Point as "lat,lng"
        #[arg(allow_hyphen_values = true)]
        point: GeoPoint,
        /// Grid resolution (defaults to the configured routing resolution)
        #[arg(long)]
        resolution: Option<u8>,
    },
    /// Score a JSON file of incident reports into per-cell severities
    Score {
        /// JSON array of `{ lat, lng, type, timestamp }` reports
        incidents: PathBuf,
        /// Reference time for decay (defaults to now)
        #[arg(long)]
        now: Option<String>,
        /// Grid resolution (defaults to the configured routing resolution)
        #[arg(long)]
        resolution: Option<u8>,
    },
    /// List the cells covering a polygon or a named region
    Cover {
        /// JSON array of `{ lat, lng }` vertices
        #[arg(long, conflicts_with = "region", required_unless_present = "region")]
        polygon: Option<PathBuf>,
        /// Region name from the `--regions` catalog
        #[arg(long, requires = "regions")]
        region: Option<String>,
        /// Region catalog (`GeoJSON` `FeatureCollection`)
        #[arg(long)]
        regions: Option<PathBuf>,
        /// Grid resolution (defaults to the configured routing resolution)
        #[arg(long)]
        resolution: Option<u8>,
    },
    /// Find the safest route between two points
    Route {
        /// Origin as "lat,lng"
        #[arg(long, allow_hyphen_values = true)]
        from: GeoPoint,
        /// Destination as "lat,lng"
        #[arg(long, allow_hyphen_values = true)]
        to: GeoPoint,
        #[command(flatten)]
        sources: Sources,
        /// Regions to preload (repeatable). Defaults to every catalog region
        /// the routes cross.
        #[arg(long = "region")]
        region_names: Vec<String>,
    },
    /// Find the nearest safe cell and a route to it
    Exit {
        /// Current position as "lat,lng"
        #[arg(long, allow_hyphen_values = true)]
        at: GeoPoint,
        #[command(flatten)]
        sources: Sources,
        /// Score of the current cell at the previous check
        #[arg(long)]
        previous: Option<f64>,
        /// Alert destination; alerts are logged, not delivered
        #[arg(long)]
        notify: Option<String>,
        /// City name for the alert text
        #[arg(long)]
        city: Option<String>,
    },
}

/// Data sources shared by `route` and `exit`.
#[derive(clap::Args)]
struct Sources {
    /// JSON object mapping cell handles to severity scores
    #[arg(long)]
    severity: PathBuf,
    /// Region catalog (`GeoJSON` `FeatureCollection`)
    #[arg(long)]
    regions: Option<PathBuf>,
    /// Recorded Google Directions response to replay instead of calling the API
    #[arg(long)]
    routes: Option<PathBuf>,
    /// Travel mode (walking, driving, bicycling, transit)
    #[arg(long)]
    mode: Option<TravelMode>,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => {
            log::info!("Loading engine config from {}", path.display());
            EngineConfig::load(path)?
        }
        None => EngineConfig::default_config()?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn load_regions(path: Option<&Path>) -> Result<Option<Arc<RegionIndex>>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let index = RegionIndex::load(path)?;
    log::info!("Loaded {} regions from {}", index.len(), path.display());
    Ok(Some(Arc::new(index)))
}

fn build_engine(
    config: EngineConfig,
    sources: &Sources,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let grid: Arc<dyn HexGrid> = Arc::new(H3Grid::new());
    let scores = load_severity(&sources.severity)?;
    log::info!("Loaded {} scored cells", scores.len());

    let directions: Arc<dyn DirectionsProvider> = match &sources.routes {
        Some(path) => Arc::new(RecordedDirections::load(path)?),
        None => Arc::new(GoogleDirections::from_env()?),
    };

    let mut engine = Engine::new(config, grid.clone(), directions, Arc::new(scores.clone()))?;

    if let Some(regions) = load_regions(sources.regions.as_deref())? {
        engine = engine
            .with_regions(regions.clone())
            .with_bulk_provider(Arc::new(CatalogSeverities::new(regions, grid, scores)));
    }

    Ok(engine)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let grid = H3Grid::new();

    match cli.command {
        Commands::Cell { point, resolution } => {
            let resolution = resolution.unwrap_or(config.routing.resolution);
            let cell = grid.cell_for_point(point, resolution)?;
            print_json(&serde_json::json!({
                "cell": cell,
                "resolution": resolution,
                "center": grid.cell_to_center(cell)?,
                "boundary": grid.cell_boundary(cell)?,
            }))?;
        }
        Commands::Score {
            incidents,
            now,
            resolution,
        } => {
            let resolution = resolution.unwrap_or(config.routing.resolution);
            let now = match now {
                Some(raw) => parse_timestamp_str(&raw)
                    .ok_or_else(|| format!("Unrecognized --now timestamp: {raw}"))?,
                None => chrono::Utc::now(),
            };

            let (incidents, skipped) = load_incidents(&incidents, &grid, resolution)?;
            log::info!(
                "Scoring {} incidents ({skipped} skipped) as of {now}",
                incidents.len()
            );

            let scores = safe_steps_severity::score_cells(&incidents, now, &config.severity);
            let scored: Vec<_> = scores
                .iter()
                .map(|(cell, score)| config.risk_bands.scored_cell(cell, score))
                .collect();
            print_json(&scored)?;
        }
        Commands::Cover {
            polygon,
            region,
            regions,
            resolution,
        } => {
            let resolution = resolution.unwrap_or(config.routing.resolution);
            let rings = match (polygon, region) {
                (Some(path), _) => vec![load_polygon(&path)?],
                (None, Some(name)) => {
                    let index = load_regions(regions.as_deref())?
                        .ok_or("--region requires --regions")?;
                    let rings = index.region_rings(&name);
                    if rings.is_empty() {
                        return Err(format!("Unknown region: {name}").into());
                    }
                    rings
                }
                (None, None) => return Err("either --polygon or --region is required".into()),
            };

            let mut cells = BTreeSet::new();
            for ring in &rings {
                cells.extend(grid.cells_covering_polygon(ring, resolution)?);
            }
            log::info!("{} cells cover {} ring(s)", cells.len(), rings.len());
            print_json(&cells)?;
        }
        Commands::Route {
            from,
            to,
            sources,
            region_names,
        } => {
            let engine = build_engine(config, &sources)?;
            let options = RouteOptions {
                regions: (!region_names.is_empty()).then_some(region_names),
                mode: sources.mode,
            };
            let selection = engine.safest_route(from, to, &options).await?;
            print_json(&selection)?;
        }
        Commands::Exit {
            at,
            sources,
            previous,
            notify,
            city,
        } => {
            let engine = build_engine(config, &sources)?.with_notifier(Arc::new(LogNotificationSink));
            let options = ExitOptions {
                previous_score: previous,
                alert_destination: notify,
                city,
                mode: sources.mode,
            };
            let outcome = engine.exit_to_safety(at, &options).await?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}
