//! taxi-od CLI - batch OD analysis of taxi probe exports
//!
//! Usage:
//!   taxi-od analyze <input.csv> [--regions <file>] [--config <file>] [--output <dir>]
//!
//! Reads a probe CSV, reconstructs passenger trips and writes every result
//! table as CSV (plus a JSON summary) into the output directory.

use clap::{Parser, Subcommand};
use log::{debug, error, info};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use taxi_od::{
    io, AnalysisConfig, AnalysisReport, Analyzer, CleaningStats, ExtractionStats, OdError,
    TripSummary,
};

#[derive(Parser)]
#[command(name = "taxi-od")]
#[command(about = "Origin-destination analysis of taxi GPS probe data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract trips and write hotspot, temporal and region tables
    Analyze {
        /// Probe CSV (id,time,long,lati,status,speed[,head])
        input: PathBuf,

        /// GeoJSON FeatureCollection of region polygons
        #[arg(short, long)]
        regions: Option<PathBuf>,

        /// JSON configuration file; unspecified values keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for result tables
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Override the DBSCAN radius in kilometers
        #[arg(long)]
        eps_km: Option<f64>,

        /// Override the DBSCAN minimum neighbourhood size
        #[arg(long)]
        min_samples: Option<usize>,

        /// Also write per-minute heatmap frames
        #[arg(long)]
        heatmap: bool,
    },
}

/// Counts written to summary.json.
#[derive(Serialize)]
struct RunSummary<'a> {
    cleaning: &'a CleaningStats,
    extraction: &'a ExtractionStats,
    trips: &'a TripSummary,
    hotspot_count: usize,
    noise_pickups: usize,
    region_pairs: Option<usize>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Analyze {
            input,
            regions,
            config,
            output,
            eps_km,
            min_samples,
            heatmap,
        } => run_analyze(
            &input,
            regions.as_deref(),
            config.as_deref(),
            &output,
            eps_km,
            min_samples,
            heatmap,
        ),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&Path>,
    eps_km: Option<f64>,
    min_samples: Option<usize>,
) -> Result<AnalysisConfig, OdError> {
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|e| OdError::io(path, e))?;
            AnalysisConfig::from_json(&json)?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(eps) = eps_km {
        config.clustering.eps_km = eps;
    }
    if let Some(n) = min_samples {
        config.clustering.min_samples = n;
    }
    Ok(config)
}

fn run_analyze(
    input: &Path,
    regions: Option<&Path>,
    config: Option<&Path>,
    output: &Path,
    eps_km: Option<f64>,
    min_samples: Option<usize>,
    heatmap: bool,
) -> Result<(), OdError> {
    let config = load_config(config, eps_km, min_samples)?;
    debug!("Configuration: {:?}", config);

    let region_index = regions
        .map(|path| io::read_regions(path, config.region_property()))
        .transpose()?;

    let mut analyzer = Analyzer::new(config)?.with_heatmap(heatmap);
    if let Some(index) = region_index {
        analyzer = analyzer.with_regions(index);
    }

    let report = analyzer.analyze_path(input)?;
    write_report(&report, output)?;

    println!("\n{}", "=".repeat(60));
    println!("RESULTS: {} trips, {} hotspots", report.trips.len(), report.hotspots.cluster_count);
    println!("{}", "=".repeat(60));
    if let (Some(km), Some(min), Some(speed)) = (
        report.summary.mean_distance_km,
        report.summary.mean_duration_minutes,
        report.summary.overall_speed_kmh,
    ) {
        println!("  Mean distance: {:.2} km", km);
        println!("  Mean duration: {:.1} min", min);
        println!("  Overall speed: {:.1} km/h", speed);
    }
    println!("  Output: {}", output.display());

    Ok(())
}

fn write_report(report: &AnalysisReport, output: &Path) -> Result<(), OdError> {
    fs::create_dir_all(output).map_err(|e| OdError::io(output, e))?;

    io::write_csv(&output.join("od_trips.csv"), &report.trips)?;
    io::write_csv(&output.join("hotspots.csv"), &report.hotspots.hotspots)?;
    io::write_csv(&output.join("time_distribution.csv"), &report.time_distribution)?;
    io::write_csv(&output.join("hourly_speed.csv"), &report.hourly_speed)?;
    io::write_csv(&output.join("occupied_vehicles.csv"), &report.occupancy)?;
    io::write_csv(&output.join("distance_histogram.csv"), &report.distance_histogram)?;
    io::write_csv(&output.join("hourly_pickups.csv"), &report.hourly_pickups)?;

    if let Some(regions) = &report.regions {
        io::write_csv(&output.join("region_pairs.csv"), &regions.pairs)?;
        io::write_csv(&output.join("hourly_region_demand.csv"), &regions.hourly)?;
    }
    if let Some(frames) = &report.heatmap {
        io::write_json(&output.join("heatmap.json"), frames)?;
    }

    let summary = RunSummary {
        cleaning: &report.cleaning,
        extraction: &report.extraction,
        trips: &report.summary,
        hotspot_count: report.hotspots.cluster_count,
        noise_pickups: report.hotspots.noise_count,
        region_pairs: report.regions.as_ref().map(|r| r.pairs.len()),
    };
    io::write_json(&output.join("summary.json"), &summary)?;

    info!("Wrote results to {}", output.display());
    Ok(())
}
