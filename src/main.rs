//! CLI entry point for velo_usage.
//!
//! Provides subcommands for computing ride statistics from a bike-share
//! export, exporting ride endpoint coordinates, and mapping rides onto a road
//! graph as GeoJSON edge usage.

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use velo_usage::{
    aggregate::NegativeDurationPolicy,
    endpoints::{read_csv, resolve_endpoints, write_csv},
    fetch::BasicClient,
    output::{RunSummary, append_record, print_pretty, write_geojson, write_json},
    pipeline::{
        PipelineConfig, aggregate_rides, ingest_text, read_export, run_routes,
        run_routes_from_endpoints,
    },
    routing::{RoadGraph, RouteMapperConfig},
    stations::{FileStationSource, GbfsStationSource, StationDirectory, load_directory},
};

const DEFAULT_STATIONS_URL: &str =
    "https://velib-metropole-opendata.smovengo.cloud/opendata/Velib_Metropole/station_information.json";

#[derive(Parser)]
#[command(name = "velo_usage")]
#[command(about = "Ride statistics and road usage from bike-share exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the statistics snapshot of an export
    Stats {
        #[command(flatten)]
        export: ExportArgs,

        #[command(flatten)]
        stations: StationArgs,

        /// JSON file to write the snapshot to
        #[arg(short, long, default_value = "output/statistics.json")]
        output: PathBuf,

        /// Optional CSV run log to append a summary row to
        #[arg(long, env = "VELO_SUMMARY_CSV")]
        summary_csv: Option<PathBuf>,

        /// Handling of rides that end before they start
        #[arg(long, value_enum, default_value_t = NegativeDurations::Reject)]
        negative_durations: NegativeDurations,
    },
    /// Write the station coordinates of every ride to CSV
    Endpoints {
        #[command(flatten)]
        export: ExportArgs,

        #[command(flatten)]
        stations: StationArgs,

        /// CSV file to write
        #[arg(short, long, default_value = "data/coordinates.csv")]
        output: PathBuf,
    },
    /// Map rides onto shortest paths of a road graph
    Routes {
        /// Road graph JSON document
        #[arg(short, long, env = "VELO_ROAD_GRAPH")]
        graph: PathBuf,

        /// Ride endpoints CSV, used instead of an export
        #[arg(long, conflicts_with = "input")]
        endpoints_csv: Option<PathBuf>,

        #[command(flatten)]
        export: OptionalExportArgs,

        #[command(flatten)]
        stations: StationArgs,

        /// GeoJSON file to write
        #[arg(short, long, default_value = "data/edge_usage.geojson")]
        output: PathBuf,

        /// Per-ride path search budget in milliseconds (0 = unbounded)
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[derive(Args)]
struct ExportArgs {
    /// Raw export file
    #[arg(value_name = "EXPORT")]
    input: PathBuf,

    /// Envelope field holding the ride array
    #[arg(long, env = "VELO_ENVELOPE_KEY", default_value = "walletOperations")]
    envelope_key: String,

    /// Nested parameter group of each ride
    #[arg(long, env = "VELO_PARAMETER_KEY", default_value = "parameter3")]
    parameter_key: String,
}

#[derive(Args)]
struct OptionalExportArgs {
    /// Raw export file
    #[arg(value_name = "EXPORT", required_unless_present = "endpoints_csv")]
    input: Option<PathBuf>,

    #[arg(long, env = "VELO_ENVELOPE_KEY", default_value = "walletOperations")]
    envelope_key: String,

    #[arg(long, env = "VELO_PARAMETER_KEY", default_value = "parameter3")]
    parameter_key: String,
}

#[derive(Args)]
struct StationArgs {
    /// GBFS station_information.json URL
    #[arg(long, env = "VELO_STATIONS_URL", default_value = DEFAULT_STATIONS_URL)]
    stations_url: String,

    /// Local station_information.json, used instead of the URL
    #[arg(long, env = "VELO_STATIONS_FILE")]
    stations_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum NegativeDurations {
    Reject,
    Clamp,
}

impl From<NegativeDurations> for NegativeDurationPolicy {
    fn from(value: NegativeDurations) -> Self {
        match value {
            NegativeDurations::Reject => NegativeDurationPolicy::Reject,
            NegativeDurations::Clamp => NegativeDurationPolicy::ClampToZero,
        }
    }
}

impl StationArgs {
    /// Batch-loads station metadata once. Failures degrade to id labels.
    async fn load(&self) -> Result<StationDirectory> {
        let directory = match &self.stations_file {
            Some(path) => load_directory(&FileStationSource { path: path.clone() }).await,
            None => {
                let client = BasicClient::new(Duration::from_secs(30))?;
                load_directory(&GbfsStationSource::new(client, self.stations_url.clone())).await
            }
        };
        Ok(directory)
    }
}

fn pipeline_config(envelope_key: &str, parameter_key: &str) -> PipelineConfig {
    PipelineConfig {
        envelope_key: envelope_key.to_string(),
        parameter_key: parameter_key.to_string(),
        ..Default::default()
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/velo_usage.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("velo_usage.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stats {
            export,
            stations,
            output,
            summary_csv,
            negative_durations,
        } => {
            let mut config = pipeline_config(&export.envelope_key, &export.parameter_key);
            config.aggregation.negative_duration = negative_durations.into();

            let text = read_export(&export.input)?;
            let ingested = ingest_text(&text, &config)?;
            let directory = stations.load().await?;
            let run = aggregate_rides(&ingested, &config, &directory)?;

            print_pretty(&run.snapshot);
            ensure_parent(&output)?;
            write_json(&output, &run)?;

            if let Some(path) = summary_csv {
                let source = export.input.display().to_string();
                append_record(&path, &RunSummary::from_run(&source, &run))?;
            }

            info!(
                rides = run.snapshot.rides_counted,
                parse_errors = run.parse_errors,
                rejected = run.rejections.total(),
                output = %output.display(),
                "Statistics written"
            );
        }
        Commands::Endpoints {
            export,
            stations,
            output,
        } => {
            let config = pipeline_config(&export.envelope_key, &export.parameter_key);
            let ingested = ingest_text(&read_export(&export.input)?, &config)?;
            let directory = stations.load().await?;

            let resolved = resolve_endpoints(&ingested.rides, &directory);
            ensure_parent(&output)?;
            write_csv(&output, &resolved.endpoints)?;

            info!(
                written = resolved.endpoints.len(),
                unresolved = resolved.unresolved,
                output = %output.display(),
                "Endpoints written"
            );
        }
        Commands::Routes {
            graph,
            endpoints_csv,
            export,
            stations,
            output,
            timeout_ms,
        } => {
            let road_graph = RoadGraph::load(&graph)?;
            let mapper_config = RouteMapperConfig {
                search_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            };

            let usage = match (endpoints_csv, export.input) {
                (Some(csv_path), _) => {
                    let endpoints = read_csv(&csv_path)?;
                    run_routes_from_endpoints(&endpoints, &road_graph, mapper_config)?
                }
                (None, Some(input)) => {
                    let config = pipeline_config(&export.envelope_key, &export.parameter_key);
                    let ingested = ingest_text(&read_export(&input)?, &config)?;
                    let directory = stations.load().await?;
                    run_routes(&ingested.rides, &directory, &road_graph, mapper_config)?
                }
                (None, None) => anyhow::bail!("either an export or --endpoints-csv is required"),
            };

            ensure_parent(&output)?;
            write_geojson(&output, &usage)?;

            info!(
                edges = usage.edges.len(),
                mapped = usage.report.mapped,
                skipped = usage.report.skipped(),
                "Edge usage written"
            );
        }
    }

    Ok(())
}
