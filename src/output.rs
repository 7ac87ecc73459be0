//! Output formatting and persistence for run results.
//!
//! Supports pretty-printing, JSON files, GeoJSON edge usage and a CSV run log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::parser::ExportFormat;
use crate::pipeline::StatsRun;
use crate::routing::RouteUsage;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One row of the run log.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub format: ExportFormat,
    pub extracted: usize,
    pub parse_errors: usize,
    pub rejected: usize,
    pub rides_counted: usize,
    pub total_bikes: usize,
    pub boomerang_trips: usize,
    pub total_distance_km: f64,
    pub avg_duration_minutes: f64,
    pub avg_speed_kmh: f64,
}

impl RunSummary {
    pub fn from_run(source: &str, run: &StatsRun) -> Self {
        let s = &run.snapshot;
        RunSummary {
            timestamp: Utc::now(),
            source: source.to_string(),
            format: run.format,
            extracted: run.extracted,
            parse_errors: run.parse_errors,
            rejected: run.rejections.total(),
            rides_counted: s.rides_counted,
            total_bikes: s.total_bikes,
            boomerang_trips: s.boomerang_trips,
            total_distance_km: s.distance_total_meters / 1000.0,
            avg_duration_minutes: s.averages.duration_minutes,
            avg_speed_kmh: s.averages.speed_kmh,
        }
    }
}

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty(value: &impl std::fmt::Debug) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes a value as pretty-printed JSON, replacing the file.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Writes edge usage as a GeoJSON feature collection.
pub fn write_geojson(path: &Path, usage: &RouteUsage) -> Result<()> {
    let collection = usage.to_feature_collection();
    std::fs::write(path, serde_json::to_string(&collection)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), features = usage.edges.len(), crs = %usage.crs, "GeoJSON written");
    Ok(())
}

/// Appends a [`RunSummary`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, summary: &RunSummary) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(summary)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, run_stats};
    use crate::stations::StationDirectory;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn sample_run() -> StatsRun {
        let text = r#"{"startDate": "2024-01-01T10:00:00Z", "endDate": "2024-01-01T10:05:00Z",
                      "parameter3": {"DISTANCE": 1200}}"#;
        run_stats(text, &PipelineConfig::default(), &StationDirectory::default()).unwrap()
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&sample_run());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&sample_run()).unwrap();
    }

    #[test]
    fn test_write_json_snapshot() {
        let path = temp_path("velo_usage_test_snapshot.json");
        write_json(&path, &sample_run()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["snapshot"]["rides_counted"], 1);
        assert_eq!(value["format"], "concatenated");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("velo_usage_test_header.csv");
        let _ = fs::remove_file(&path);

        let summary = RunSummary::from_run("export.txt", &sample_run());
        append_record(&path, &summary).unwrap();
        append_record(&path, &summary).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_summary_values() {
        let summary = RunSummary::from_run("export.txt", &sample_run());

        assert_eq!(summary.rides_counted, 1);
        assert_eq!(summary.total_distance_km, 1.2);
        assert_eq!(summary.avg_duration_minutes, 5.0);
    }
}
