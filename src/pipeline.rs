//! Batch runs: raw export text to statistics snapshot, and rides to edge usage.

use anyhow::{Context, Result, bail, ensure};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::aggregate::{AggregationConfig, AggregationState, StatisticsSnapshot};
use crate::endpoints::{RideEndpoints, resolve_endpoints};
use crate::parser::{DEFAULT_ENVELOPE_KEY, ExportFormat, extract_objects};
use crate::ride::{DEFAULT_PARAMETER_KEY, RejectionCounts, Ride, project_ride};
use crate::routing::{RoadGraph, RouteMapper, RouteMapperConfig, RouteUsage};
use crate::stations::StationResolver;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub envelope_key: String,
    pub parameter_key: String,
    pub aggregation: AggregationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            envelope_key: DEFAULT_ENVELOPE_KEY.to_string(),
            parameter_key: DEFAULT_PARAMETER_KEY.to_string(),
            aggregation: AggregationConfig::default(),
        }
    }
}

/// Rides projected from one export, with extraction and rejection counts.
#[derive(Debug)]
pub struct IngestedRides {
    pub format: ExportFormat,
    pub extracted: usize,
    pub parse_errors: usize,
    pub rejections: RejectionCounts,
    pub rides: Vec<Ride>,
}

/// Result of a statistics run.
#[derive(Debug, Serialize)]
pub struct StatsRun {
    pub format: ExportFormat,
    pub extracted: usize,
    pub parse_errors: usize,
    pub rejections: RejectionCounts,
    pub snapshot: StatisticsSnapshot,
}

pub fn read_export(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read export {}", path.display()))
}

/// Extracts and projects every ride of an export.
///
/// # Errors
///
/// Fails when the text is blank, holds no ride object, or none of its
/// objects projects to a ride. Malformed objects and rejected rides are
/// otherwise only counted.
pub fn ingest_text(text: &str, config: &PipelineConfig) -> Result<IngestedRides> {
    if text.trim().is_empty() {
        bail!("export is empty");
    }

    let extraction = extract_objects(text, &config.envelope_key);
    ensure!(
        extraction.extracted() > 0,
        "no ride records found in export ({} parse errors)",
        extraction.parse_errors
    );

    let mut rejections = RejectionCounts::default();
    let mut rides = Vec::with_capacity(extraction.extracted());

    for (i, raw) in extraction.objects.iter().enumerate() {
        match project_ride(raw, &config.parameter_key) {
            Ok(ride) => rides.push(ride),
            Err(reason) => {
                debug!(index = i, %reason, "Ride rejected");
                rejections.record(&reason);
            }
        }
    }

    info!(
        format = ?extraction.format,
        extracted = extraction.extracted(),
        parse_errors = extraction.parse_errors,
        rejected = rejections.total(),
        rides = rides.len(),
        "Export ingested"
    );
    ensure!(
        !rides.is_empty(),
        "all {} extracted records were rejected",
        extraction.extracted()
    );

    Ok(IngestedRides {
        format: extraction.format,
        extracted: extraction.extracted(),
        parse_errors: extraction.parse_errors,
        rejections,
        rides,
    })
}

/// Aggregates already-ingested rides into a labelled snapshot.
///
/// # Errors
///
/// Fails when no ride could be counted.
pub fn aggregate_rides(
    ingested: &IngestedRides,
    config: &PipelineConfig,
    resolver: &impl StationResolver,
) -> Result<StatsRun> {
    let mut state = AggregationState::new(config.aggregation.clone());
    let mut rejections = ingested.rejections.clone();

    for ride in &ingested.rides {
        if let Err(reason) = state.ingest(ride) {
            warn!(%reason, start = %ride.start_time, "Ride excluded from aggregates");
            rejections.record(&reason);
        }
    }

    if state.rides_counted() == 0 {
        bail!(
            "no ride could be counted ({} extracted, {} parse errors, {} rejected)",
            ingested.extracted,
            ingested.parse_errors,
            rejections.total()
        );
    }

    let mut snapshot = state.finalize();
    snapshot.label_stations(resolver);

    Ok(StatsRun {
        format: ingested.format,
        extracted: ingested.extracted,
        parse_errors: ingested.parse_errors,
        rejections,
        snapshot,
    })
}

#[tracing::instrument(skip_all, fields(bytes = text.len()))]
pub fn run_stats(
    text: &str,
    config: &PipelineConfig,
    resolver: &impl StationResolver,
) -> Result<StatsRun> {
    let ingested = ingest_text(text, config)?;
    aggregate_rides(&ingested, config, resolver)
}

/// Maps rides onto the road graph via their stations' coordinates.
#[tracing::instrument(skip_all, fields(rides = rides.len()))]
pub fn run_routes(
    rides: &[Ride],
    resolver: &impl StationResolver,
    graph: &RoadGraph,
    config: RouteMapperConfig,
) -> Result<RouteUsage> {
    if rides.is_empty() {
        bail!("no rides to map");
    }

    let resolved = resolve_endpoints(rides, resolver);
    if resolved.unresolved > 0 {
        warn!(
            unresolved = resolved.unresolved,
            "Rides without station coordinates skipped"
        );
    }

    let mut mapper = RouteMapper::new(graph, config);
    mapper.record_unresolved(resolved.unresolved);
    mapper.map_rides(&resolved.endpoints);
    Ok(mapper.finalize())
}

/// Maps rides given directly as coordinates.
pub fn run_routes_from_endpoints(
    endpoints: &[RideEndpoints],
    graph: &RoadGraph,
    config: RouteMapperConfig,
) -> Result<RouteUsage> {
    if endpoints.is_empty() {
        bail!("no ride endpoints to map");
    }

    let mut mapper = RouteMapper::new(graph, config);
    mapper.map_rides(endpoints);
    Ok(mapper.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::StationDirectory;

    #[test]
    fn test_blank_export_is_fatal() {
        assert!(ingest_text("  \n", &PipelineConfig::default()).is_err());
    }

    #[test]
    fn test_no_extracted_objects_is_fatal() {
        let result = ingest_text(
            "this export has no ride objects at all",
            &PipelineConfig::default(),
        );
        assert!(result.is_err());

        let only_broken = ingest_text(r#"{"a": oops} {"b": 2"#, &PipelineConfig::default());
        let err = only_broken.err().unwrap();
        assert!(err.to_string().contains("2 parse errors"));
    }

    #[test]
    fn test_all_rejected_is_fatal() {
        let text = r#"[1, 2] {"startDate": "2024-01-01T10:00:00Z"}"#;
        assert!(ingest_text(text, &PipelineConfig::default()).is_err());
    }

    #[test]
    fn test_no_countable_ride_is_fatal() {
        let text = r#"{"startDate": "bad", "endDate": "2024-01-01T00:00:00Z"}"#;
        let result = run_stats(text, &PipelineConfig::default(), &StationDirectory::default());

        assert!(result.is_err());
    }

    #[test]
    fn test_negative_duration_counted_as_rejection() {
        let text = r#"
            {"startDate": "2024-01-01T10:00:00Z", "endDate": "2024-01-01T10:05:00Z"},
            {"startDate": "2024-01-01T10:00:00Z", "endDate": "2024-01-01T09:00:00Z"}
        "#;
        let run = run_stats(text, &PipelineConfig::default(), &StationDirectory::default()).unwrap();

        assert_eq!(run.snapshot.rides_counted, 1);
        assert_eq!(run.rejections.negative_duration, 1);
        assert_eq!(run.extracted, 2);
    }

    #[test]
    fn test_empty_endpoints_are_fatal() {
        let doc = serde_json::from_value(serde_json::json!({
            "nodes": [{"id": 1, "lat": 0.0, "lon": 0.0}],
            "edges": []
        }))
        .unwrap();
        let graph = RoadGraph::from_document(doc).unwrap();

        assert!(run_routes_from_endpoints(&[], &graph, RouteMapperConfig::default()).is_err());
        assert!(
            run_routes(&[], &StationDirectory::default(), &graph, RouteMapperConfig::default())
                .is_err()
        );
    }
}
