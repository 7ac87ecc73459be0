//! Maps rides onto shortest paths of a road graph and counts edge usage.
//!
//! Each ride only reads the static [`RoadGraph`], so rides are routed in
//! parallel; per-worker [`EdgeUsageMap`]s are merged by summing per edge.

pub mod graph;
pub mod path;
pub mod usage;

pub use graph::{NodeId, RoadGraph};
pub use path::PathError;
pub use usage::{EdgeUsage, EdgeUsageMap, feature_collection};

use rayon::prelude::*;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::endpoints::RideEndpoints;

#[derive(Debug, Clone)]
pub struct RouteMapperConfig {
    /// Per-ride budget for the path search. Rides that exceed it are
    /// skipped like unreachable ones.
    pub search_timeout: Option<Duration>,
}

impl Default for RouteMapperConfig {
    fn default() -> Self {
        Self {
            search_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Ride counts by routing outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingReport {
    pub mapped: usize,
    pub same_node: usize,
    pub unresolved_station: usize,
    pub unreachable: usize,
    pub timed_out: usize,
}

impl MappingReport {
    pub fn skipped(&self) -> usize {
        self.unresolved_station + self.unreachable + self.timed_out
    }

    pub fn merge(&mut self, other: &MappingReport) {
        self.mapped += other.mapped;
        self.same_node += other.same_node;
        self.unresolved_station += other.unresolved_station;
        self.unreachable += other.unreachable;
        self.timed_out += other.timed_out;
    }
}

/// Frozen output of a mapping run.
#[derive(Debug)]
pub struct RouteUsage {
    pub edges: Vec<EdgeUsage>,
    pub report: MappingReport,
    pub crs: String,
}

impl RouteUsage {
    pub fn to_feature_collection(&self) -> geojson::FeatureCollection {
        feature_collection(&self.edges, &self.crs)
    }
}

/// Accumulates edge usage for one run over a borrowed graph.
pub struct RouteMapper<'g> {
    graph: &'g RoadGraph,
    config: RouteMapperConfig,
    usage: EdgeUsageMap,
    report: MappingReport,
}

impl<'g> RouteMapper<'g> {
    pub fn new(graph: &'g RoadGraph, config: RouteMapperConfig) -> Self {
        Self {
            graph,
            config,
            usage: EdgeUsageMap::default(),
            report: MappingReport::default(),
        }
    }

    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<NodeId> {
        self.graph.nearest_node(lat, lon)
    }

    pub fn shortest_path(&self, origin: NodeId, dest: NodeId) -> Result<Vec<NodeId>, PathError> {
        self.graph
            .shortest_path(origin, dest, deadline(&self.config))
    }

    pub fn accumulate(&mut self, path: &[NodeId]) {
        self.usage.accumulate(path);
    }

    /// Counts rides dropped upstream because a station had no coordinates.
    pub fn record_unresolved(&mut self, rides: usize) {
        self.report.unresolved_station += rides;
    }

    pub fn map_ride(&mut self, ride: &RideEndpoints) {
        route_one(
            self.graph,
            &self.config,
            ride,
            &mut self.usage,
            &mut self.report,
        );
    }

    /// Routes every ride in parallel and merges the partial counts.
    #[tracing::instrument(skip_all, fields(rides = rides.len()))]
    pub fn map_rides(&mut self, rides: &[RideEndpoints]) {
        let graph = self.graph;
        let config = &self.config;

        let (usage, report) = rides
            .par_iter()
            .fold(
                || (EdgeUsageMap::default(), MappingReport::default()),
                |(mut usage, mut report), ride| {
                    route_one(graph, config, ride, &mut usage, &mut report);
                    (usage, report)
                },
            )
            .reduce(
                || (EdgeUsageMap::default(), MappingReport::default()),
                |(mut usage, mut report), (other_usage, other_report)| {
                    usage.merge(other_usage);
                    report.merge(&other_report);
                    (usage, report)
                },
            );

        info!(
            mapped = report.mapped,
            same_node = report.same_node,
            unreachable = report.unreachable,
            timed_out = report.timed_out,
            "Rides mapped onto road graph"
        );

        self.usage.merge(usage);
        self.report.merge(&report);
    }

    pub fn usage(&self) -> &EdgeUsageMap {
        &self.usage
    }

    pub fn report(&self) -> &MappingReport {
        &self.report
    }

    pub fn finalize(self) -> RouteUsage {
        RouteUsage {
            edges: self.usage.freeze(self.graph),
            report: self.report,
            crs: self.graph.crs().to_string(),
        }
    }
}

fn deadline(config: &RouteMapperConfig) -> Option<Instant> {
    config.search_timeout.map(|t| Instant::now() + t)
}

fn route_one(
    graph: &RoadGraph,
    config: &RouteMapperConfig,
    ride: &RideEndpoints,
    usage: &mut EdgeUsageMap,
    report: &mut MappingReport,
) {
    let (Some(origin), Some(dest)) = (
        graph.nearest_node(ride.lat_start, ride.lon_start),
        graph.nearest_node(ride.lat_end, ride.lon_end),
    ) else {
        report.unreachable += 1;
        return;
    };

    match graph.shortest_path(origin, dest, deadline(config)) {
        Ok(path) if path.len() < 2 => report.same_node += 1,
        Ok(path) => {
            usage.accumulate(&path);
            report.mapped += 1;
        }
        Err(PathError::TimedOut) => {
            debug!(origin, dest, "Path search timed out, ride skipped");
            report.timed_out += 1;
        }
        Err(e) => {
            debug!(origin, dest, error = %e, "No route, ride skipped");
            report.unreachable += 1;
        }
    }
}
