use velo_usage::parser::ExportFormat;
use velo_usage::pipeline::{PipelineConfig, ingest_text, run_routes, run_stats};
use velo_usage::routing::{RoadGraph, RouteMapperConfig};
use velo_usage::routing::graph::GraphDocument;
use velo_usage::stations::{StationDirectory, StationResolver, parse_station_information};

const CONCATENATED: &str = include_str!("fixtures/export_concatenated.txt");
const ENVELOPE: &str = include_str!("fixtures/export_envelope.json");
const STATIONS: &str = include_str!("fixtures/stations.json");
const ROAD_GRAPH: &str = include_str!("fixtures/road_graph.json");

fn directory() -> StationDirectory {
    StationDirectory::new(parse_station_information(STATIONS.as_bytes()).expect("stations"))
}

fn road_graph() -> RoadGraph {
    let doc: GraphDocument = serde_json::from_str(ROAD_GRAPH).expect("graph document");
    RoadGraph::from_document(doc).expect("road graph")
}

#[test]
fn test_concatenated_export_with_one_malformed_object() {
    let run = run_stats(CONCATENATED, &PipelineConfig::default(), &directory())
        .expect("stats run");

    assert_eq!(run.format, ExportFormat::Concatenated);
    assert_eq!(run.extracted, 3);
    assert_eq!(run.parse_errors, 1);
    assert_eq!(run.rejections.total(), 0);
    assert_eq!(run.snapshot.rides_counted, 3);
}

#[test]
fn test_concatenated_snapshot_values() {
    let snapshot = run_stats(CONCATENATED, &PipelineConfig::default(), &directory())
        .expect("stats run")
        .snapshot;

    let stations: Vec<_> = snapshot
        .top_stations
        .iter()
        .map(|s| (s.station_id.as_str(), s.visits))
        .collect();
    assert_eq!(stations, vec![("100", 2), ("300", 2), ("200", 1), ("400", 1)]);
    assert_eq!(
        snapshot.top_stations[0].name.as_deref(),
        Some("Gare de Lyon - Diderot")
    );

    assert_eq!(snapshot.total_bikes, 2);
    assert_eq!(snapshot.bikes.electric_bikes, 1);
    assert_eq!(snapshot.bikes.mechanical_bikes, 1);
    assert_eq!(snapshot.bikes.electric_trips, 2);
    assert_eq!(snapshot.bikes.mechanical_trips, 1);

    assert_eq!(snapshot.boomerang_trips, 1);
    assert_eq!(snapshot.bonus.total, 1.0);
    assert_eq!(snapshot.bonus.trips, 1);
    assert_eq!(snapshot.distance_total_meters, 2510.0);

    let bins: Vec<usize> = snapshot.duration_bins.iter().map(|b| b.rides).collect();
    assert_eq!(bins, vec![1, 1, 0, 1, 0]);
    assert_eq!(bins.iter().sum::<usize>(), snapshot.rides_counted);

    assert!((snapshot.averages.speed_kmh - 9.85).abs() < 1e-9);
    assert!((snapshot.averages.duration_minutes - 1660.0 / 3.0 / 60.0).abs() < 1e-9);

    assert_eq!(snapshot.longest_rides[0].value, 20.0);
    assert_eq!(snapshot.fastest_rides[0].value, 12.2);
    assert_eq!(
        snapshot.fastest_rides[0].arrival_name.as_deref(),
        Some("Oberkampf")
    );
    assert_eq!(snapshot.fastest_rides.len(), 2);

    assert_eq!(snapshot.hourly[8].rides, 1);
    assert_eq!(snapshot.hourly[17].rides, 1);
    assert_eq!(snapshot.hourly[9].rides, 1);
    assert_eq!(snapshot.daily.len(), 2);
    assert_eq!(snapshot.daily[0].rides, 2);
}

#[test]
fn test_envelope_export_with_rejections() {
    let run = run_stats(ENVELOPE, &PipelineConfig::default(), &StationDirectory::default())
        .expect("stats run");

    assert_eq!(run.format, ExportFormat::Envelope);
    assert_eq!(run.extracted, 4);
    assert_eq!(run.parse_errors, 0);
    assert_eq!(run.rejections.missing_timestamp, 1);
    assert_eq!(run.rejections.invalid_number, 1);
    assert_eq!(run.snapshot.rides_counted, 2);

    // Non-numeric bike ids count as usage but not in the split.
    assert_eq!(run.snapshot.total_bikes, 2);
    assert_eq!(run.snapshot.bikes.electric_bikes, 1);
    assert_eq!(run.snapshot.bikes.mechanical_bikes, 0);
    assert_eq!(run.snapshot.bonus.total, 2.5);
    assert_eq!(run.snapshot.averages.distance_km, 4.0);
    assert_eq!(run.snapshot.top_stations[0].station_id, "100");
    assert_eq!(run.snapshot.top_stations[0].visits, 3);
    assert_eq!(
        run.snapshot.top_stations[0].name.as_deref(),
        Some("Station 100")
    );
}

#[test]
fn test_route_mapping_from_export() {
    let ingested = ingest_text(CONCATENATED, &PipelineConfig::default()).expect("ingest");
    let graph = road_graph();
    let stations = directory();

    assert_eq!(stations.coordinates("400"), None);

    let usage = run_routes(
        &ingested.rides,
        &stations,
        &graph,
        RouteMapperConfig::default(),
    )
    .expect("route run");

    assert_eq!(usage.report.mapped, 2);
    assert_eq!(usage.report.unresolved_station, 1);

    let counts: Vec<_> = usage.edges.iter().map(|e| (e.u, e.v, e.count)).collect();
    assert_eq!(counts, vec![(1, 2, 2), (2, 3, 2), (3, 4, 2)]);
    assert_eq!(usage.edges[1].geometry.len(), 3);

    let geojson = serde_json::to_value(usage.to_feature_collection()).expect("geojson");
    assert_eq!(
        geojson["crs"]["properties"]["name"],
        "urn:ogc:def:crs:OGC:1.3:CRS84"
    );
    assert_eq!(geojson["features"].as_array().map(Vec::len), Some(3));
    assert_eq!(geojson["features"][0]["properties"]["count"], 2);
}
