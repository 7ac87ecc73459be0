//! Ride endpoint coordinates, resolved from station ids.
//!
//! Coordinates can be written to and read back from a CSV file with the
//! header `lat_start,lon_start,lat_end,lon_end`, so route mapping can be run
//! separately from extraction.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use crate::ride::Ride;
use crate::stations::StationResolver;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideEndpoints {
    pub lat_start: f64,
    pub lon_start: f64,
    pub lat_end: f64,
    pub lon_end: f64,
}

/// Endpoints of rides whose two stations both have coordinates.
#[derive(Debug, Default)]
pub struct ResolvedEndpoints {
    pub endpoints: Vec<RideEndpoints>,
    pub unresolved: usize,
}

/// Looks up both stations of every ride. Rides missing a station id or
/// coordinates are counted in [`ResolvedEndpoints::unresolved`].
pub fn resolve_endpoints(rides: &[Ride], resolver: &impl StationResolver) -> ResolvedEndpoints {
    let mut resolved = ResolvedEndpoints::default();

    for ride in rides {
        let start = ride
            .departure_station_id
            .as_deref()
            .and_then(|id| resolver.coordinates(id));
        let end = ride
            .arrival_station_id
            .as_deref()
            .and_then(|id| resolver.coordinates(id));

        match (start, end) {
            (Some((lat_start, lon_start)), Some((lat_end, lon_end))) => {
                resolved.endpoints.push(RideEndpoints {
                    lat_start,
                    lon_start,
                    lat_end,
                    lon_end,
                })
            }
            _ => {
                debug!(
                    departure = ?ride.departure_station_id,
                    arrival = ?ride.arrival_station_id,
                    "Ride endpoint unresolved"
                );
                resolved.unresolved += 1;
            }
        }
    }

    resolved
}

/// Writes endpoints to a fresh CSV file, replacing any previous content.
pub fn write_csv(path: &Path, endpoints: &[RideEndpoints]) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for row in endpoints {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = endpoints.len(), "Endpoints written");
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<RideEndpoints>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: RideEndpoints = result?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::{Station, StationDirectory};
    use chrono::{TimeZone, Utc};
    use std::env;
    use std::fs;

    #[test]
    fn test_resolve_endpoints_skips_unknown_stations() {
        let directory = StationDirectory::new(vec![
            station("1", 48.85, 2.35),
            station("2", 48.86, 2.36),
        ]);
        let rides = vec![
            ride(Some("1"), Some("2")),
            ride(Some("1"), Some("404")),
            ride(None, Some("2")),
        ];

        let resolved = resolve_endpoints(&rides, &directory);

        assert_eq!(resolved.endpoints.len(), 1);
        assert_eq!(resolved.unresolved, 2);
        assert_eq!(resolved.endpoints[0].lat_end, 48.86);
    }

    #[test]
    fn test_csv_write_then_read() {
        let path = env::temp_dir().join("velo_usage_test_endpoints.csv");
        let _ = fs::remove_file(&path);

        let rows = vec![
            RideEndpoints {
                lat_start: 48.85,
                lon_start: 2.35,
                lat_end: 48.86,
                lon_end: 2.36,
            },
            RideEndpoints {
                lat_start: 48.80,
                lon_start: 2.30,
                lat_end: 48.81,
                lon_end: 2.31,
            },
        ];
        write_csv(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("lat_start,lon_start,lat_end,lon_end"));
        assert_eq!(read_csv(&path).unwrap(), rows);

        fs::remove_file(&path).unwrap();
    }

    fn station(id: &str, lat: f64, lon: f64) -> Station {
        Station {
            id: id.to_string(),
            name: None,
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    fn ride(from: Option<&str>, to: Option<&str>) -> Ride {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Ride {
            departure_station_id: from.map(str::to_string),
            arrival_station_id: to.map(str::to_string),
            bike_id: None,
            bonus_earned: 0.0,
            distance_meters: 0.0,
            average_speed_kmh: None,
            start_time: start,
            end_time: start + chrono::Duration::minutes(10),
        }
    }
}
