//! Station metadata lookup.
//!
//! [`StationSource`] is the async trait for loading station metadata once per
//! run. [`StationDirectory`] caches the result and implements the synchronous
//! [`StationResolver`] used by aggregation labelling and route mapping.

mod gbfs;

pub use gbfs::{FileStationSource, GbfsStationSource, parse_station_information};

use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, warn};

/// Station metadata. Name and coordinates are optional in upstream feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Station {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// Maps a station id to its metadata. Unknown ids are never an error.
pub trait StationResolver {
    fn resolve(&self, station_id: &str) -> Option<&Station>;

    /// Station name, or `"Station {id}"` when the station or its name is unknown.
    fn display_name(&self, station_id: &str) -> String {
        self.resolve(station_id)
            .and_then(|s| s.name.clone())
            .unwrap_or_else(|| format!("Station {station_id}"))
    }

    /// `(lat, lon)` when the station is known and has coordinates.
    fn coordinates(&self, station_id: &str) -> Option<(f64, f64)> {
        self.resolve(station_id).and_then(Station::coordinates)
    }
}

/// In-memory resolver, keyed by station id.
#[derive(Debug, Default)]
pub struct StationDirectory {
    stations: HashMap<String, Station>,
}

impl StationDirectory {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations: stations.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl StationResolver for StationDirectory {
    fn resolve(&self, station_id: &str) -> Option<&Station> {
        self.stations.get(station_id)
    }
}

/// Abstraction over a station metadata provider.
#[async_trait::async_trait]
pub trait StationSource {
    async fn load_stations(&self) -> Result<Vec<Station>>;
}

/// Loads a directory from `source`, degrading to an empty directory (and
/// therefore synthesized labels) when the source fails.
pub async fn load_directory<S: StationSource + Sync>(source: &S) -> StationDirectory {
    match source.load_stations().await {
        Ok(stations) => {
            info!(count = stations.len(), "Station directory loaded");
            StationDirectory::new(stations)
        }
        Err(e) => {
            warn!(error = %e, "Station metadata unavailable, using id-based labels");
            StationDirectory::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait::async_trait]
    impl StationSource for FailingSource {
        async fn load_stations(&self) -> Result<Vec<Station>> {
            Err(anyhow::anyhow!("service down"))
        }
    }

    #[test]
    fn test_display_name_fallbacks() {
        let directory = StationDirectory::new(vec![
            station("1", Some("Place d'Italie"), Some((48.83, 2.35))),
            station("2", None, None),
        ]);

        assert_eq!(directory.display_name("1"), "Place d'Italie");
        assert_eq!(directory.display_name("2"), "Station 2");
        assert_eq!(directory.display_name("99"), "Station 99");
    }

    #[test]
    fn test_coordinates_need_both_values() {
        let mut half = station("3", None, None);
        half.lat = Some(48.0);
        let directory = StationDirectory::new(vec![station("1", None, Some((48.83, 2.35))), half]);

        assert_eq!(directory.coordinates("1"), Some((48.83, 2.35)));
        assert_eq!(directory.coordinates("3"), None);
        assert_eq!(directory.coordinates("missing"), None);
    }

    #[tokio::test]
    async fn test_failing_source_degrades_to_empty_directory() {
        let directory = load_directory(&FailingSource).await;
        assert!(directory.is_empty());
        assert_eq!(directory.display_name("7"), "Station 7");
    }

    fn station(id: &str, name: Option<&str>, coords: Option<(f64, f64)>) -> Station {
        Station {
            id: id.to_string(),
            name: name.map(str::to_string),
            lat: coords.map(|c| c.0),
            lon: coords.map(|c| c.1),
        }
    }
}
