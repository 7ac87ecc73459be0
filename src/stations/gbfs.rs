use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use super::{Station, StationSource};
use crate::fetch::{HttpClient, fetch_bytes};

#[derive(Deserialize)]
struct StationInformation {
    data: StationData,
}

#[derive(Deserialize)]
struct StationData {
    stations: Vec<GbfsStation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StationId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Deserialize)]
struct GbfsStation {
    station_id: StationId,
    name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Parses a GBFS `station_information.json` document.
pub fn parse_station_information(bytes: &[u8]) -> Result<Vec<Station>> {
    let doc: StationInformation =
        serde_json::from_slice(bytes).context("invalid station_information document")?;

    Ok(doc
        .data
        .stations
        .into_iter()
        .map(|s| Station {
            id: match s.station_id {
                StationId::Text(id) => id,
                StationId::Number(n) => n.to_string(),
            },
            name: s.name,
            lat: s.lat,
            lon: s.lon,
        })
        .collect())
}

/// Downloads station metadata from a GBFS endpoint.
pub struct GbfsStationSource<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> GbfsStationSource<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> StationSource for GbfsStationSource<C> {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn load_stations(&self) -> Result<Vec<Station>> {
        let bytes = fetch_bytes(&self.client, &self.url)
            .await
            .with_context(|| format!("failed to fetch stations from {}", self.url))?;
        parse_station_information(&bytes)
    }
}

/// Reads a saved `station_information.json` from disk.
pub struct FileStationSource {
    pub path: PathBuf,
}

#[async_trait]
impl StationSource for FileStationSource {
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_stations(&self) -> Result<Vec<Station>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        parse_station_information(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "last_updated": 1700000000,
        "data": {
            "stations": [
                {"station_id": 213688169, "name": "Benjamin Godard - Victor Hugo", "lat": 48.865983, "lon": 2.275725},
                {"station_id": "36255", "name": "Toudouze - Clauzel", "lat": 48.87929, "lon": 2.33736},
                {"station_id": "900", "lat": null}
            ]
        }
    }"#;

    #[test]
    fn test_parse_station_information() {
        let stations = parse_station_information(DOC.as_bytes()).unwrap();

        assert_eq!(stations.len(), 3);
        assert_eq!(stations[0].id, "213688169");
        assert_eq!(stations[1].name.as_deref(), Some("Toudouze - Clauzel"));
        assert_eq!(stations[1].coordinates(), Some((48.87929, 2.33736)));
        assert_eq!(stations[2].name, None);
        assert_eq!(stations[2].coordinates(), None);
    }

    #[test]
    fn test_parse_rejects_other_documents() {
        assert!(parse_station_information(b"{\"stations\": []}").is_err());
    }

    #[tokio::test]
    async fn test_file_source_reads_document() {
        let path = std::env::temp_dir().join("velo_usage_test_stations.json");
        std::fs::write(&path, DOC).unwrap();

        let source = FileStationSource { path: path.clone() };
        let stations = source.load_stations().await.unwrap();
        assert_eq!(stations.len(), 3);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_file_source_missing_file_errors() {
        let source = FileStationSource {
            path: PathBuf::from("/nonexistent/velo_usage/stations.json"),
        };
        assert!(source.load_stations().await.is_err());
    }
}
