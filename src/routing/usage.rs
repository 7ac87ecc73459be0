//! Per-edge traversal counts and their GeoJSON export.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

use super::graph::{NodeId, RoadGraph};

/// Traversal counts keyed by directed edge `(u, v)` in travel order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeUsageMap {
    counts: HashMap<(NodeId, NodeId), usize>,
}

impl EdgeUsageMap {
    /// Counts each consecutive node pair of `path` once. A single-node path
    /// traverses no edge and changes nothing.
    pub fn accumulate(&mut self, path: &[NodeId]) {
        for pair in path.windows(2) {
            *self.counts.entry((pair[0], pair[1])).or_default() += 1;
        }
    }

    pub fn get(&self, u: NodeId, v: NodeId) -> usize {
        self.counts.get(&(u, v)).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sums `other` into `self` per edge. Commutative and associative.
    pub fn merge(&mut self, other: EdgeUsageMap) {
        for (edge, n) in other.counts {
            *self.counts.entry(edge).or_default() += n;
        }
    }

    /// Used edges with their geometry, ordered by `(u, v)`.
    pub fn freeze(&self, graph: &RoadGraph) -> Vec<EdgeUsage> {
        let mut edges: Vec<_> = self
            .counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .filter_map(|(&(u, v), &count)| match graph.edge_geometry(u, v) {
                Some(geometry) => Some(EdgeUsage {
                    u,
                    v,
                    count,
                    geometry,
                }),
                None => {
                    warn!(u, v, "Counted edge missing from graph, dropped");
                    None
                }
            })
            .collect();
        edges.sort_by_key(|e| (e.u, e.v));
        edges
    }
}

/// One used edge. `geometry` is a `[lon, lat]` polyline in the graph CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeUsage {
    pub u: NodeId,
    pub v: NodeId,
    pub count: usize,
    pub geometry: Vec<[f64; 2]>,
}

impl EdgeUsage {
    pub fn to_feature(&self) -> Feature {
        let line = self.geometry.iter().map(|p| vec![p[0], p[1]]).collect();

        let mut properties = JsonObject::new();
        properties.insert("count".to_string(), json!(self.count));
        properties.insert("u".to_string(), json!(self.u));
        properties.insert("v".to_string(), json!(self.v));

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(GeoValue::LineString(line))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Feature collection with one line feature per used edge. The CRS is
/// declared once, as a named `crs` member covering every feature.
pub fn feature_collection(edges: &[EdgeUsage], crs: &str) -> FeatureCollection {
    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": crs } }),
    );

    FeatureCollection {
        bbox: None,
        features: edges.iter().map(EdgeUsage::to_feature).collect(),
        foreign_members: Some(members),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_keeps_direction() {
        let mut usage = EdgeUsageMap::default();
        usage.accumulate(&[1, 2, 3]);
        usage.accumulate(&[3, 2]);

        assert_eq!(usage.get(1, 2), 1);
        assert_eq!(usage.get(2, 3), 1);
        assert_eq!(usage.get(3, 2), 1);
        assert_eq!(usage.get(2, 1), 0);
        assert_eq!(usage.len(), 3);
    }

    #[test]
    fn test_single_node_path_counts_nothing() {
        let mut usage = EdgeUsageMap::default();
        usage.accumulate(&[5]);
        usage.accumulate(&[]);
        assert!(usage.is_empty());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = EdgeUsageMap::default();
        a.accumulate(&[1, 2, 3]);
        let mut b = EdgeUsageMap::default();
        b.accumulate(&[2, 3, 4]);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab, ba);
        assert_eq!(ab.get(2, 3), 2);
    }

    #[test]
    fn test_feature_collection_shape() {
        let edges = vec![EdgeUsage {
            u: 1,
            v: 2,
            count: 4,
            geometry: vec![[2.35, 48.85], [2.36, 48.86]],
        }];

        let fc = feature_collection(&edges, "EPSG:4326");
        let value = serde_json::to_value(&fc).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["properties"]["name"], "EPSG:4326");
        assert_eq!(value["features"][0]["properties"]["count"], 4);
        assert_eq!(value["features"][0]["geometry"]["type"], "LineString");
        assert_eq!(value["features"][0]["geometry"]["coordinates"][1][1], 48.86);
    }
}
