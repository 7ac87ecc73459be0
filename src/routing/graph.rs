//! Static road graph with a spatial node index.

use anyhow::{Context, Result, bail, ensure};
use petgraph::graph::{DiGraph, NodeIndex};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use super::path::{PathError, dijkstra};

pub type NodeId = u64;

/// CRS of every coordinate the graph emits (WGS84, lon/lat order).
pub const DEFAULT_CRS: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

/// Names accepted for the document `crs`. Node positions and edge geometry
/// are always read as WGS84 degrees, so anything else is refused.
const GEOGRAPHIC_CRS_NAMES: [&str; 6] = [
    "urn:ogc:def:crs:ogc:1.3:crs84",
    "ogc:crs84",
    "crs84",
    "epsg:4326",
    "urn:ogc:def:crs:epsg::4326",
    "wgs84",
];

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
}

/// Edge as read from the document. `geometry` is a `[lon, lat]` polyline.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphEdge {
    pub u: NodeId,
    pub v: NodeId,
    pub length: f64,
    #[serde(default)]
    pub geometry: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub crs: Option<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone)]
pub struct RoadEdge {
    pub length: f64,
    pub geometry: Option<Vec<[f64; 2]>>,
}

type IndexedNode = GeomWithData<[f64; 2], NodeIndex>;

/// Directed road graph, read-only once built.
pub struct RoadGraph {
    graph: DiGraph<GraphNode, RoadEdge>,
    index_of: HashMap<NodeId, NodeIndex>,
    spatial: RTree<IndexedNode>,
    cos_lat0: f64,
    crs: String,
}

impl RoadGraph {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open road graph {}", path.display()))?;
        let doc: GraphDocument = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("invalid road graph document {}", path.display()))?;
        Self::from_document(doc)
    }

    /// Builds the graph. Parallel edges between the same ordered pair keep
    /// the shortest one.
    pub fn from_document(doc: GraphDocument) -> Result<Self> {
        ensure!(!doc.nodes.is_empty(), "road graph has no nodes");
        if let Some(name) = doc.crs.as_deref() {
            ensure!(
                is_geographic(name),
                "unsupported road graph crs {name:?}, coordinates must be WGS84 lon/lat"
            );
        }

        let cos_lat0 = (doc.nodes.iter().map(|n| n.lat).sum::<f64>() / doc.nodes.len() as f64)
            .to_radians()
            .cos();

        let mut graph: DiGraph<GraphNode, RoadEdge> =
            DiGraph::with_capacity(doc.nodes.len(), doc.edges.len());
        let mut index_of = HashMap::with_capacity(doc.nodes.len());

        for node in doc.nodes {
            ensure!(
                node.lat.is_finite() && node.lon.is_finite(),
                "node {} has non-finite coordinates",
                node.id
            );
            if index_of.contains_key(&node.id) {
                bail!("duplicate node id {}", node.id);
            }
            let id = node.id;
            index_of.insert(id, graph.add_node(node));
        }

        let mut replaced = 0usize;
        for edge in doc.edges {
            ensure!(
                edge.length.is_finite() && edge.length >= 0.0,
                "edge ({}, {}) has invalid length {}",
                edge.u,
                edge.v,
                edge.length
            );
            let (Some(&a), Some(&b)) = (index_of.get(&edge.u), index_of.get(&edge.v)) else {
                bail!("edge ({}, {}) references an unknown node", edge.u, edge.v);
            };

            let weight = RoadEdge {
                length: edge.length,
                geometry: edge.geometry,
            };
            match graph.find_edge(a, b) {
                Some(existing) => {
                    if weight.length < graph[existing].length {
                        graph[existing] = weight;
                        replaced += 1;
                    }
                }
                None => {
                    graph.add_edge(a, b, weight);
                }
            }
        }

        let points: Vec<IndexedNode> = graph
            .node_indices()
            .map(|ix| {
                let node = &graph[ix];
                GeomWithData::new(project(node.lat, node.lon, cos_lat0), ix)
            })
            .collect();

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            replaced,
            "Road graph built"
        );

        Ok(Self {
            graph,
            index_of,
            spatial: RTree::bulk_load(points),
            cos_lat0,
            crs: DEFAULT_CRS.to_string(),
        })
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.index_of.get(&id).map(|&ix| &self.graph[ix])
    }

    /// Closest node to the query point. Equidistant candidates resolve to
    /// the smallest node id.
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<NodeId> {
        let query = project(lat, lon, self.cos_lat0);
        let mut candidates = self.spatial.nearest_neighbor_iter_with_distance_2(&query);
        let (first, best) = candidates.next()?;

        let mut nearest = self.graph[first.data].id;
        for (candidate, d2) in candidates {
            if d2 > best {
                break;
            }
            nearest = nearest.min(self.graph[candidate.data].id);
        }
        Some(nearest)
    }

    /// Length-weighted shortest path, as the visited node ids in travel
    /// order. `origin == dest` yields the single-node path.
    pub fn shortest_path(
        &self,
        origin: NodeId,
        dest: NodeId,
        deadline: Option<Instant>,
    ) -> Result<Vec<NodeId>, PathError> {
        let (Some(&from), Some(&to)) = (self.index_of.get(&origin), self.index_of.get(&dest))
        else {
            return Err(PathError::UnknownNode);
        };

        let path = dijkstra(&self.graph, from, to, |e| e.length, deadline)?;
        debug!(origin, dest, hops = path.len().saturating_sub(1), "Path found");
        Ok(path.into_iter().map(|ix| self.graph[ix].id).collect())
    }

    /// Polyline of the edge `u -> v`: its explicit geometry, else the
    /// straight segment between the endpoints. `[lon, lat]` pairs.
    pub fn edge_geometry(&self, u: NodeId, v: NodeId) -> Option<Vec<[f64; 2]>> {
        let a = *self.index_of.get(&u)?;
        let b = *self.index_of.get(&v)?;
        let edge = self.graph.find_edge(a, b)?;

        Some(match &self.graph[edge].geometry {
            Some(line) if line.len() >= 2 => line.clone(),
            _ => {
                let (from, to) = (&self.graph[a], &self.graph[b]);
                vec![[from.lon, from.lat], [to.lon, to.lat]]
            }
        })
    }
}

fn is_geographic(name: &str) -> bool {
    let name = name.trim().to_ascii_lowercase();
    GEOGRAPHIC_CRS_NAMES.contains(&name.as_str())
}

/// Local equirectangular projection in metres.
fn project(lat: f64, lon: f64, cos_lat0: f64) -> [f64; 2] {
    [
        lon.to_radians() * EARTH_RADIUS_M * cos_lat0,
        lat.to_radians() * EARTH_RADIUS_M,
    ]
}
