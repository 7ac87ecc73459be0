use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use thiserror::Error;

/// How often (in settled nodes) the deadline is checked.
const DEADLINE_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("node is not part of the road graph")]
    UnknownNode,
    #[error("destination is unreachable from origin")]
    Unreachable,
    #[error("path search exceeded its time budget")]
    TimedOut,
}

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: f64,
    node: NodeIndex,
}

impl Eq for State {}

// Min-heap on cost, then node index, so equal-cost frontiers pop in a fixed order.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-pair Dijkstra with an optional wall-clock deadline.
pub fn dijkstra<N, E>(
    graph: &DiGraph<N, E>,
    origin: NodeIndex,
    dest: NodeIndex,
    weight: impl Fn(&E) -> f64,
    deadline: Option<Instant>,
) -> Result<Vec<NodeIndex>, PathError> {
    if origin == dest {
        return Ok(vec![origin]);
    }

    let n = graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<NodeIndex>> = vec![None; n];
    let mut heap = BinaryHeap::new();
    let mut settled = 0usize;

    dist[origin.index()] = 0.0;
    heap.push(State {
        cost: 0.0,
        node: origin,
    });

    while let Some(State { cost, node }) = heap.pop() {
        if cost > dist[node.index()] {
            continue;
        }
        if node == dest {
            return Ok(walk_back(&prev, origin, dest));
        }

        settled += 1;
        if settled % DEADLINE_CHECK_INTERVAL == 0
            && deadline.is_some_and(|d| Instant::now() >= d)
        {
            return Err(PathError::TimedOut);
        }

        for edge in graph.edges(node) {
            relax(&edge, cost, &weight, &mut dist, &mut prev, &mut heap);
        }
    }

    Err(PathError::Unreachable)
}

fn relax<E>(
    edge: &EdgeReference<'_, E>,
    cost: f64,
    weight: &impl Fn(&E) -> f64,
    dist: &mut [f64],
    prev: &mut [Option<NodeIndex>],
    heap: &mut BinaryHeap<State>,
) {
    let next = edge.target();
    let next_cost = cost + weight(edge.weight());
    if next_cost < dist[next.index()] {
        dist[next.index()] = next_cost;
        prev[next.index()] = Some(edge.source());
        heap.push(State {
            cost: next_cost,
            node: next,
        });
    }
}

fn walk_back(prev: &[Option<NodeIndex>], origin: NodeIndex, dest: NodeIndex) -> Vec<NodeIndex> {
    let mut path = vec![dest];
    let mut current = dest;
    while current != origin {
        match prev[current.index()] {
            Some(p) => {
                path.push(p);
                current = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
