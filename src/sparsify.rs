//! Graph reducers: greedy (1+ε)-spanner and k-nearest-neighbour pruning
//! with connectivity repair.
//!
//! Both are deterministic. Edges are ordered by `(weight, u, v)` so equal
//! weights never depend on input order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::float_ord::QueueEntry;
use crate::geo::{Coordinate, haversine_km};
use crate::graph::{Adjacency, RoadGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairGoal {
    /// Stop bridging once the preserve set is mutually reachable.
    PreserveConnected,
    /// Keep bridging until the graph is a single component.
    AllConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SparsifyStrategy {
    #[default]
    None,
    Spanner {
        epsilon: f64,
    },
    Knn {
        k: usize,
        goal: RepairGoal,
    },
}

impl SparsifyStrategy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::None => Ok(()),
            Self::Spanner { epsilon } if epsilon.is_finite() && epsilon >= 0.0 => Ok(()),
            Self::Spanner { .. } => Err(Error::config("spanner epsilon must be non-negative")),
            Self::Knn { k, .. } if k >= 1 => Ok(()),
            Self::Knn { .. } => Err(Error::config("knn k must be at least 1")),
        }
    }
}

/// Reduce a built graph's adjacency. The k-NN reducer preserves the graph's
/// origin and destination.
pub fn sparsify(graph: &RoadGraph, strategy: &SparsifyStrategy) -> Adjacency {
    match *strategy {
        SparsifyStrategy::None => graph.adjacency.clone(),
        SparsifyStrategy::Spanner { epsilon } => {
            let edges: Vec<_> = graph.adjacency.edges().collect();
            greedy_spanner(graph.len(), &edges, epsilon)
        }
        SparsifyStrategy::Knn { k, goal } => {
            let preserve: Vec<usize> = graph.origin.into_iter().chain(graph.destination).collect();
            knn_sparsify(&graph.adjacency, k, &preserve, goal)
        }
    }
}

/// Every unordered pair with its great-circle distance, sorted ascending.
pub fn complete_edges(coords: &[Coordinate]) -> Vec<(usize, usize, f64)> {
    let mut edges = Vec::with_capacity(coords.len() * coords.len().saturating_sub(1) / 2);
    for u in 0..coords.len() {
        for v in (u + 1)..coords.len() {
            edges.push((u, v, haversine_km(coords[u], coords[v])));
        }
    }
    edges.sort_by(edge_order);
    edges
}

/// Greedy (1+ε)-spanner over `edges`.
///
/// An edge is accepted iff the spanner built so far has no `u`-`v` path of
/// length at most `(1 + epsilon) * weight`.
pub fn greedy_spanner(node_count: usize, edges: &[(usize, usize, f64)], epsilon: f64) -> Adjacency {
    let mut sorted = edges.to_vec();
    sorted.sort_by(edge_order);

    let stretch = 1.0 + epsilon.max(0.0);
    let mut spanner = Adjacency::new(node_count);
    for (u, v, weight) in sorted {
        if u == v {
            continue;
        }
        if shortest_distance(&spanner, u, v, stretch * weight).is_none() {
            spanner.add_edge(u, v, weight);
        }
    }
    spanner
}

/// Shortest `from`-`to` distance if it does not exceed `bound`.
pub fn shortest_distance(adjacency: &Adjacency, from: usize, to: usize, bound: f64) -> Option<f64> {
    if from == to {
        return Some(0.0);
    }

    let mut best = vec![f64::INFINITY; adjacency.len()];
    let mut queue = BinaryHeap::new();
    best[from] = 0.0;
    queue.push(QueueEntry::new(from, 0.0));

    while let Some(entry) = queue.pop() {
        let cost = entry.cost.0;
        if cost > best[entry.node] {
            continue;
        }
        if entry.node == to {
            return Some(cost);
        }
        for (next, weight) in adjacency.neighbours(entry.node) {
            let next_cost = cost + weight;
            if next_cost <= bound && next_cost < best[next] {
                best[next] = next_cost;
                queue.push(QueueEntry::new(next, next_cost));
            }
        }
    }
    None
}

/// Component label per node; labels are assigned in node order from 0.
pub fn connected_components(adjacency: &Adjacency) -> Vec<usize> {
    const UNSEEN: usize = usize::MAX;
    let mut labels = vec![UNSEEN; adjacency.len()];
    let mut next_label = 0;
    let mut queue = VecDeque::new();

    for start in 0..adjacency.len() {
        if labels[start] != UNSEEN {
            continue;
        }
        labels[start] = next_label;
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            for (next, _) in adjacency.neighbours(node) {
                if labels[next] == UNSEEN {
                    labels[next] = next_label;
                    queue.push_back(next);
                }
            }
        }
        next_label += 1;
    }
    labels
}

/// Union-find with path halving and union by rank.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
    sets: usize,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
            sets: len,
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; false when they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        self.sets -= 1;
        true
    }

    pub fn set_count(&self) -> usize {
        self.sets
    }
}

/// Keep each node's `k` lightest edges, symmetrised, then bridge components
/// with the lightest crossing edges of `source` until `goal` holds.
pub fn knn_sparsify(
    source: &Adjacency,
    k: usize,
    preserve: &[usize],
    goal: RepairGoal,
) -> Adjacency {
    assert!(k >= 1, "knn sparsification needs k >= 1");

    let mut kept = Adjacency::new(source.len());
    for u in 0..source.len() {
        let mut incident: Vec<(usize, usize, f64)> =
            source.neighbours(u).map(|(v, w)| (u, v, w)).collect();
        incident.sort_by(edge_order);
        for (_, v, weight) in incident.into_iter().take(k) {
            kept.add_edge(u, v, weight);
        }
    }

    let mut sets = DisjointSet::new(source.len());
    for (u, v, _) in kept.edges() {
        sets.union(u, v);
    }

    let components = sets.set_count();
    if components > 1 {
        let mut bridges: Vec<(usize, usize, f64)> = source
            .edges()
            .filter(|&(u, v, _)| sets.find(u) != sets.find(v))
            .collect();
        bridges.sort_by(edge_order);

        for (u, v, weight) in bridges {
            if repair_done(&mut sets, preserve, goal) {
                break;
            }
            if sets.union(u, v) {
                debug!(u, v, weight, "bridging components");
                kept.add_edge(u, v, weight);
            }
        }
    }

    let remaining = sets.set_count();
    if remaining > 1 {
        let preserve_connected = repair_done(&mut sets, preserve, RepairGoal::PreserveConnected);
        info!(
            components = remaining,
            preserve_connected,
            "sparsified graph remains disconnected"
        );
    }
    kept
}

fn repair_done(sets: &mut DisjointSet, preserve: &[usize], goal: RepairGoal) -> bool {
    match goal {
        RepairGoal::AllConnected => sets.set_count() <= 1,
        RepairGoal::PreserveConnected => match preserve.split_first() {
            None => true,
            Some((&first, rest)) => {
                let root = sets.find(first);
                rest.iter().all(|&node| sets.find(node) == root)
            }
        },
    }
}

fn edge_order(a: &(usize, usize, f64), b: &(usize, usize, f64)) -> Ordering {
    a.2.total_cmp(&b.2)
        .then_with(|| a.0.cmp(&b.0))
        .then_with(|| a.1.cmp(&b.1))
}
