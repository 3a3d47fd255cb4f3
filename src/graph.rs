//! Reachability graph construction.
//!
//! Node order is fixed for the lifetime of a build: origin first (when
//! given), then the stations in input order, then the destination. Candidate
//! pairs come from a great-circle prefilter (or a great-circle spanner), are
//! resolved in provider-sized chunks on a bounded worker pool and are gated
//! against the vehicle range once the real distance is known.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::geo::{Coordinate, haversine_km};
use crate::sparsify::{complete_edges, greedy_spanner};
use crate::station::Station;
use crate::traits::DistanceProvider;

/// Lower bound for the weight of an edge between two distinct nodes.
pub const MIN_EDGE_KM: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Origin,
    Destination,
    Station,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub coordinate: Coordinate,
    pub external_id: Option<String>,
    pub role: NodeRole,
    pub charger_kw: Option<f64>,
}

impl Node {
    pub fn from_station(station: &Station) -> Self {
        Self {
            name: station.name.clone(),
            coordinate: station.coordinate,
            external_id: station.external_id.clone(),
            role: NodeRole::Station,
            charger_kw: station.charger_kw,
        }
    }

    fn endpoint(waypoint: &Waypoint, role: NodeRole) -> Self {
        Self {
            name: waypoint.name.clone(),
            coordinate: waypoint.coordinate,
            external_id: None,
            role,
            charger_kw: None,
        }
    }

    pub fn is_station(&self) -> bool {
        self.role == NodeRole::Station
    }
}

/// A named trip endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub coordinate: Coordinate,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinate,
        }
    }
}

/// Undirected weighted adjacency; every edge is stored in both directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjacency {
    neighbours: Vec<BTreeMap<usize, f64>>,
}

impl Adjacency {
    pub fn new(node_count: usize) -> Self {
        Self {
            neighbours: vec![BTreeMap::new(); node_count],
        }
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    /// Insert (or overwrite) the undirected edge `u`-`v`.
    pub fn add_edge(&mut self, u: usize, v: usize, weight_km: f64) {
        assert!(u != v, "self loop on node {u}");
        assert!(
            u < self.len() && v < self.len(),
            "edge {u}-{v} outside graph of {} nodes",
            self.len()
        );
        assert!(
            weight_km.is_finite() && weight_km >= 0.0,
            "invalid weight {weight_km} for edge {u}-{v}"
        );
        self.neighbours[u].insert(v, weight_km);
        self.neighbours[v].insert(u, weight_km);
    }

    pub fn neighbours(&self, u: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.neighbours[u].iter().map(|(v, w)| (*v, *w))
    }

    pub fn weight(&self, u: usize, v: usize) -> Option<f64> {
        self.neighbours.get(u)?.get(&v).copied()
    }

    pub fn degree(&self, u: usize) -> usize {
        self.neighbours[u].len()
    }

    /// Every edge once, as `(u, v, weight)` with `u < v`, in index order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.neighbours.iter().enumerate().flat_map(|(u, row)| {
            row.range(u + 1..).map(move |(v, w)| (u, *v, *w))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.neighbours.iter().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn is_symmetric(&self) -> bool {
        self.neighbours.iter().enumerate().all(|(u, row)| {
            row.iter()
                .all(|(v, w)| self.neighbours[*v].get(&u) == Some(w))
        })
    }
}

/// How candidate pairs are chosen before any distance is requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateStrategy {
    /// Every pair whose great-circle distance is within the prefilter radius.
    Prefilter,
    /// Pairs of the great-circle (1+ε)-spanner that are also within the
    /// prefilter radius.
    Spanner { epsilon: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Admission radius; the vehicle's full-battery range when unset.
    pub max_range_km: Option<f64>,
    pub prefilter_factor: f64,
    /// Upper bound on concurrently resolving chunks.
    pub max_concurrency: usize,
    pub candidates: CandidateStrategy,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_range_km: None,
            prefilter_factor: 1.0,
            max_concurrency: 4,
            candidates: CandidateStrategy::Prefilter,
        }
    }
}

impl GraphOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(range) = self.max_range_km {
            validate_range(range)?;
        }
        if !self.prefilter_factor.is_finite() || self.prefilter_factor < 1.0 {
            return Err(Error::config("prefilter_factor must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be at least 1"));
        }
        if let CandidateStrategy::Spanner { epsilon } = self.candidates {
            if !epsilon.is_finite() || epsilon < 0.0 {
                return Err(Error::config("spanner epsilon must be non-negative"));
            }
        }
        Ok(())
    }
}

fn validate_range(range: f64) -> Result<()> {
    if range.is_finite() && range > 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!("max_range_km must be positive, got {range}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub nodes: usize,
    pub candidate_pairs: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    /// Pairs weighted by great-circle distance because resolution failed.
    pub fallback_pairs: usize,
    /// Pairs dropped because their resolved distance exceeded the range.
    pub gate_rejected: usize,
    pub edges: usize,
}

#[derive(Debug, Clone)]
pub struct RoadGraph {
    pub nodes: Vec<Node>,
    pub adjacency: Adjacency,
    pub origin: Option<usize>,
    pub destination: Option<usize>,
    pub stats: BuildStats,
}

impl RoadGraph {
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.nodes.iter().map(|node| node.coordinate).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Destinations of one origin node resolved in a single provider call.
#[derive(Debug)]
struct Chunk {
    origin: usize,
    targets: Vec<usize>,
    lane: usize,
}

struct ChunkResolution {
    /// Resolved distance per target, `None` when resolution failed.
    distances: Vec<Option<f64>>,
    failed: bool,
}

pub struct GraphBuilder<'a, P: DistanceProvider + ?Sized> {
    provider: &'a P,
    options: GraphOptions,
    cancel: CancelToken,
}

impl<'a, P: DistanceProvider + ?Sized> GraphBuilder<'a, P> {
    pub fn new(provider: &'a P, options: GraphOptions) -> Self {
        Self {
            provider,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the graph for `stations` plus the optional trip endpoints.
    ///
    /// Uses `options.max_range_km` as the admission radius, falling back to
    /// `default_range_km`.
    pub fn build(
        &self,
        stations: &[Station],
        origin: Option<&Waypoint>,
        destination: Option<&Waypoint>,
        default_range_km: f64,
    ) -> Result<RoadGraph> {
        self.options.validate()?;
        let max_range_km = self.options.max_range_km.unwrap_or(default_range_km);
        validate_range(max_range_km)?;

        let mut nodes = Vec::with_capacity(stations.len() + 2);
        let origin_idx = origin.map(|waypoint| {
            nodes.push(Node::endpoint(waypoint, NodeRole::Origin));
            0
        });
        nodes.extend(stations.iter().map(Node::from_station));
        let destination_idx = destination.map(|waypoint| {
            nodes.push(Node::endpoint(waypoint, NodeRole::Destination));
            nodes.len() - 1
        });
        for node in &nodes {
            if !node.coordinate.is_valid() {
                return Err(Error::InvalidCoordinate {
                    name: node.name.clone(),
                    lat: node.coordinate.lat,
                    lng: node.coordinate.lng,
                });
            }
        }

        let coords: Vec<Coordinate> = nodes.iter().map(|node| node.coordinate).collect();
        let pairs = self.candidate_pairs(&coords, max_range_km);
        let chunks = self.chunk_pairs(&pairs);
        let resolutions = self.resolve_chunks(&coords, &chunks)?;

        if self.cancel.is_cancelled() {
            info!(nodes = nodes.len(), "graph build cancelled, discarding partial adjacency");
            return Err(Error::BuildCancelled);
        }

        let mut stats = BuildStats {
            nodes: nodes.len(),
            candidate_pairs: pairs.len(),
            chunks: chunks.len(),
            ..BuildStats::default()
        };
        let mut adjacency = Adjacency::new(nodes.len());
        for (chunk, resolution) in chunks.iter().zip(resolutions) {
            if resolution.failed {
                stats.failed_chunks += 1;
            }
            for (&target, resolved) in chunk.targets.iter().zip(resolution.distances) {
                let distance = match resolved {
                    Some(km) => km,
                    None => {
                        stats.fallback_pairs += 1;
                        haversine_km(coords[chunk.origin], coords[target])
                    }
                };
                let weight = distance.max(MIN_EDGE_KM);
                if weight <= max_range_km {
                    adjacency.add_edge(chunk.origin, target, weight);
                } else {
                    stats.gate_rejected += 1;
                }
            }
        }
        stats.edges = adjacency.edge_count();
        debug_assert!(adjacency.is_symmetric());

        info!(
            nodes = stats.nodes,
            candidate_pairs = stats.candidate_pairs,
            chunks = stats.chunks,
            failed_chunks = stats.failed_chunks,
            fallback_pairs = stats.fallback_pairs,
            edges = stats.edges,
            "built road graph"
        );

        Ok(RoadGraph {
            nodes,
            adjacency,
            origin: origin_idx,
            destination: destination_idx,
            stats,
        })
    }

    /// Unordered pairs `(i, j)`, `i < j`, worth a distance query.
    fn candidate_pairs(&self, coords: &[Coordinate], max_range_km: f64) -> Vec<(usize, usize)> {
        let radius = max_range_km * self.options.prefilter_factor;
        match self.options.candidates {
            CandidateStrategy::Prefilter => {
                let mut pairs = Vec::new();
                for i in 0..coords.len() {
                    for j in (i + 1)..coords.len() {
                        if haversine_km(coords[i], coords[j]) <= radius {
                            pairs.push((i, j));
                        }
                    }
                }
                pairs
            }
            CandidateStrategy::Spanner { epsilon } => {
                let spanner = greedy_spanner(coords.len(), &complete_edges(coords), epsilon);
                spanner
                    .edges()
                    .filter(|(_, _, weight)| *weight <= radius)
                    .map(|(u, v, _)| (u, v))
                    .collect()
            }
        }
    }

    /// Group pairs by their lower index into provider-sized chunks, assigning
    /// lanes round-robin.
    fn chunk_pairs(&self, pairs: &[(usize, usize)]) -> Vec<Chunk> {
        let batch = self.provider.max_batch_size().max(1);
        let lanes = self.provider.lanes().max(1);

        let mut by_origin: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(i, j) in pairs {
            by_origin.entry(i).or_default().push(j);
        }

        let mut chunks = Vec::new();
        for (origin, targets) in by_origin {
            for slice in targets.chunks(batch) {
                chunks.push(Chunk {
                    origin,
                    targets: slice.to_vec(),
                    lane: chunks.len() % lanes,
                });
            }
        }
        chunks
    }

    fn resolve_chunks(
        &self,
        coords: &[Coordinate],
        chunks: &[Chunk],
    ) -> Result<Vec<ChunkResolution>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_concurrency.min(chunks.len()))
            .build()
            .map_err(|err| Error::config(format!("failed to start worker pool: {err}")))?;

        Ok(pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| self.resolve_chunk(coords, chunk))
                .collect()
        }))
    }

    fn resolve_chunk(&self, coords: &[Coordinate], chunk: &Chunk) -> ChunkResolution {
        let unresolved = || ChunkResolution {
            distances: vec![None; chunk.targets.len()],
            failed: true,
        };
        if self.cancel.is_cancelled() {
            return unresolved();
        }

        let destinations: Vec<Coordinate> = chunk.targets.iter().map(|&t| coords[t]).collect();
        match self
            .provider
            .batch_distances_in_lane(chunk.lane, coords[chunk.origin], &destinations)
        {
            Ok(distances) if distances.len() == destinations.len() => ChunkResolution {
                distances: distances
                    .into_iter()
                    .map(|d| d.filter(|km| km.is_finite() && *km >= 0.0))
                    .collect(),
                failed: false,
            },
            Ok(distances) => {
                warn!(
                    origin = chunk.origin,
                    expected = destinations.len(),
                    got = distances.len(),
                    "provider returned a short batch, using great-circle distances"
                );
                unresolved()
            }
            Err(err) => {
                warn!(
                    origin = chunk.origin,
                    targets = chunk.targets.len(),
                    error = %err,
                    "chunk resolution failed, using great-circle distances"
                );
                unresolved()
            }
        }
    }
}
