//! Test fixtures for ev-route-planner.
//!
//! Provides realistic test data including:
//! - I-15 corridor charging locations
//! - Mock distance providers with call accounting and failure modes
#![allow(dead_code)]

pub mod i15_corridor;

pub use i15_corridor::*;

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ev_route_planner::error::{DispatchError, ProviderError};
use ev_route_planner::geo::haversine_km;
use ev_route_planner::{CancelToken, Coordinate, DistanceProvider, Station};

pub fn station(location: &Location) -> Station {
    Station::new(location.name, location.coordinate()).with_external_id(location.name)
}

pub fn corridor_stations() -> Vec<Station> {
    CORRIDOR_STATIONS.iter().map(station).collect()
}

/// Stations every `spacing_deg` degrees of latitude north of the equator.
pub fn meridian_stations(count: usize, spacing_deg: f64) -> Vec<Station> {
    (1..=count)
        .map(|i| {
            Station::new(
                format!("s{i}"),
                Coordinate::new(i as f64 * spacing_deg, 0.0),
            )
        })
        .collect()
}

/// Road distances modelled as great-circle distance times a detour factor.
/// Records every call.
pub struct RoadProvider {
    pub detour: f64,
    pub batch_size: usize,
    pub lanes: usize,
    pub calls: AtomicUsize,
    pub destinations: AtomicUsize,
    pub lanes_used: Mutex<Vec<usize>>,
}

impl RoadProvider {
    pub fn new(detour: f64) -> Self {
        Self {
            detour,
            batch_size: 100,
            lanes: 1,
            calls: AtomicUsize::new(0),
            destinations: AtomicUsize::new(0),
            lanes_used: Mutex::new(Vec::new()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn destinations(&self) -> usize {
        self.destinations.load(Ordering::SeqCst)
    }
}

impl DistanceProvider for RoadProvider {
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn batch_distances(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        self.batch_distances_in_lane(0, origin, destinations)
    }

    fn lanes(&self) -> usize {
        self.lanes
    }

    fn batch_distances_in_lane(
        &self,
        lane: usize,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.destinations.fetch_add(destinations.len(), Ordering::SeqCst);
        self.lanes_used.lock().unwrap().push(lane);
        Ok(destinations
            .iter()
            .map(|d| Some(haversine_km(origin, *d) * self.detour))
            .collect())
    }
}

/// Every call fails with a quota error.
pub struct FailingProvider {
    pub calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl DistanceProvider for FailingProvider {
    fn max_batch_size(&self) -> usize {
        2
    }

    fn batch_distances(
        &self,
        _origin: Coordinate,
        _destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::Terminal {
            code: 302,
            message: "daily quota exceeded".to_string(),
        }
        .into())
    }
}

/// Resolves only every other destination, or answers with a short batch.
pub struct PatchyProvider {
    pub short_batches: bool,
}

impl DistanceProvider for PatchyProvider {
    fn max_batch_size(&self) -> usize {
        100
    }

    fn batch_distances(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        let mut distances: Vec<Option<f64>> = destinations
            .iter()
            .enumerate()
            .map(|(i, d)| (i % 2 == 0).then(|| haversine_km(origin, *d) * 2.0))
            .collect();
        if self.short_batches {
            distances.pop();
        }
        Ok(distances)
    }
}

/// Cancels the shared token on its first call.
pub struct CancellingProvider {
    pub token: CancelToken,
}

impl DistanceProvider for CancellingProvider {
    fn max_batch_size(&self) -> usize {
        1
    }

    fn batch_distances(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        self.token.cancel();
        Ok(destinations
            .iter()
            .map(|d| Some(haversine_km(origin, *d)))
            .collect())
    }
}
