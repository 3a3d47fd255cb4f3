//! Haversine distance provider (fallback when no routing service is available).
//!
//! Uses great-circle distance, optionally inflated by a detour factor.
//! Less accurate than a road network (ignores roads) but always available.

use crate::error::ProviderError;
use crate::geo::{Coordinate, haversine_km};
use crate::traits::DistanceProvider;

/// Great-circle distances never exceed this many destinations per call.
const DEFAULT_BATCH_SIZE: usize = 100;

/// Haversine-based distance provider.
#[derive(Debug, Clone)]
pub struct HaversineProvider {
    /// Multiplier applied to the great-circle distance (>= 1.0).
    pub detour_factor: f64,
}

impl Default for HaversineProvider {
    fn default() -> Self {
        Self { detour_factor: 1.0 }
    }
}

impl HaversineProvider {
    pub fn new(detour_factor: f64) -> Self {
        Self {
            detour_factor: detour_factor.max(1.0),
        }
    }
}

impl DistanceProvider for HaversineProvider {
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn batch_distances(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        Ok(destinations
            .iter()
            .map(|dest| Some(haversine_km(origin, *dest) * self.detour_factor))
            .collect())
    }
}
