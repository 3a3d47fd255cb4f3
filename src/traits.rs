//! Collaborator interfaces the planner core depends on.
//!
//! Concrete apps implement these for their own data sources; the crate ships
//! an HTTP route-matrix client and a great-circle fallback.

use crate::error::ProviderError;
use crate::geo::Coordinate;
use crate::station::Station;

/// Batched point-to-point driving distances.
///
/// Implementations must be shareable across the graph builder's worker
/// threads.
pub trait DistanceProvider: Send + Sync {
    /// Maximum number of destinations accepted by a single call.
    fn max_batch_size(&self) -> usize;

    /// Driving distance in km from `origin` to each destination, in order.
    ///
    /// `None` marks a destination the provider could not resolve; a whole-call
    /// failure is reported as `Err`.
    fn batch_distances(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError>;

    /// Number of independent lanes (for example credentials) requests can be
    /// spread across.
    fn lanes(&self) -> usize {
        1
    }

    /// Same as [`DistanceProvider::batch_distances`], hinting which lane
    /// should carry the request.
    fn batch_distances_in_lane(
        &self,
        _lane: usize,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        self.batch_distances(origin, destinations)
    }
}

/// Candidate charging stations for a trip.
pub trait StationSource {
    fn stations(&self) -> Result<Vec<Station>, ProviderError>;
}

impl StationSource for Vec<Station> {
    fn stations(&self) -> Result<Vec<Station>, ProviderError> {
        Ok(self.clone())
    }
}

impl StationSource for [Station] {
    fn stations(&self) -> Result<Vec<Station>, ProviderError> {
        Ok(self.to_vec())
    }
}
