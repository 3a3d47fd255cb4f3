//! Aggregate planner settings, loadable from JSON.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::{Error, Result};
use crate::graph::GraphOptions;
use crate::haversine::HaversineProvider;
use crate::planner::PlannerConfig;
use crate::route_matrix::{RouteMatrixClient, RouteMatrixConfig};
use crate::sparsify::SparsifyStrategy;
use crate::traits::DistanceProvider;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub graph: GraphOptions,
    pub sparsify: SparsifyStrategy,
    pub planner: PlannerConfig,
    /// Keep only stations within this distance of the trip geometry.
    pub corridor_km: Option<f64>,
    /// Thin a supplied route geometry to every n-th point before the
    /// corridor test; 0 or 1 keeps every point.
    pub route_sample_step: usize,
    /// Credentials for the route-matrix service. Without any, distances are
    /// great-circle estimates.
    pub dispatcher: DispatcherConfig,
    pub route_matrix: RouteMatrixConfig,
}

impl PlannerSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.graph.validate()?;
        self.sparsify.validate()?;
        self.planner.validate()?;
        if let Some(corridor) = self.corridor_km {
            if !corridor.is_finite() || corridor <= 0.0 {
                return Err(Error::config("corridor_km must be positive"));
            }
        }
        if !self.dispatcher.credentials.is_empty() {
            self.dispatcher.validate()?;
        }
        Ok(())
    }

    /// Route-matrix client when credentials are configured, great-circle
    /// distances otherwise. `cancel` interrupts the client's token waits and
    /// retry backoff.
    pub fn distance_provider(&self, cancel: &CancelToken) -> Result<Box<dyn DistanceProvider>> {
        if self.dispatcher.credentials.is_empty() {
            return Ok(Box::new(HaversineProvider::default()));
        }
        let dispatcher = Arc::new(Dispatcher::new(self.dispatcher.clone())?);
        Ok(Box::new(
            RouteMatrixClient::new(self.route_matrix.clone(), dispatcher)
                .with_cancel(cancel.clone()),
        ))
    }
}
