//! End-to-end trip planning: stations, graph, sparsifier, planner.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::config::PlannerSettings;
use crate::error::{Error, Result};
use crate::graph::{GraphBuilder, RoadGraph, Waypoint};
use crate::planner::{PlanOutcome, plan_route};
use crate::polyline::Polyline;
use crate::sparsify::sparsify;
use crate::station::{dedupe_stations, filter_corridor};
use crate::traits::{DistanceProvider, StationSource};
use crate::vehicle::VehicleProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub origin: Waypoint,
    pub destination: Waypoint,
    pub vehicle: VehicleProfile,
    /// Driving geometry used for the station corridor; the straight
    /// origin-destination segment when absent.
    #[serde(default)]
    pub route: Option<Polyline>,
}

impl TripRequest {
    pub fn new(origin: Waypoint, destination: Waypoint, vehicle: VehicleProfile) -> Self {
        Self {
            origin,
            destination,
            vehicle,
            route: None,
        }
    }

    pub fn with_route(mut self, route: Polyline) -> Self {
        self.route = Some(route);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TripOutcome {
    /// The graph the planner searched, after sparsification.
    pub graph: RoadGraph,
    pub outcome: PlanOutcome,
}

impl TripOutcome {
    /// Node names along the planned route.
    pub fn stop_names(&self) -> Vec<&str> {
        self.outcome
            .plan()
            .map(|plan| {
                plan.nodes
                    .iter()
                    .map(|&index| self.graph.nodes[index].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct TripPlanner<'a> {
    provider: &'a dyn DistanceProvider,
    stations: &'a dyn StationSource,
    settings: PlannerSettings,
}

impl<'a> TripPlanner<'a> {
    pub fn new(
        provider: &'a dyn DistanceProvider,
        stations: &'a dyn StationSource,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            provider,
            stations,
            settings,
        }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn plan(&self, request: &TripRequest, cancel: &CancelToken) -> Result<TripOutcome> {
        request.vehicle.validate()?;
        self.settings.validate()?;

        let stations = match self.stations.stations() {
            Ok(stations) => stations,
            Err(err) => {
                warn!(error = %err, "station source failed, planning without stations");
                Vec::new()
            }
        };
        let fetched = stations.len();
        let mut stations = dedupe_stations(stations);
        if let Some(corridor_km) = self.settings.corridor_km {
            let route = match &request.route {
                Some(route) => route.sample(self.settings.route_sample_step),
                None => {
                    Polyline::segment(request.origin.coordinate, request.destination.coordinate)
                }
            };
            stations = filter_corridor(stations, &route, corridor_km);
        }
        info!(fetched, candidates = stations.len(), "collected candidate stations");

        let mut graph = GraphBuilder::new(self.provider, self.settings.graph.clone())
            .with_cancel(cancel.clone())
            .build(
                &stations,
                Some(&request.origin),
                Some(&request.destination),
                request.vehicle.max_range_km(),
            )?;
        graph.adjacency = sparsify(&graph, &self.settings.sparsify);

        let (Some(origin), Some(destination)) = (graph.origin, graph.destination) else {
            return Err(Error::config("graph is missing its trip endpoints"));
        };
        let outcome = plan_route(
            &graph.nodes,
            &graph.adjacency,
            &request.vehicle,
            &self.settings.planner,
            origin,
            destination,
        )?;
        Ok(TripOutcome { graph, outcome })
    }
}
