//! ev-route-planner core
//!
//! Minimum-time electric-vehicle routing with charging stops. Candidate
//! stations and trip endpoints become a range-gated road graph whose edges are
//! resolved through a rate-limited, multi-credential distance service; an
//! optional sparsifier prunes the graph before a (node, state-of-charge)
//! search picks the drive and charge actions.

pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod error;
mod float_ord;
pub mod geo;
pub mod graph;
pub mod haversine;
pub mod planner;
pub mod polyline;
pub mod rate_limit;
pub mod retry;
pub mod route_matrix;
pub mod sparsify;
pub mod station;
pub mod traits;
pub mod trip;
pub mod vehicle;

pub use cancel::CancelToken;
pub use config::PlannerSettings;
pub use dispatcher::{CredentialConfig, Dispatcher, DispatcherConfig, StatusPolicy};
pub use error::{DispatchError, Error, ProviderError, Result};
pub use geo::Coordinate;
pub use graph::{Adjacency, GraphBuilder, GraphOptions, Node, NodeRole, RoadGraph, Waypoint};
pub use planner::{Action, PlanOutcome, PlannerConfig, RoutePlan, SearchAlgorithm, plan_route};
pub use station::Station;
pub use traits::{DistanceProvider, StationSource};
pub use trip::{TripOutcome, TripPlanner, TripRequest};
pub use vehicle::VehicleProfile;
