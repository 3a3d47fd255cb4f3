//! Minimum-time EV routing over (node, state-of-charge) states.
//!
//! A state is a node, a SOC bucket (percent, a multiple of the configured
//! step) and whether the vehicle already charged at this stop. Driving an
//! edge costs its travel time and floors the remaining charge to the step;
//! charging raises the charge to any higher bucket at a cost given by
//! [`charge_time_minutes`]. Any node can charge unless
//! [`PlannerConfig::stations_only`] restricts charging to station nodes.
//! Each stop allows one charging session.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::float_ord::FloatOrd;
use crate::geo::haversine_km;
use crate::graph::{Adjacency, Node};
use crate::sparsify::shortest_distance;
use crate::vehicle::VehicleProfile;

/// Chargers below this output are modelled at this output.
pub const MIN_CHARGER_KW: f64 = 10.0;

/// Charge time grows by this fraction per 100 percentage points charged.
pub const CHARGE_TAPER: f64 = 0.04;

/// Slack for floating-point drift in energy and cost comparisons.
const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchAlgorithm {
    #[default]
    Dijkstra,
    AStar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// SOC discretization in percent; must divide 100.
    pub soc_step_percent: u32,
    /// Multiplier on the A* travel-time estimate. Values above 1 trade
    /// optimality for fewer explored states.
    pub heuristic_scale: f64,
    /// Used at nodes that do not report their own charger output.
    pub charger_power_kw: f64,
    /// Offer charging only at station nodes.
    pub stations_only: bool,
    pub algorithm: SearchAlgorithm,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            soc_step_percent: 5,
            heuristic_scale: 1.0,
            charger_power_kw: 120.0,
            stations_only: false,
            algorithm: SearchAlgorithm::Dijkstra,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.soc_step_percent == 0 || 100 % self.soc_step_percent != 0 {
            return Err(Error::config(format!(
                "soc_step_percent must divide 100, got {}",
                self.soc_step_percent
            )));
        }
        if !self.heuristic_scale.is_finite() || self.heuristic_scale < 0.0 {
            return Err(Error::config("heuristic_scale must be non-negative"));
        }
        if !self.charger_power_kw.is_finite() || self.charger_power_kw <= 0.0 {
            return Err(Error::config("charger_power_kw must be positive"));
        }
        Ok(())
    }
}

/// Minutes to add `energy_kwh` (`delta_percent` of the battery) on a charger
/// of `charger_kw`.
pub fn charge_time_minutes(energy_kwh: f64, delta_percent: f64, charger_kw: f64) -> f64 {
    let base = energy_kwh / charger_kw.max(MIN_CHARGER_KW) * 60.0;
    base * (1.0 + CHARGE_TAPER * delta_percent / 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Drive {
        from: usize,
        to: usize,
        distance_km: f64,
        minutes: f64,
        energy_kwh: f64,
        soc_before: u32,
        soc_after: u32,
    },
    Charge {
        node: usize,
        soc_before: u32,
        soc_after: u32,
        energy_kwh: f64,
        minutes: f64,
        charger_kw: f64,
    },
}

impl Action {
    pub fn minutes(&self) -> f64 {
        match self {
            Action::Drive { minutes, .. } | Action::Charge { minutes, .. } => *minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    pub actions: Vec<Action>,
    /// Nodes in visiting order, starting at the origin.
    pub nodes: Vec<usize>,
    pub charging_stops: Vec<usize>,
    pub total_minutes: f64,
    pub drive_minutes: f64,
    pub charge_minutes: f64,
    pub distance_km: f64,
    pub energy_used_kwh: f64,
    pub energy_charged_kwh: f64,
    pub final_soc_percent: u32,
    pub explored_states: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoRoute {
    pub explored_states: usize,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Found(RoutePlan),
    NoRoute(NoRoute),
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<&RoutePlan> {
        match self {
            PlanOutcome::Found(plan) => Some(plan),
            PlanOutcome::NoRoute(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, PlanOutcome::Found(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct State {
    node: usize,
    soc: u32,
    charged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Record {
    g: f64,
    parent: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchEntry {
    priority: FloatOrd,
    g: FloatOrd,
    state: usize,
}

impl Ord for SearchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.state.cmp(&self.state))
    }
}

impl PartialOrd for SearchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Arena of lazily created states; indices are stable for the search.
#[derive(Default)]
struct StateSpace {
    index: HashMap<State, usize>,
    states: Vec<State>,
    records: Vec<Record>,
}

impl StateSpace {
    /// Record `g` for `state` if it improves on the best known cost.
    fn relax(&mut self, state: State, g: f64, parent: Option<usize>) -> Option<usize> {
        match self.index.get(&state) {
            Some(&id) if g + TOLERANCE < self.records[id].g => {
                self.records[id] = Record { g, parent };
                Some(id)
            }
            Some(_) => None,
            None => {
                let id = self.states.len();
                self.index.insert(state, id);
                self.states.push(state);
                self.records.push(Record { g, parent });
                Some(id)
            }
        }
    }
}

/// Plan the minimum-time route from `start` to `goal`.
pub fn plan_route(
    nodes: &[Node],
    adjacency: &Adjacency,
    vehicle: &VehicleProfile,
    config: &PlannerConfig,
    start: usize,
    goal: usize,
) -> Result<PlanOutcome> {
    vehicle.validate()?;
    config.validate()?;
    if nodes.len() != adjacency.len() {
        return Err(Error::config(format!(
            "graph has {} nodes but adjacency covers {}",
            nodes.len(),
            adjacency.len()
        )));
    }
    for index in [start, goal] {
        if index >= nodes.len() {
            return Err(Error::NodeOutOfRange {
                index,
                len: nodes.len(),
            });
        }
    }

    let search = Search {
        nodes,
        adjacency,
        vehicle,
        config,
        goal,
    };
    let outcome = search.run(start);
    match &outcome {
        PlanOutcome::Found(plan) => info!(
            algorithm = ?config.algorithm,
            explored_states = plan.explored_states,
            total_minutes = plan.total_minutes,
            charging_stops = plan.charging_stops.len(),
            "route planned"
        ),
        PlanOutcome::NoRoute(no_route) => info!(
            algorithm = ?config.algorithm,
            explored_states = no_route.explored_states,
            hint = %no_route.hint,
            "no feasible route"
        ),
    }
    Ok(outcome)
}

struct Search<'a> {
    nodes: &'a [Node],
    adjacency: &'a Adjacency,
    vehicle: &'a VehicleProfile,
    config: &'a PlannerConfig,
    goal: usize,
}

impl Search<'_> {
    fn run(&self, start: usize) -> PlanOutcome {
        let step = self.config.soc_step_percent;
        let initial = floor_to_step(self.vehicle.initial_soc_percent, step);
        let start_state = State {
            node: start,
            soc: initial,
            charged: false,
        };

        let mut space = StateSpace::default();
        let mut queue = BinaryHeap::new();
        if let Some(id) = space.relax(start_state, 0.0, None) {
            queue.push(self.entry(id, start, 0.0));
        }
        let mut explored = 0;

        while let Some(entry) = queue.pop() {
            let id = entry.state;
            let g = entry.g.0;
            if g > space.records[id].g + TOLERANCE {
                continue;
            }
            explored += 1;
            let state = space.states[id];
            if state.node == self.goal {
                return PlanOutcome::Found(self.reconstruct(&space, id, explored));
            }

            for (next, distance_km) in self.adjacency.neighbours(state.node) {
                let need = self.vehicle.energy_percent(distance_km);
                if f64::from(state.soc) + TOLERANCE < need {
                    continue;
                }
                let next_state = State {
                    node: next,
                    soc: floor_to_step(f64::from(state.soc) - need, step),
                    charged: false,
                };
                let next_g = g + self.vehicle.drive_minutes(distance_km);
                if let Some(next_id) = space.relax(next_state, next_g, Some(id)) {
                    queue.push(self.entry(next_id, next, next_g));
                }
            }

            let node = &self.nodes[state.node];
            if self.can_charge(node) && !state.charged {
                let charger_kw = self.charger_kw(node);
                let mut target = state.soc + step;
                while target <= 100 {
                    let delta = f64::from(target - state.soc);
                    let energy = delta / 100.0 * self.vehicle.battery_kwh;
                    let next_g = g + charge_time_minutes(energy, delta, charger_kw);
                    let next_state = State {
                        node: state.node,
                        soc: target,
                        charged: true,
                    };
                    if let Some(next_id) = space.relax(next_state, next_g, Some(id)) {
                        queue.push(self.entry(next_id, state.node, next_g));
                    }
                    target += step;
                }
            }
        }

        PlanOutcome::NoRoute(NoRoute {
            explored_states: explored,
            hint: self.no_route_hint(start),
        })
    }

    fn entry(&self, state: usize, node: usize, g: f64) -> SearchEntry {
        SearchEntry {
            priority: FloatOrd(g + self.heuristic(node)),
            g: FloatOrd(g),
            state,
        }
    }

    /// Great-circle travel time to the goal, scaled.
    fn heuristic(&self, node: usize) -> f64 {
        match self.config.algorithm {
            SearchAlgorithm::Dijkstra => 0.0,
            SearchAlgorithm::AStar => {
                let km = haversine_km(
                    self.nodes[node].coordinate,
                    self.nodes[self.goal].coordinate,
                );
                self.vehicle.drive_minutes(km) * self.config.heuristic_scale
            }
        }
    }

    fn can_charge(&self, node: &Node) -> bool {
        !self.config.stations_only || node.is_station()
    }

    fn charger_kw(&self, node: &Node) -> f64 {
        node.charger_kw
            .filter(|kw| kw.is_finite() && *kw > 0.0)
            .unwrap_or(self.config.charger_power_kw)
    }

    fn reconstruct(&self, space: &StateSpace, terminal: usize, explored: usize) -> RoutePlan {
        let mut chain = vec![terminal];
        let mut current = terminal;
        while let Some(parent) = space.records[current].parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();

        let mut actions = Vec::with_capacity(chain.len().saturating_sub(1));
        for pair in chain.windows(2) {
            let (before, after) = (space.states[pair[0]], space.states[pair[1]]);
            if before.node == after.node {
                let delta = f64::from(after.soc - before.soc);
                let energy_kwh = delta / 100.0 * self.vehicle.battery_kwh;
                let charger_kw = self.charger_kw(&self.nodes[before.node]);
                actions.push(Action::Charge {
                    node: before.node,
                    soc_before: before.soc,
                    soc_after: after.soc,
                    energy_kwh,
                    minutes: charge_time_minutes(energy_kwh, delta, charger_kw),
                    charger_kw,
                });
            } else {
                let distance_km = self
                    .adjacency
                    .weight(before.node, after.node)
                    .unwrap_or_default();
                actions.push(Action::Drive {
                    from: before.node,
                    to: after.node,
                    distance_km,
                    minutes: self.vehicle.drive_minutes(distance_km),
                    energy_kwh: distance_km * self.vehicle.consumption_kwh_per_km,
                    soc_before: before.soc,
                    soc_after: after.soc,
                });
            }
        }

        let first = space.states[chain[0]].node;
        let mut plan = RoutePlan {
            actions: Vec::new(),
            nodes: vec![first],
            charging_stops: Vec::new(),
            total_minutes: space.records[terminal].g,
            drive_minutes: 0.0,
            charge_minutes: 0.0,
            distance_km: 0.0,
            energy_used_kwh: 0.0,
            energy_charged_kwh: 0.0,
            final_soc_percent: space.states[terminal].soc,
            explored_states: explored,
        };
        for action in &actions {
            match *action {
                Action::Drive {
                    to,
                    distance_km,
                    minutes,
                    energy_kwh,
                    ..
                } => {
                    plan.nodes.push(to);
                    plan.drive_minutes += minutes;
                    plan.distance_km += distance_km;
                    plan.energy_used_kwh += energy_kwh;
                }
                Action::Charge {
                    node,
                    minutes,
                    energy_kwh,
                    ..
                } => {
                    plan.charging_stops.push(node);
                    plan.charge_minutes += minutes;
                    plan.energy_charged_kwh += energy_kwh;
                }
            }
        }
        debug!(actions = actions.len(), "reconstructed route");
        plan.actions = actions;
        plan
    }

    fn no_route_hint(&self, start: usize) -> String {
        if shortest_distance(self.adjacency, start, self.goal, f64::INFINITY).is_none() {
            return "origin and destination are not connected within range; \
                    increase charger density or max range"
                .to_string();
        }
        if self.config.stations_only && !self.nodes.iter().any(Node::is_station) {
            return "no charging stations available; add stations along the route".to_string();
        }
        "destination unreachable on available charge; increase charger density \
         or initial state of charge"
            .to_string()
    }
}

/// Largest multiple of `step` not above `percent`, clamped to 0-100.
fn floor_to_step(percent: f64, step: u32) -> u32 {
    let buckets = (percent / f64::from(step) + TOLERANCE).floor().max(0.0) as u32;
    (buckets * step).min(100)
}
