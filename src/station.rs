//! Candidate charging stations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::polyline::Polyline;

/// A charging station as reported by a station source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub coordinate: Coordinate,
    /// Stable identifier assigned by the source, used for de-duplication.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Charger output; the planner's configured power is used when absent.
    #[serde(default)]
    pub charger_kw: Option<f64>,
}

impl Station {
    pub fn new(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinate,
            external_id: None,
            address: None,
            charger_kw: None,
        }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_charger_kw(mut self, kw: f64) -> Self {
        self.charger_kw = Some(kw);
        self
    }

    /// Key used to recognise the same station reported twice.
    pub fn dedupe_key(&self) -> String {
        match &self.external_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => location_key(self.coordinate),
        }
    }
}

/// Keep the first occurrence of every station, preserving input order.
pub fn dedupe_stations(stations: Vec<Station>) -> Vec<Station> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(stations.len());
    for station in stations {
        if seen.insert(station.dedupe_key()) {
            unique.push(station);
        }
    }
    unique
}

/// Stations within `half_width_km` of the route geometry.
pub fn filter_corridor(
    stations: Vec<Station>,
    route: &Polyline,
    half_width_km: f64,
) -> Vec<Station> {
    stations
        .into_iter()
        .filter(|station| route.within_corridor(station.coordinate, half_width_km))
        .collect()
}

fn location_key(location: Coordinate) -> String {
    format!("{:.6},{:.6}", location.lat, location.lng)
}
