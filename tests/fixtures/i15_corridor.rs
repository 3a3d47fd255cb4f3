//! Charging locations along the I-15 corridor between Las Vegas and Los
//! Angeles, plus a few off-corridor decoys.
//!
//! Coordinates are approximate town centres, good enough for great-circle
//! tests.

use ev_route_planner::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

// ============================================================================
// Trip endpoints
// ============================================================================

pub const LAS_VEGAS: Location = Location::new("Las Vegas Strip", 36.1147, -115.1728);
pub const LOS_ANGELES: Location = Location::new("Downtown Los Angeles", 34.0522, -118.2437);

// ============================================================================
// Stations on the corridor, north to south
// ============================================================================

pub const CORRIDOR_STATIONS: &[Location] = &[
    Location::new("Primm", 35.6105, -115.3886),
    Location::new("Baker", 35.2656, -116.0742),
    Location::new("Barstow", 34.8958, -117.0173),
    Location::new("Victorville", 34.5362, -117.2928),
    Location::new("Rancho Cucamonga", 34.1064, -117.5931),
];

// ============================================================================
// Stations well away from the corridor
// ============================================================================

pub const OFF_CORRIDOR_STATIONS: &[Location] = &[
    Location::new("Furnace Creek", 36.4622, -116.8669),
    Location::new("Lake Havasu City", 34.4839, -114.3225),
    Location::new("Pahrump", 36.2083, -115.9839),
];
