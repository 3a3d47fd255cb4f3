//! Great-circle geometry on (latitude, longitude) pairs in degrees.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(*self, *other)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Geodesic midpoint of the great-circle arc between two points.
pub fn midpoint(a: Coordinate, b: Coordinate) -> Coordinate {
    let (phi1, lambda1) = (a.lat.to_radians(), a.lng.to_radians());
    let (phi2, lambda2) = (b.lat.to_radians(), b.lng.to_radians());

    let bx = phi2.cos() * (lambda2 - lambda1).cos();
    let by = phi2.cos() * (lambda2 - lambda1).sin();
    let phi3 = (phi1.sin() + phi2.sin()).atan2(((phi1.cos() + bx).powi(2) + by * by).sqrt());
    let lambda3 = lambda1 + by.atan2(phi1.cos() + bx);

    Coordinate::new(phi3.to_degrees(), lambda3.to_degrees())
}

/// Distance from `p` to the segment `a`-`b` in kilometers.
///
/// The projection is done on the equirectangular plane, which is accurate
/// enough for segments of a few hundred kilometers; the final distance is
/// measured along the great circle.
pub fn point_segment_distance_km(p: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let (x, y) = (p.lng.to_radians(), p.lat.to_radians());
    let (x1, y1) = (a.lng.to_radians(), a.lat.to_radians());
    let (x2, y2) = (b.lng.to_radians(), b.lat.to_radians());
    let (dx, dy) = (x2 - x1, y2 - y1);

    if dx == 0.0 && dy == 0.0 {
        return haversine_km(p, a);
    }

    let t = (((x - x1) * dx + (y - y1) * dy) / (dx * dx + dy * dy)).clamp(0.0, 1.0);
    let projected = Coordinate::new((y1 + t * dy).to_degrees(), (x1 + t * dx).to_degrees());
    haversine_km(p, projected)
}
