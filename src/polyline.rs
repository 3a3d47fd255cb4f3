//! Polyline representation for route geometries.
//!
//! Used to keep candidate stations inside a corridor around the trip and to
//! thin dense route geometries before they are used as search anchors.

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, point_segment_distance_km};

/// A polyline representing a route geometry as decoded coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Two-point polyline along the straight segment between `from` and `to`.
    pub fn segment(from: Coordinate, to: Coordinate) -> Self {
        Self::new(vec![from, to])
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    /// Every `step`-th point, always ending with the last point.
    pub fn sample(&self, step: usize) -> Polyline {
        if step <= 1 || self.points.len() <= 2 {
            return self.clone();
        }
        let mut sampled: Vec<Coordinate> = self.points.iter().step_by(step).copied().collect();
        if let Some(last) = self.points.last() {
            if sampled.last() != Some(last) {
                sampled.push(*last);
            }
        }
        Polyline::new(sampled)
    }

    /// Shortest distance from `point` to any segment of the polyline, in km.
    ///
    /// A single-point polyline measures to that point; an empty one returns
    /// `None`.
    pub fn distance_to_km(&self, point: Coordinate) -> Option<f64> {
        match self.points.as_slice() {
            [] => None,
            [only] => Some(only.distance_km(&point)),
            points => points
                .windows(2)
                .map(|pair| point_segment_distance_km(point, pair[0], pair[1]))
                .min_by(|a, b| a.total_cmp(b)),
        }
    }

    pub fn within_corridor(&self, point: Coordinate, half_width_km: f64) -> bool {
        self.distance_to_km(point)
            .is_some_and(|distance| distance <= half_width_km)
    }
}
