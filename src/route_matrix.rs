//! Route-matrix HTTP adapter for driving distances.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::dispatcher::{DISTANCE_MATRIX, Dispatcher};
use crate::error::ProviderError;
use crate::geo::Coordinate;
use crate::traits::DistanceProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteMatrixConfig {
    pub base_url: String,
    pub path: String,
    /// Routing preference passed through to the provider.
    pub tactics: u32,
    pub max_batch_size: usize,
}

impl Default for RouteMatrixConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.map.baidu.com".to_string(),
            path: "/routematrix/v2/driving".to_string(),
            tactics: 11,
            max_batch_size: 100,
        }
    }
}

/// One-origin, many-destination driving distances through the dispatcher.
#[derive(Debug, Clone)]
pub struct RouteMatrixClient {
    config: RouteMatrixConfig,
    dispatcher: Arc<Dispatcher>,
    cancel: CancelToken,
}

impl RouteMatrixClient {
    pub fn new(config: RouteMatrixConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            cancel: CancelToken::new(),
        }
    }

    /// Abort waits and retries of in-flight requests when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.path
        )
    }

    fn params(&self, origin: Coordinate, destinations: &[Coordinate]) -> Vec<(String, String)> {
        let destinations = destinations
            .iter()
            .map(|c| coord_param(*c))
            .collect::<Vec<_>>()
            .join("|");
        vec![
            ("origins".to_string(), coord_param(origin)),
            ("destinations".to_string(), destinations),
            ("tactics".to_string(), self.config.tactics.to_string()),
            ("output".to_string(), "json".to_string()),
        ]
    }
}

impl DistanceProvider for RouteMatrixClient {
    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size.max(1)
    }

    fn batch_distances(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        self.batch_distances_in_lane(0, origin, destinations)
    }

    fn lanes(&self) -> usize {
        self.dispatcher.usable_credentials(DISTANCE_MATRIX).max(1)
    }

    fn batch_distances_in_lane(
        &self,
        lane: usize,
        origin: Coordinate,
        destinations: &[Coordinate],
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let body = self.dispatcher.fetch_in_lane(
            lane,
            DISTANCE_MATRIX,
            &self.url(),
            &self.params(origin, destinations),
            &self.cancel,
        )?;
        let response: RouteMatrixResponse = serde_json::from_value(body)
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;

        if response.result.len() != destinations.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} results, got {}",
                destinations.len(),
                response.result.len()
            )));
        }

        Ok(response
            .result
            .into_iter()
            .map(|element| {
                element
                    .distance
                    .and_then(|distance| distance.value)
                    .filter(|metres| metres.is_finite() && *metres >= 0.0)
                    .map(|metres| metres / 1000.0)
            })
            .collect())
    }
}

fn coord_param(coordinate: Coordinate) -> String {
    format!("{:.6},{:.6}", coordinate.lat, coordinate.lng)
}

#[derive(Debug, Deserialize)]
struct RouteMatrixResponse {
    #[serde(default)]
    result: Vec<RouteMatrixElement>,
}

#[derive(Debug, Deserialize)]
struct RouteMatrixElement {
    distance: Option<Measure>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    value: Option<f64>,
}
