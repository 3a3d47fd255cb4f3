//! Route-matrix client against a mock provider, alone and inside a graph
//! build.

mod fixtures;

use std::sync::Arc;

use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ev_route_planner::dispatcher::DISTANCE_MATRIX;
use ev_route_planner::retry::RetryPolicy;
use ev_route_planner::route_matrix::{RouteMatrixClient, RouteMatrixConfig};
use ev_route_planner::{
    Coordinate, CredentialConfig, DispatchError, Dispatcher, DispatcherConfig, DistanceProvider,
    GraphBuilder, GraphOptions, ProviderError, Waypoint,
};

use fixtures::*;

struct Harness {
    server: MockServer,
    runtime: Runtime,
}

impl Harness {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn request_count(&self) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    fn client(&self, keys: &[&str]) -> RouteMatrixClient {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            credentials: keys
                .iter()
                .map(|key| CredentialConfig::new(*key).with_limit(DISTANCE_MATRIX, 50.0))
                .collect(),
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 5,
                max_delay_ms: 10,
                jitter: 0.0,
                max_elapsed_secs: 5,
            },
            poll_interval_ms: 5,
            ..DispatcherConfig::default()
        })
        .unwrap();
        RouteMatrixClient::new(
            RouteMatrixConfig {
                base_url: self.server.uri(),
                ..RouteMatrixConfig::default()
            },
            Arc::new(dispatcher),
        )
    }
}

fn element(metres: f64) -> serde_json::Value {
    json!({
        "distance": {"text": format!("{:.1}公里", metres / 1000.0), "value": metres},
        "duration": {"text": "1小时", "value": 3600}
    })
}

fn json_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

#[test]
fn test_parses_distances_in_kilometres() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/routematrix/v2/driving"))
            .and(query_param("origins", "39.100000,117.200000"))
            .and(query_param("destinations", "39.000000,117.000000|39.500000,117.500000"))
            .and(query_param("tactics", "11"))
            .and(query_param("output", "json"))
            .and(query_param("ak", "key-a"))
            .respond_with(json_response(json!({
                "status": 0,
                "message": "成功",
                "result": [element(23_400.0), element(61_000.0)]
            }))),
    );

    let client = harness.client(&["key-a"]);
    let distances = client
        .batch_distances(
            Coordinate::new(39.1, 117.2),
            &[Coordinate::new(39.0, 117.0), Coordinate::new(39.5, 117.5)],
        )
        .unwrap();

    assert_eq!(distances, vec![Some(23.4), Some(61.0)]);
}

#[test]
fn test_missing_entries_are_unresolved() {
    let harness = Harness::start();
    harness.mount(Mock::given(method("GET")).respond_with(json_response(json!({
        "status": 0,
        "result": [element(5_000.0), {"distance": null}, {"distance": {"text": ""}}]
    }))));

    let client = harness.client(&["key-a"]);
    let destinations = [Coordinate::new(1.0, 1.0); 3];
    let distances = client
        .batch_distances(Coordinate::new(0.0, 0.0), &destinations)
        .unwrap();
    assert_eq!(distances, vec![Some(5.0), None, None]);
}

#[test]
fn test_result_length_mismatch_is_malformed() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .respond_with(json_response(json!({"status": 0, "result": [element(1.0)]}))),
    );

    let client = harness.client(&["key-a"]);
    let err = client
        .batch_distances(
            Coordinate::new(0.0, 0.0),
            &[Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0)],
        )
        .unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}

#[test]
fn test_quota_error_surfaces_as_terminal() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .respond_with(json_response(json!({"status": 4, "message": "quota"}))),
    );

    let client = harness.client(&["key-a"]);
    let err = client
        .batch_distances(Coordinate::new(0.0, 0.0), &[Coordinate::new(1.0, 1.0)])
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Dispatch(DispatchError::Terminal { code: 4, .. })
    ));
    assert_eq!(client.lanes(), 1);
}

#[test]
fn test_lanes_follow_credentials() {
    let harness = Harness::start();
    assert_eq!(harness.client(&["a", "b", "c"]).lanes(), 3);
}

#[test]
fn test_graph_build_survives_exhausted_quota() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .respond_with(json_response(json!({"status": 302, "message": "quota"}))),
    );

    let client = harness.client(&["key-a"]);
    let origin = Waypoint::new(LAS_VEGAS.name, LAS_VEGAS.coordinate());
    let destination = Waypoint::new(LOS_ANGELES.name, LOS_ANGELES.coordinate());
    let options = GraphOptions {
        max_concurrency: 1,
        ..GraphOptions::default()
    };
    let graph = GraphBuilder::new(&client, options)
        .build(&corridor_stations(), Some(&origin), Some(&destination), 200.0)
        .unwrap();

    // The first terminal answer disables the only credential; every other
    // chunk fails fast without touching the network.
    assert_eq!(harness.request_count(), 1);
    assert_eq!(graph.stats.failed_chunks, graph.stats.chunks);
    assert_eq!(graph.stats.fallback_pairs, graph.stats.candidate_pairs);
    assert!(graph.adjacency.edge_count() > 0);
}

#[test]
fn test_graph_build_uses_resolved_distances() {
    let harness = Harness::start();
    harness.mount(Mock::given(method("GET")).respond_with(|request: &wiremock::Request| {
        let count = request
            .url
            .query_pairs()
            .find(|(name, _)| name == "destinations")
            .map(|(_, value)| value.split('|').count())
            .unwrap_or(0);
        let result: Vec<_> = (0..count).map(|_| element(42_000.0)).collect();
        json_response(json!({"status": 0, "result": result}))
    }));

    let client = harness.client(&["key-a", "key-b"]);
    let graph = GraphBuilder::new(&client, GraphOptions::default())
        .build(&corridor_stations(), None, None, 200.0)
        .unwrap();

    assert_eq!(graph.stats.failed_chunks, 0);
    assert_eq!(graph.stats.fallback_pairs, 0);
    assert!(graph.adjacency.edges().all(|(_, _, w)| (w - 42.0).abs() < 1e-9));
}
