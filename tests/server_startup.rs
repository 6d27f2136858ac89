//! Server Startup Tests
//!
//! Tests for router assembly, configuration handling and startup behavior.

use std::net::TcpListener;

use axum::{body::Body, http::Request};
use tower::util::ServiceExt;

use relay_gateway::config::{RealtimeConfig, RelayTuning};
use relay_gateway::core::relay::TurnDetectionMode;
use relay_gateway::{ServerConfig, routes, state::AppState};

/// Helper function to create a minimal test configuration
fn create_minimal_config(port: u16) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        tls: None,
        openai_api_key: "sk-test".to_string(),
        realtime: RealtimeConfig::default(),
        relay: RelayTuning::default(),
        rate_limit_requests_per_second: 100000, // Disable for tests
        rate_limit_burst_size: 100,
    }
}

/// Find an available port for testing
fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn full_router(config: ServerConfig) -> axum::Router {
    routes::api::create_api_router()
        .merge(routes::relay::create_relay_router())
        .with_state(AppState::new(config))
}

/// Health check answers without any upstream connection
#[tokio::test]
async fn test_health_check() {
    let app = full_router(create_minimal_config(find_available_port()));

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "OK");
}

/// A plain GET on the relay endpoint is not an upgrade and is rejected
#[tokio::test]
async fn test_relay_requires_websocket_upgrade() {
    let app = full_router(create_minimal_config(find_available_port()));

    let request = Request::builder()
        .uri("/ws?raw=true")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = full_router(create_minimal_config(find_available_port()));

    let request = Request::builder()
        .uri("/realtime")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

/// Session settings are derived once from the configuration
#[tokio::test]
async fn test_state_session_settings_follow_config() {
    let mut config = create_minimal_config(find_available_port());
    config.realtime.voice = "cedar".to_string();
    config.realtime.turn_detection = TurnDetectionMode::Manual;
    config.realtime.idle_commit_ms = 900;
    config.relay.audio_lane_capacity = 8;
    config.relay.ping_interval_secs = 3;

    let state = AppState::new(config);
    let settings = state.session_settings();

    assert_eq!(settings.upstream.voice, "cedar");
    assert_eq!(settings.upstream.turn_detection, TurnDetectionMode::Manual);
    assert_eq!(settings.upstream.idle_commit.as_millis(), 900);
    assert_eq!(settings.lanes.audio, 8);
    assert_eq!(settings.keepalive.ping_interval.as_secs(), 3);
}

#[tokio::test]
async fn test_rate_limit_configurations() {
    let port = find_available_port();

    let mut config = create_minimal_config(port);
    config.rate_limit_requests_per_second = 100;
    config.rate_limit_burst_size = 50;
    let app_state = AppState::new(config);
    assert_eq!(app_state.config.rate_limit_requests_per_second, 100);

    let app_state2 = AppState::new(create_minimal_config(port + 1));
    assert!(app_state2.config.rate_limit_requests_per_second >= 100000);
}

#[test]
fn test_config_address() {
    let config = create_minimal_config(9123);
    assert_eq!(config.address(), "127.0.0.1:9123");
    assert!(!config.is_tls_enabled());
}

/// Upstream dial failures are reported without a live service
#[tokio::test]
async fn test_upstream_dial_failure() {
    let port = find_available_port();
    let mut config = create_minimal_config(port);
    config.realtime.url = format!("ws://127.0.0.1:{port}/v1/realtime");

    let settings = config.session_settings();
    let result =
        relay_gateway::core::relay::openai::connect(&settings.upstream, &config.openai_api_key)
            .await;
    assert!(matches!(
        result,
        Err(relay_gateway::RelayError::UpstreamConnect(_))
    ));
}
