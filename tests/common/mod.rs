// SPDX-License-Identifier: MIT

//! Shared test helpers: a stub Mapbox server plus app construction.
//!
//! The stub serves the four upstream endpoints the engine talks to
//! (isochrone, geocoding, directions, map matching) with deterministic
//! synthetic data derived from the request coordinates, so integration tests
//! exercise the full client plumbing without the network.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::Arc;
use tower::ServiceExt;

use walkloop::config::Config;
use walkloop::AppState;

/// Toggles for upstream failure modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockOptions {
    pub fail_isochrone: bool,
    pub empty_isochrone: bool,
    pub fail_geocoding: bool,
    pub empty_poi_search: bool,
    pub fail_matching: bool,
}

/// Spawn the stub Mapbox server and return its base URL.
pub async fn spawn_mock_mapbox(options: MockOptions) -> String {
    let app = Router::new()
        .route("/isochrone/v1/mapbox/walking/{coords}", get(isochrone))
        .route("/geocoding/v5/mapbox.places/{query}", get(geocoding))
        .route("/directions/v5/mapbox/walking/{coords}", get(directions))
        .route("/matching/v5/mapbox/walking/{coords}", get(matching))
        .with_state(options);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(axum::serve(listener, app).into_future());

    format!("http://{}", addr)
}

fn parse_lng_lat(path: &str) -> (f64, f64) {
    let trimmed = path.trim_end_matches(".json");
    let mut parts = trimmed.split(',');
    let lng = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0.0);
    let lat = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0.0);
    (lng, lat)
}

/// 36-point boundary ring, ~0.005 degrees around the requested center.
async fn isochrone(
    State(options): State<MockOptions>,
    Path(coords): Path<String>,
) -> impl IntoResponse {
    if options.fail_isochrone {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "boom"})));
    }
    if options.empty_isochrone {
        return (
            StatusCode::OK,
            Json(json!({"type": "FeatureCollection", "features": []})),
        );
    }

    let (lng, lat) = parse_lng_lat(&coords);
    let ring: Vec<[f64; 2]> = (0..36)
        .map(|i| {
            let theta = i as f64 / 36.0 * std::f64::consts::TAU;
            [lng + 0.005 * theta.cos(), lat + 0.005 * theta.sin()]
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": { "type": "Polygon", "coordinates": [ring] },
                "properties": { "contour": 7 }
            }]
        })),
    )
}

/// Reverse lookups return a synthetic address; "dog park" forward searches
/// return one POI placed at the proximity coordinate.
async fn geocoding(
    State(options): State<MockOptions>,
    Path(query): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if options.fail_geocoding {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "boom"})));
    }

    let is_forward_search = params.contains_key("proximity");
    if is_forward_search {
        if options.empty_poi_search {
            return (StatusCode::OK, Json(json!({"features": []})));
        }
        let (lng, lat) = params
            .get("proximity")
            .map(|p| parse_lng_lat(p))
            .unwrap_or((0.0, 0.0));
        return (
            StatusCode::OK,
            Json(json!({
                "features": [{
                    "text": "Dog Park Central",
                    "place_name": "Dog Park Central, Testville",
                    "place_type": ["poi"],
                    "center": [lng, lat]
                }]
            })),
        );
    }

    let (lng, lat) = parse_lng_lat(&query);
    (
        StatusCode::OK,
        Json(json!({
            "features": [{
                "text": "Rue de Test",
                "place_name": "Rue de Test, Testville",
                "place_type": ["address"],
                "center": [lng, lat]
            }]
        })),
    )
}

/// Straight-line walking route between the requested coordinates.
async fn directions(Path(coords): Path<String>) -> impl IntoResponse {
    let points: Vec<(f64, f64)> = coords.split(';').map(parse_lng_lat).collect();
    let line = geo::LineString::from(points.clone());
    let encoded = polyline::encode_coordinates(line, 5).expect("encode polyline");

    // Rough walking cost: 1.11e5 m per degree, 1.25 m/s
    let distance: f64 = points
        .windows(2)
        .map(|w| {
            let dx = w[1].0 - w[0].0;
            let dy = w[1].1 - w[0].1;
            dx.hypot(dy) * 111_000.0
        })
        .sum();

    (
        StatusCode::OK,
        Json(json!({
            "routes": [{
                "geometry": encoded,
                "distance": distance,
                "duration": distance / 1.25
            }]
        })),
    )
}

/// Snap echoes the requested coordinate back as the matched point.
async fn matching(
    State(options): State<MockOptions>,
    Path(coords): Path<String>,
) -> impl IntoResponse {
    if options.fail_matching {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "boom"})));
    }

    let (lng, lat) = parse_lng_lat(&coords);
    let line = geo::LineString::from(vec![(lng, lat), (lng, lat)]);
    let encoded = polyline::encode_coordinates(line, 5).expect("encode polyline");

    (
        StatusCode::OK,
        Json(json!({ "matchings": [{ "geometry": encoded }] })),
    )
}

// ─── App construction ────────────────────────────────────────

/// Create a test app wired to a stub Mapbox server.
#[allow(dead_code)]
pub async fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with(MockOptions::default()).await
}

/// Create a test app with specific upstream failure modes.
#[allow(dead_code)]
pub async fn create_test_app_with(options: MockOptions) -> (Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.mapbox_base_url = spawn_mock_mapbox(options).await;

    let state = Arc::new(AppState::from_config(config));
    (walkloop::routes::create_router(state.clone()), state)
}

// ─── Request helpers ─────────────────────────────────────────

/// POST a JSON body and return (status, parsed response body).
#[allow(dead_code)]
pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// GET and return (status, parsed response body).
#[allow(dead_code)]
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// GET and return (status, raw body text).
#[allow(dead_code)]
pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

/// Create a walk and return its id.
#[allow(dead_code)]
pub async fn create_walk(app: &Router, user_id: u64, sociable: bool) -> u64 {
    let (status, body) = post_json(
        app,
        "/api/walks",
        json!({ "user_id": user_id, "sociable": sociable }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["walk_id"].as_u64().expect("walk_id in response")
}

/// Push a GPS position for a user on a walk.
#[allow(dead_code)]
pub async fn push_position(app: &Router, user_id: u64, walk_id: u64, lng: f64, lat: f64) {
    let (status, _) = post_json(
        app,
        "/api/positions",
        json!({
            "user_id": user_id,
            "walk_id": walk_id,
            "latitude": lat,
            "longitude": lng,
            "route_progress_index": 0
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
