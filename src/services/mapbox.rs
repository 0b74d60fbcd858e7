// SPDX-License-Identifier: MIT

//! Mapbox API client for the four geo queries the engine depends on.
//!
//! Handles:
//! - Isochrone polygons (walking reachability)
//! - Reverse/forward geocoding (place enrichment, POI search)
//! - Walking directions between ordered coordinates
//! - Map matching (snap a point onto the nearest traversable path)
//!
//! Every call carries the configured timeout and is cancellable by dropping
//! the future. Structural failures surface as `AppError::Upstream`; the
//! cosmetic callers (enrichment, snapping) decide their own degradation.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::coordinate::coordinate_list_from_json;
use crate::models::Coordinate;

/// Upstream ceiling on directions waypoints. Exceeding it is the caller's
/// problem to resolve (downsample or split) so fidelity loss stays a caller
/// decision.
pub const MAX_DIRECTIONS_WAYPOINTS: usize = 25;

const GEOCODING_TYPES: &str = "poi,address,neighborhood";

/// Mapbox API client.
#[derive(Clone)]
pub struct MapboxClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl MapboxClient {
    /// Create a new client. `base_url` is overridable so tests can target a
    /// stub server.
    pub fn new(token: String, base_url: String, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    // ─── Isochrone ───────────────────────────────────────────────

    /// Outer boundary ring of the area walkable within `minutes` from
    /// `center`. An empty or missing polygon is a structural failure.
    pub async fn isochrone(
        &self,
        center: Coordinate,
        minutes: u32,
    ) -> Result<Vec<Coordinate>, AppError> {
        let url = format!(
            "{}/isochrone/v1/mapbox/walking/{},{}",
            self.base_url, center.lng, center.lat
        );

        let response: IsochroneResponse = self
            .get_json(
                &url,
                &[
                    ("contours_minutes", minutes.to_string()),
                    ("polygons", "true".to_string()),
                ],
            )
            .await?;

        let outer_ring = response
            .features
            .first()
            .and_then(|f| f.geometry.coordinates.get(0))
            .ok_or_else(|| AppError::Upstream("isochrone returned no polygon".to_string()))?;

        let ring = coordinate_list_from_json(outer_ring)
            .map_err(|e| AppError::Upstream(format!("isochrone ring unusable: {}", e)))?;

        if ring.is_empty() {
            return Err(AppError::Upstream("isochrone polygon is empty".to_string()));
        }

        Ok(ring)
    }

    // ─── Geocoding ───────────────────────────────────────────────

    /// Nearest named place to a coordinate (poi, address or neighborhood).
    pub async fn reverse_geocode(&self, coord: Coordinate) -> Result<Option<Place>, AppError> {
        let url = format!(
            "{}/geocoding/v5/mapbox.places/{},{}.json",
            self.base_url, coord.lng, coord.lat
        );

        let response: GeocodingResponse = self
            .get_json(
                &url,
                &[
                    ("types", GEOCODING_TYPES.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        Ok(response.features.into_iter().next().map(Place::from))
    }

    /// Find a place matching `query` near a location (e.g. a dog park near a
    /// meeting midpoint). Returns the closest hit, if any.
    pub async fn search_poi(
        &self,
        query: &str,
        near: Coordinate,
        radius_meters: u32,
    ) -> Result<Option<Place>, AppError> {
        let url = format!(
            "{}/geocoding/v5/mapbox.places/{}.json",
            self.base_url,
            urlencoding::encode(query)
        );

        let response: GeocodingResponse = self
            .get_json(
                &url,
                &[
                    ("proximity", format!("{},{}", near.lng, near.lat)),
                    ("limit", "5".to_string()),
                    ("types", "poi".to_string()),
                    ("radius", radius_meters.to_string()),
                ],
            )
            .await?;

        Ok(response.features.into_iter().next().map(Place::from))
    }

    // ─── Directions ──────────────────────────────────────────────

    /// Walking path through an ordered coordinate list.
    pub async fn directions(&self, coords: &[Coordinate]) -> Result<DirectionsRoute, AppError> {
        if coords.len() < 2 {
            return Err(AppError::InvalidInput(
                "directions require at least two coordinates".to_string(),
            ));
        }
        if coords.len() > MAX_DIRECTIONS_WAYPOINTS {
            return Err(AppError::InvalidInput(format!(
                "directions accept at most {} waypoints, got {} (downsample first)",
                MAX_DIRECTIONS_WAYPOINTS,
                coords.len()
            )));
        }

        let path = coords
            .iter()
            .map(|c| format!("{},{}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let url = format!("{}/directions/v5/mapbox/walking/{}", self.base_url, path);

        let response: DirectionsResponse = self
            .get_json(
                &url,
                &[
                    ("geometries", "polyline".to_string()),
                    ("overview", "full".to_string()),
                ],
            )
            .await?;

        let route = response
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("directions returned no route".to_string()))?;

        let line = polyline::decode_polyline(&route.geometry, 5)
            .map_err(|e| AppError::Upstream(format!("invalid directions polyline: {}", e)))?;

        Ok(DirectionsRoute {
            geometry: line.coords().map(|c| Coordinate::from(*c)).collect(),
            distance_meters: route.distance,
            duration_seconds: route.duration,
        })
    }

    // ─── Map matching ────────────────────────────────────────────

    /// Snap a coordinate onto the nearest traversable path within
    /// `radius_meters`. `None` when nothing matched.
    pub async fn map_match(
        &self,
        coord: Coordinate,
        radius_meters: u32,
    ) -> Result<Option<Coordinate>, AppError> {
        let url = format!(
            "{}/matching/v5/mapbox/walking/{},{}",
            self.base_url, coord.lng, coord.lat
        );

        let response: MatchingResponse = self
            .get_json(
                &url,
                &[
                    ("geometries", "polyline".to_string()),
                    ("radiuses", radius_meters.to_string()),
                ],
            )
            .await?;

        let Some(matching) = response.matchings.into_iter().next() else {
            return Ok(None);
        };

        let line = polyline::decode_polyline(&matching.geometry, 5)
            .map_err(|e| AppError::Upstream(format!("invalid matching polyline: {}", e)))?;

        let first = line.coords().next().map(|c| Coordinate::from(*c));
        Ok(first)
    }

    // ─── Shared plumbing ─────────────────────────────────────────

    /// Generic GET with token, timeout and JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .query(query)
            .query(&[("access_token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))
    }
}

/// Walking route between ordered coordinates.
#[derive(Debug, Clone)]
pub struct DirectionsRoute {
    pub geometry: Vec<Coordinate>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// A named place from geocoding.
#[derive(Debug, Clone)]
pub struct Place {
    pub name: String,
    pub address: Option<String>,
    pub place_type: String,
    pub coordinate: Coordinate,
}

impl From<GeocodingFeature> for Place {
    fn from(feature: GeocodingFeature) -> Self {
        let name = display_name(&feature.place_type, &feature.text);
        Self {
            name,
            address: feature.place_name,
            place_type: feature
                .place_type
                .first()
                .cloned()
                .unwrap_or_else(|| "waypoint".to_string()),
            coordinate: Coordinate {
                lng: feature.center.first().copied().unwrap_or(0.0),
                lat: feature.center.get(1).copied().unwrap_or(0.0),
            },
        }
    }
}

/// Display name by place type: POIs and addresses use the bare text,
/// neighborhoods are prefixed.
fn display_name(place_types: &[String], text: &str) -> String {
    if place_types.iter().any(|t| t == "poi" || t == "address") {
        text.to_string()
    } else if place_types.iter().any(|t| t == "neighborhood") {
        format!("Quartier {}", text)
    } else {
        text.to_string()
    }
}

/// Uniform-stride downsample keeping the first and last coordinate.
///
/// For callers feeding long paths to the directions API.
pub fn downsample_uniform(coords: &[Coordinate], max: usize) -> Vec<Coordinate> {
    if coords.len() <= max || max < 2 {
        return coords.to_vec();
    }
    (0..max)
        .map(|i| coords[i * (coords.len() - 1) / (max - 1)])
        .collect()
}

#[derive(Debug, Deserialize)]
struct IsochroneResponse {
    #[serde(default)]
    features: Vec<IsochroneFeature>,
}

#[derive(Debug, Deserialize)]
struct IsochroneFeature {
    geometry: IsochroneGeometry,
}

/// Polygon coordinates are kept raw and run through the strict ring parser.
#[derive(Debug, Deserialize)]
struct IsochroneGeometry {
    #[serde(default)]
    coordinates: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    features: Vec<GeocodingFeature>,
}

#[derive(Debug, Deserialize)]
struct GeocodingFeature {
    text: String,
    place_name: Option<String>,
    #[serde(default)]
    place_type: Vec<String>,
    #[serde(default)]
    center: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<DirectionsRouteDto>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRouteDto {
    geometry: String,
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct MatchingResponse {
    #[serde(default)]
    matchings: Vec<MatchingDto>,
}

#[derive(Debug, Deserialize)]
struct MatchingDto {
    geometry: String,
}
