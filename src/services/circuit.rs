// SPDX-License-Identifier: MIT

//! Closed-loop circuit generation.
//!
//! Workflow:
//! 1. Pick a waypoint count from the requested duration
//! 2. Fetch one walking isochrone sized to a single polygon side
//! 3. Sample the boundary ring at even stride from a random start index
//! 4. Pull samples 60% toward the start, sort by bearing, renumber
//! 5. Enrich each waypoint with a place name (best effort, concurrent)
//! 6. Assemble the GeoJSON FeatureCollection with route metadata
//!
//! The bearing sort is the correctness step: a monotonic angular sweep
//! around the origin keeps the loop from crossing itself or backtracking.

use chrono::Utc;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, Value as GeoValue};
use rand::Rng;
use serde_json::{json, Map};

use crate::error::AppError;
use crate::geo_math;
use crate::models::{Coordinate, RouteFeatureCollection};
use crate::services::mapbox::{MapboxClient, Place};

/// Average walking speed recorded in route metadata, km/h.
const WALKING_SPEED_KMH: f64 = 4.5;

/// How far each sampled boundary point is pulled back toward the start.
/// Keeps waypoints inside the reachable frontier for more walkable detours.
const WAYPOINT_PULL_RATIO: f64 = 0.6;

/// Waypoint count as a step function of walk duration, in minutes.
///
/// Deliberately a step function rather than a continuous one: predictable
/// loop shapes for the three supported walk lengths.
pub fn waypoint_count_for_duration(duration_minutes: f64) -> usize {
    if duration_minutes < 30.0 {
        3
    } else if duration_minutes < 40.0 {
        4
    } else {
        5
    }
}

/// Minutes each isochrone step covers. The `+1` side is the final
/// return-to-start leg.
pub fn isochrone_step_minutes(duration_minutes: f64, waypoint_count: usize) -> u32 {
    let total_sides = waypoint_count as f64 + 1.0;
    ((duration_minutes / total_sides).floor() as u32).max(1)
}

/// Interior angle step of the regular polygon the loop approximates.
/// Recorded in metadata only; the actual shape follows the isochrone.
pub fn rotation_angle_degrees(waypoint_count: usize) -> f64 {
    360.0 / (waypoint_count as f64 + 1.0)
}

/// A sampled waypoint before enrichment.
#[derive(Debug, Clone)]
struct SampledWaypoint {
    id: usize,
    order: usize,
    isochrone_step: usize,
    coordinate: Coordinate,
    bearing: f64,
}

/// An enriched waypoint ready for feature assembly.
#[derive(Debug, Clone)]
struct EnrichedWaypoint {
    sampled: SampledWaypoint,
    name: String,
    address: String,
    place_type: String,
}

/// Generates closed-loop walking circuits from a start point and duration.
#[derive(Clone)]
pub struct CircuitGenerator {
    mapbox: MapboxClient,
}

impl CircuitGenerator {
    pub fn new(mapbox: MapboxClient) -> Self {
        Self { mapbox }
    }

    /// Generate a circuit.
    ///
    /// Fails with `InvalidInput` before any upstream call on a non-positive
    /// duration or a null-island start, and with `Upstream` if the isochrone
    /// query fails or returns an unusable polygon. Per-waypoint enrichment
    /// misses never fail the generation.
    pub async fn generate(
        &self,
        start: Coordinate,
        duration_minutes: f64,
    ) -> Result<RouteFeatureCollection, AppError> {
        if duration_minutes <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "walk duration must be positive, got {}",
                duration_minutes
            )));
        }
        if start.is_null_island() {
            return Err(AppError::InvalidInput(
                "start coordinate is unset (0, 0)".to_string(),
            ));
        }

        let waypoint_count = waypoint_count_for_duration(duration_minutes);
        let step_minutes = isochrone_step_minutes(duration_minutes, waypoint_count);
        let rotation_angle = rotation_angle_degrees(waypoint_count);

        tracing::info!(
            duration_minutes,
            waypoint_count,
            step_minutes,
            rotation_angle,
            "Generating circuit"
        );

        let ring = self.mapbox.isochrone(start, step_minutes).await?;
        tracing::debug!(ring_points = ring.len(), "Isochrone boundary fetched");

        let start_index = rand::thread_rng().gen_range(0..ring.len());
        let waypoints = sample_ring_waypoints(&ring, start, waypoint_count, start_index);

        let enriched = self.enrich_waypoints(waypoints).await;

        Ok(build_feature_collection(
            start,
            &enriched,
            &ring,
            duration_minutes,
            step_minutes,
            rotation_angle,
        ))
    }

    /// Look up place names for all waypoints concurrently. A miss degrades
    /// to a synthetic label and is only logged.
    async fn enrich_waypoints(&self, waypoints: Vec<SampledWaypoint>) -> Vec<EnrichedWaypoint> {
        let lookups = waypoints
            .iter()
            .map(|wp| self.lookup_place(wp.coordinate));
        let results = futures_util::future::join_all(lookups).await;

        let mut misses = 0usize;
        let enriched = waypoints
            .into_iter()
            .zip(results)
            .map(|(sampled, result)| match result {
                Ok(place) => EnrichedWaypoint {
                    name: place.name,
                    address: place.address.unwrap_or_default(),
                    place_type: place.place_type,
                    sampled,
                },
                Err(miss) => {
                    misses += 1;
                    tracing::warn!(
                        waypoint = sampled.id,
                        error = %miss,
                        "Waypoint enrichment failed, using synthetic label"
                    );
                    EnrichedWaypoint {
                        name: format!("Point {}", sampled.id),
                        address: "Point de passage".to_string(),
                        place_type: "waypoint".to_string(),
                        sampled,
                    }
                }
            })
            .collect();

        if misses > 0 {
            tracing::warn!(misses, "Circuit generated with enrichment misses");
        }
        enriched
    }

    /// Single enrichment lookup; "no result" counts as a miss too.
    async fn lookup_place(&self, coord: Coordinate) -> Result<Place, AppError> {
        self.mapbox
            .reverse_geocode(coord)
            .await?
            .ok_or_else(|| AppError::Upstream("no place found".to_string()))
    }
}

/// Sample `count` waypoints around the isochrone boundary.
///
/// Walks the ring in one direction at even index stride from `start_index`,
/// pulls each sample toward `start`, then sorts by bearing so the loop
/// sweeps monotonically around the origin. With a ring shorter than `count`
/// the modulo wrap produces duplicates, which is an accepted degenerate case.
fn sample_ring_waypoints(
    ring: &[Coordinate],
    start: Coordinate,
    count: usize,
    start_index: usize,
) -> Vec<SampledWaypoint> {
    let stride = ring.len() / count;

    let mut waypoints: Vec<SampledWaypoint> = (0..count)
        .map(|i| {
            let index = (start_index + i * stride) % ring.len();
            let boundary = ring[index];

            let coordinate = Coordinate {
                lng: start.lng + (boundary.lng - start.lng) * WAYPOINT_PULL_RATIO,
                lat: start.lat + (boundary.lat - start.lat) * WAYPOINT_PULL_RATIO,
            };

            SampledWaypoint {
                id: i + 1,
                order: i + 1,
                isochrone_step: i + 1,
                coordinate,
                bearing: geo_math::bearing_degrees(start, coordinate),
            }
        })
        .collect();

    waypoints.sort_by(|a, b| a.bearing.total_cmp(&b.bearing));
    for (idx, wp) in waypoints.iter_mut().enumerate() {
        wp.order = idx + 1;
    }

    waypoints
}

/// Assemble the final FeatureCollection:
/// start, ordered waypoints, end (== start), isochrone polygon.
fn build_feature_collection(
    start: Coordinate,
    waypoints: &[EnrichedWaypoint],
    ring: &[Coordinate],
    duration_minutes: f64,
    step_minutes: u32,
    rotation_angle: f64,
) -> RouteFeatureCollection {
    let mut features = Vec::with_capacity(waypoints.len() + 3);

    features.push(point_feature(
        "start_point",
        start,
        json_props(&[
            ("type", json!("start")),
            ("order", json!(0)),
            ("address", json!("Point de départ")),
        ]),
    ));

    for wp in waypoints {
        features.push(point_feature(
            &format!("waypoint_{}", wp.sampled.id),
            wp.sampled.coordinate,
            json_props(&[
                ("type", json!("waypoint")),
                ("order", json!(wp.sampled.order)),
                ("poi_name", json!(wp.name)),
                ("poi_type", json!(wp.place_type)),
                ("address", json!(wp.address)),
                ("description", json!(wp.name)),
                ("isochrone_step", json!(wp.sampled.isochrone_step)),
                (
                    "direction_bearing",
                    json!((wp.sampled.bearing * 100.0).round() / 100.0),
                ),
            ]),
        ));
    }

    features.push(point_feature(
        "end_point",
        start,
        json_props(&[
            ("type", json!("end")),
            ("order", json!(waypoints.len() + 1)),
            ("address", json!("Retour au point de départ")),
        ]),
    ));

    let ring_positions: Vec<Vec<f64>> = ring.iter().map(|c| vec![c.lng, c.lat]).collect();
    features.push(Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Polygon(vec![ring_positions]))),
        id: Some(Id::String("isochrone_zone".to_string())),
        properties: Some(json_props(&[
            ("type", json!("isochrone")),
            ("contour_minutes", json!(step_minutes)),
        ])),
        foreign_members: None,
    });

    let total_distance_km = loop_distance_km(start, waypoints);

    let mut foreign_members = Map::new();
    foreign_members.insert(
        "metadata".to_string(),
        json!({
            "algorithm": "isochrone_guided_polygon",
            "generated_at": Utc::now().to_rfc3339(),
            "configuration": {
                "poi_count": waypoints.len(),
                "rotation_angle": rotation_angle,
                "isochrone_duration_per_step": step_minutes,
            },
        }),
    );
    foreign_members.insert(
        "route_metadata".to_string(),
        json!({
            "total_distance_km": total_distance_km,
            "estimated_duration_minutes": duration_minutes,
            "poi_count": waypoints.len(),
            "walking_speed_kmh": WALKING_SPEED_KMH,
            "polygon_sides": waypoints.len() + 1,
        }),
    );

    RouteFeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    })
}

/// Cumulative haversine over start → waypoints (in order) → start, 2 dp.
fn loop_distance_km(start: Coordinate, waypoints: &[EnrichedWaypoint]) -> f64 {
    let mut path: Vec<Coordinate> = Vec::with_capacity(waypoints.len() + 2);
    path.push(start);
    path.extend(waypoints.iter().map(|wp| wp.sampled.coordinate));
    path.push(start);

    (geo_math::path_distance_km(&path) * 100.0).round() / 100.0
}

fn point_feature(id: &str, coord: Coordinate, properties: Map<String, serde_json::Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Point(vec![coord.lng, coord.lat]))),
        id: Some(Id::String(id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn json_props(entries: &[(&str, serde_json::Value)]) -> Map<String, serde_json::Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waypoint_count_step_function() {
        assert_eq!(waypoint_count_for_duration(10.0), 3);
        assert_eq!(waypoint_count_for_duration(29.9), 3);
        assert_eq!(waypoint_count_for_duration(30.0), 4);
        assert_eq!(waypoint_count_for_duration(39.9), 4);
        assert_eq!(waypoint_count_for_duration(40.0), 5);
        assert_eq!(waypoint_count_for_duration(45.0), 5);
        assert_eq!(waypoint_count_for_duration(120.0), 5);
    }

    #[test]
    fn test_isochrone_step_floors_with_minimum() {
        // 45 min / (5 + 1) sides = 7.5 → 7
        assert_eq!(isochrone_step_minutes(45.0, 5), 7);
        // 10 min / 4 sides = 2.5 → 2
        assert_eq!(isochrone_step_minutes(10.0, 3), 2);
        // Short walks never go below one minute per side
        assert_eq!(isochrone_step_minutes(2.0, 3), 1);
    }

    #[test]
    fn test_rotation_angle() {
        assert_eq!(rotation_angle_degrees(3), 90.0);
        assert_eq!(rotation_angle_degrees(4), 72.0);
        assert_eq!(rotation_angle_degrees(5), 60.0);
    }

    fn circular_ring(center: Coordinate, radius_deg: f64, points: usize) -> Vec<Coordinate> {
        (0..points)
            .map(|i| {
                let theta = (i as f64) / (points as f64) * std::f64::consts::TAU;
                Coordinate {
                    lng: center.lng + radius_deg * theta.cos(),
                    lat: center.lat + radius_deg * theta.sin(),
                }
            })
            .collect()
    }

    #[test]
    fn test_sampled_waypoints_sorted_by_bearing_with_contiguous_orders() {
        let start = Coordinate {
            lng: 2.3522,
            lat: 48.8566,
        };
        let ring = circular_ring(start, 0.01, 60);

        for start_index in [0, 7, 31, 59] {
            let wps = sample_ring_waypoints(&ring, start, 5, start_index);
            assert_eq!(wps.len(), 5);

            for pair in wps.windows(2) {
                assert!(
                    pair[0].bearing <= pair[1].bearing,
                    "bearings out of order: {} > {}",
                    pair[0].bearing,
                    pair[1].bearing
                );
            }
            let orders: Vec<usize> = wps.iter().map(|w| w.order).collect();
            assert_eq!(orders, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_sampling_pulls_toward_start() {
        let start = Coordinate {
            lng: 2.3522,
            lat: 48.8566,
        };
        let ring = circular_ring(start, 0.01, 40);
        let wps = sample_ring_waypoints(&ring, start, 4, 0);

        for wp in &wps {
            let d = geo_math::haversine_meters(start, wp.coordinate);
            let full = 0.01_f64;
            // Waypoints sit at ~60% of the boundary radius
            let expected_ratio = (wp.coordinate.lng - start.lng).hypot(wp.coordinate.lat - start.lat) / full;
            assert!(
                (expected_ratio - WAYPOINT_PULL_RATIO).abs() < 1e-9,
                "pull ratio off: {}",
                expected_ratio
            );
            assert!(d > 0.0);
        }
    }

    #[test]
    fn test_short_ring_wraps_with_duplicates() {
        let start = Coordinate { lng: 0.1, lat: 0.1 };
        let ring = circular_ring(start, 0.01, 3);
        // More waypoints than ring points: stride 0, wrap produces duplicates
        let wps = sample_ring_waypoints(&ring, start, 5, 1);
        assert_eq!(wps.len(), 5);
        let orders: Vec<usize> = wps.iter().map(|w| w.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_feature_collection_shape() {
        let start = Coordinate {
            lng: 2.3522,
            lat: 48.8566,
        };
        let ring = circular_ring(start, 0.01, 40);
        let sampled = sample_ring_waypoints(&ring, start, 4, 3);
        let enriched: Vec<EnrichedWaypoint> = sampled
            .into_iter()
            .map(|sampled| EnrichedWaypoint {
                name: format!("Point {}", sampled.id),
                address: "Point de passage".to_string(),
                place_type: "waypoint".to_string(),
                sampled,
            })
            .collect();

        let fc = build_feature_collection(start, &enriched, &ring, 35.0, 7, 72.0);

        assert_eq!(fc.waypoint_count(), 4);
        let coords = fc.coordinate_array();
        assert_eq!(coords.len(), 6);
        assert_eq!(coords[0], start);
        assert_eq!(coords[5], start);
        assert!(fc.isochrone_polygon().is_some());
        assert!(fc.total_distance_km() > 0.0);

        // Stored distance reproduces from the flat export within rounding
        assert!((fc.recomputed_distance_km() - fc.total_distance_km()).abs() < 0.01);
    }
}
