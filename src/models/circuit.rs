// SPDX-License-Identifier: MIT

//! Generated circuit model and export formats.
//!
//! A circuit wraps the GeoJSON FeatureCollection produced by the generator:
//! one `start` feature, N ordered `waypoint` features, one `end` feature
//! (same coordinate as start) and one `isochrone` polygon, with route-level
//! metadata carried as foreign members. The collection is immutable after
//! generation; re-generating a walk's route replaces the whole circuit.

use chrono::{DateTime, Utc};
use geojson::{Feature, FeatureCollection};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo_math;
use crate::models::coordinate::Coordinate;

/// The generated route description attached 1:1 to a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteFeatureCollection(pub FeatureCollection);

impl RouteFeatureCollection {
    fn features_by_type<'a>(&'a self, feature_type: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.0.features.iter().filter(move |f| {
            f.property("type").and_then(|v| v.as_str()) == Some(feature_type)
        })
    }

    /// Waypoint features sorted by their `order` property.
    pub fn waypoints(&self) -> Vec<&Feature> {
        let mut wps: Vec<&Feature> = self.features_by_type("waypoint").collect();
        wps.sort_by_key(|f| f.property("order").and_then(|v| v.as_u64()).unwrap_or(0));
        wps
    }

    pub fn start_feature(&self) -> Option<&Feature> {
        self.features_by_type("start").next()
    }

    pub fn end_feature(&self) -> Option<&Feature> {
        self.features_by_type("end").next()
    }

    /// The isochrone polygon geometry (display only).
    pub fn isochrone_polygon(&self) -> Option<&geojson::Geometry> {
        self.features_by_type("isochrone")
            .next()
            .and_then(|f| f.geometry.as_ref())
    }

    fn route_metadata(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.0
            .foreign_members
            .as_ref()
            .and_then(|m| m.get("route_metadata"))
            .and_then(|v| v.as_object())
    }

    pub fn total_distance_km(&self) -> f64 {
        self.route_metadata()
            .and_then(|m| m.get("total_distance_km"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    pub fn waypoint_count(&self) -> usize {
        self.features_by_type("waypoint").count()
    }

    /// Display names of the enriched waypoints, in route order.
    pub fn poi_names(&self) -> Vec<String> {
        self.waypoints()
            .iter()
            .filter_map(|f| f.property("poi_name").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect()
    }

    /// Flat ordered coordinate list: start, waypoints by order, end.
    pub fn coordinate_array(&self) -> Vec<Coordinate> {
        let mut coords = Vec::with_capacity(self.waypoint_count() + 2);
        if let Some(c) = self.start_feature().and_then(point_coordinate) {
            coords.push(c);
        }
        for wp in self.waypoints() {
            if let Some(c) = point_coordinate(wp) {
                coords.push(c);
            }
        }
        if let Some(c) = self.end_feature().and_then(point_coordinate) {
            coords.push(c);
        }
        coords
    }

    /// Directions-API input shape: `"lng,lat;lng,lat;..."`.
    pub fn directions_input(&self) -> String {
        self.coordinate_array()
            .iter()
            .map(|c| format!("{},{}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Re-derive the loop distance from the flat coordinate array. Matches
    /// the stored `total_distance_km` within rounding.
    pub fn recomputed_distance_km(&self) -> f64 {
        geo_math::path_distance_km(&self.coordinate_array())
    }
}

fn point_coordinate(feature: &Feature) -> Option<Coordinate> {
    match &feature.geometry {
        Some(geojson::Geometry {
            value: geojson::Value::Point(pos),
            ..
        }) if pos.len() >= 2 => Some(Coordinate {
            lng: pos[0],
            lat: pos[1],
        }),
        _ => None,
    }
}

/// Persisted circuit: the route collection plus ownership, one per walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    pub walk_id: u64,
    pub user_id: u64,
    pub collection: RouteFeatureCollection,
    pub created_at: DateTime<Utc>,
}

impl Circuit {
    /// Export the circuit as a GPX 1.1 track (one track, one segment, a
    /// trackpoint per route coordinate).
    pub fn to_gpx(&self) -> Result<String, AppError> {
        let mut segment = TrackSegment::new();
        for coord in self.collection.coordinate_array() {
            segment
                .points
                .push(Waypoint::new(geo::Point::new(coord.lng, coord.lat)));
        }

        let mut track = Track::new();
        track.name = Some(format!("Circuit {}", self.walk_id));
        track.type_ = Some("walking".to_string());
        track.segments.push(segment);

        let mut gpx = Gpx::default();
        gpx.version = GpxVersion::Gpx11;
        gpx.creator = Some("walkloop".to_string());
        gpx.tracks.push(track);

        let mut out = Vec::new();
        gpx::write(&gpx, &mut out)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("GPX serialization failed: {}", e)))?;
        String::from_utf8(out)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("GPX output not UTF-8: {}", e)))
    }
}
