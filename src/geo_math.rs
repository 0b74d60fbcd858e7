// SPDX-License-Identifier: MIT

//! Great-circle math on WGS84 coordinates.
//!
//! Pure functions, no upstream calls. Distances use the haversine formula
//! with a 6371 km mean Earth radius; midpoints use the spherical midpoint
//! formula rather than arithmetic averaging, which diverges from the true
//! geodesic midpoint as separation grows.

use crate::models::coordinate::Coordinate;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

/// Haversine distance between two points, in meters.
pub fn haversine_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Haversine distance between two points, in kilometers.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    haversine_meters(a, b) / 1000.0
}

/// Initial compass bearing from `from` to `to`, in degrees (0–360, 0 = north).
pub fn bearing_degrees(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();

    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Great-circle midpoint of two points.
///
/// Standard spherical formula: project the second point into the frame of the
/// first (Bx, By), then atan2 back to latitude/longitude. Longitude is
/// normalized to [-180, 180].
pub fn spherical_midpoint(a: Coordinate, b: Coordinate) -> Coordinate {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let lng1 = a.lng.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let bx = lat2.cos() * d_lng.cos();
    let by = lat2.cos() * d_lng.sin();

    let mid_lat = (lat1.sin() + lat2.sin())
        .atan2(((lat1.cos() + bx).powi(2) + by.powi(2)).sqrt());
    let mid_lng = lng1 + by.atan2(lat1.cos() + bx);

    let mut lng = mid_lng.to_degrees();
    if lng > 180.0 {
        lng -= 360.0;
    } else if lng < -180.0 {
        lng += 360.0;
    }

    Coordinate {
        lng,
        lat: mid_lat.to_degrees(),
    }
}

/// Cumulative haversine distance along an ordered path, in kilometers.
pub fn path_distance_km(path: &[Coordinate]) -> f64 {
    path.windows(2)
        .map(|pair| haversine_km(pair[0], pair[1]))
        .sum()
}
