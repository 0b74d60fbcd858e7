// SPDX-License-Identifier: MIT

//! Live GPS position of a user on a walk.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo_math;
use crate::models::coordinate::Coordinate;

/// Latest known position of a user on a walk. Updated on every GPS tick,
/// last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePosition {
    pub user_id: u64,
    pub walk_id: u64,
    pub coordinate: Coordinate,
    /// Compass heading in degrees (0–360), if the device reports one.
    pub heading: Option<f64>,
    /// Index of the last passed point on the walk's circuit coordinates.
    pub route_progress_index: Option<usize>,
    pub last_update_at: DateTime<Utc>,
    pub is_active: bool,
}

impl ActivePosition {
    /// Great-circle distance to another position, in meters.
    pub fn distance_to(&self, other: &ActivePosition) -> f64 {
        geo_math::haversine_meters(self.coordinate, other.coordinate)
    }

    /// Whether the position was updated within the freshness window.
    pub fn is_fresh(&self, now: DateTime<Utc>, window_minutes: i64) -> bool {
        now - self.last_update_at < Duration::minutes(window_minutes)
    }
}
