// SPDX-License-Identifier: MIT

//! Detour and resume routing for an accepted meeting.
//!
//! For each of the two users: a detour path from their current position to
//! the meeting point, and a return path from the meeting point to a resume
//! point on their original circuit. The resume point is searched *ahead* of
//! the user's current progress, never behind it, so the rejoin does not force
//! backtracking.

use crate::db::MemoryDb;
use crate::error::AppError;
use crate::geo_math;
use crate::models::{
    ActivePosition, Coordinate, MeetingProposal, MeetingRouteSegment, RoutePath,
};
use crate::services::mapbox::MapboxClient;

/// How many circuit points past the current progress index are considered
/// as resume candidates.
const RESUME_LOOKAHEAD_POINTS: usize = 50;

/// Computes and persists per-user meeting route segments.
#[derive(Clone)]
pub struct MeetingRouteResolver {
    mapbox: MapboxClient,
    db: MemoryDb,
}

impl MeetingRouteResolver {
    pub fn new(mapbox: MapboxClient, db: MemoryDb) -> Self {
        Self { mapbox, db }
    }

    /// Resolve both users' segments for an accepted meeting.
    ///
    /// Fails as a whole with `PositionsUnavailable` when either user's live
    /// position is missing: a one-sided meeting route is meaningless.
    pub async fn resolve(
        &self,
        proposal: &MeetingProposal,
        meeting_point: Coordinate,
    ) -> Result<(MeetingRouteSegment, MeetingRouteSegment), AppError> {
        let position_a = self
            .db
            .get_position(proposal.user_a_id, proposal.walk_a_id)
            .ok_or_else(|| {
                AppError::PositionsUnavailable(format!(
                    "no live position for user {}",
                    proposal.user_a_id
                ))
            })?;
        let position_b = self
            .db
            .get_position(proposal.user_b_id, proposal.walk_b_id)
            .ok_or_else(|| {
                AppError::PositionsUnavailable(format!(
                    "no live position for user {}",
                    proposal.user_b_id
                ))
            })?;

        let segment_a = self
            .resolve_user_segment(&proposal.match_id, &position_a, meeting_point)
            .await?;
        let segment_b = self
            .resolve_user_segment(&proposal.match_id, &position_b, meeting_point)
            .await?;

        self.db.put_route_segment(segment_a.clone());
        self.db.put_route_segment(segment_b.clone());

        tracing::info!(
            match_id = %proposal.match_id,
            "Meeting route segments resolved for both users"
        );

        Ok((segment_a, segment_b))
    }

    /// One user's detour + return pair.
    async fn resolve_user_segment(
        &self,
        match_id: &str,
        position: &ActivePosition,
        meeting_point: Coordinate,
    ) -> Result<MeetingRouteSegment, AppError> {
        let to_meeting = self
            .mapbox
            .directions(&[position.coordinate, meeting_point])
            .await?;

        let circuit = self
            .db
            .get_circuit(position.walk_id)
            .ok_or_else(|| AppError::NotFound(format!("Circuit for walk {}", position.walk_id)))?;
        let route = circuit.collection.coordinate_array();

        let progress = position.route_progress_index.unwrap_or(0);
        let (resume_index, resume_coordinate) =
            find_best_resume_point(&route, progress, meeting_point).ok_or_else(|| {
                AppError::PositionsUnavailable(format!(
                    "circuit for walk {} has no coordinates",
                    position.walk_id
                ))
            })?;

        let from_meeting = self
            .mapbox
            .directions(&[meeting_point, resume_coordinate])
            .await?;

        Ok(MeetingRouteSegment {
            match_id: match_id.to_string(),
            user_id: position.user_id,
            to_meeting: RoutePath {
                geometry: to_meeting.geometry,
                distance_meters: to_meeting.distance_meters,
                duration_seconds: to_meeting.duration_seconds,
            },
            from_meeting: RoutePath {
                geometry: from_meeting.geometry,
                distance_meters: from_meeting.distance_meters,
                duration_seconds: from_meeting.duration_seconds,
            },
            resume_index,
            resume_coordinate,
        })
    }
}

/// Pick the rejoin point: the route coordinate between the current progress
/// index and `RESUME_LOOKAHEAD_POINTS` ahead that lies closest to the
/// meeting point. Looking only ahead keeps the rejoin from landing behind
/// the user on their loop.
fn find_best_resume_point(
    route: &[Coordinate],
    current_index: usize,
    meeting_point: Coordinate,
) -> Option<(usize, Coordinate)> {
    if route.is_empty() {
        return None;
    }

    let start = current_index.min(route.len() - 1);
    let end = (current_index + RESUME_LOOKAHEAD_POINTS).min(route.len() - 1);

    let mut best_index = start;
    let mut best_distance = f64::INFINITY;
    for (i, coord) in route.iter().enumerate().take(end + 1).skip(start) {
        let d = geo_math::haversine_meters(meeting_point, *coord);
        if d < best_distance {
            best_distance = d;
            best_index = i;
        }
    }

    Some((best_index, route[best_index]))
}
