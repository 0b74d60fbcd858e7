// SPDX-License-Identifier: MIT

//! JSON API for circuit generation, position updates and meeting lifecycle.
//!
//! Thin handlers over the services. Meeting endpoints act on a match id
//! (accept/decline/start/complete) on behalf of one of the two users and
//! drive the notifier.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{
    ActivePosition, Circuit, Coordinate, MeetingProposal, RouteFeatureCollection,
};
use crate::notify::{MeetingEvent, MeetingPointPayload, MeetingRoutePayload};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/walks", post(create_walk))
        .route("/api/circuits", post(generate_circuit))
        .route("/api/circuits/{walk_id}", get(get_circuit))
        .route("/api/circuits/{walk_id}/coordinates", get(get_circuit_coordinates))
        .route("/api/circuits/{walk_id}/directions-input", get(get_directions_input))
        .route("/api/circuits/{walk_id}/gpx", get(export_gpx))
        .route("/api/positions", post(update_position))
        .route("/api/meetings/detect", post(detect_meetings))
        .route("/api/meetings/{match_id}", get(get_meeting))
        .route("/api/meetings/{match_id}/accept", post(accept_meeting))
        .route("/api/meetings/{match_id}/decline", post(decline_meeting))
        .route("/api/meetings/{match_id}/start", post(start_meeting))
        .route("/api/meetings/{match_id}/complete", post(complete_meeting))
}

fn validated<T: Validate>(req: &T) -> Result<()> {
    req.validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))
}

// ─── Walks ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateWalkRequest {
    user_id: u64,
    #[serde(default)]
    sociable: bool,
}

#[derive(Serialize)]
struct WalkResponse {
    walk_id: u64,
    user_id: u64,
    sociable: bool,
}

async fn create_walk(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWalkRequest>,
) -> Result<Json<WalkResponse>> {
    let walk = state.db.create_walk(req.user_id, req.sociable);
    Ok(Json(WalkResponse {
        walk_id: walk.id,
        user_id: walk.user_id,
        sociable: walk.sociable,
    }))
}

// ─── Circuits ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct GenerateCircuitRequest {
    walk_id: u64,
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
    #[validate(range(min = 1.0, max = 600.0))]
    duration_minutes: f64,
}

/// Generate a circuit for a walk and persist it (replacing any previous one).
async fn generate_circuit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateCircuitRequest>,
) -> Result<Json<RouteFeatureCollection>> {
    validated(&req)?;

    let walk = state
        .db
        .get_walk(req.walk_id)
        .ok_or_else(|| AppError::NotFound(format!("Walk {}", req.walk_id)))?;

    let start = Coordinate::new(req.longitude, req.latitude)?;
    let collection = state
        .circuit_generator
        .generate(start, req.duration_minutes)
        .await?;

    state.db.put_circuit(Circuit {
        walk_id: walk.id,
        user_id: walk.user_id,
        collection: collection.clone(),
        created_at: Utc::now(),
    });

    Ok(Json(collection))
}

fn circuit_or_404(state: &AppState, walk_id: u64) -> Result<Circuit> {
    state
        .db
        .get_circuit(walk_id)
        .ok_or_else(|| AppError::NotFound(format!("Circuit for walk {}", walk_id)))
}

async fn get_circuit(
    State(state): State<Arc<AppState>>,
    Path(walk_id): Path<u64>,
) -> Result<Json<RouteFeatureCollection>> {
    Ok(Json(circuit_or_404(&state, walk_id)?.collection))
}

async fn get_circuit_coordinates(
    State(state): State<Arc<AppState>>,
    Path(walk_id): Path<u64>,
) -> Result<Json<Vec<Coordinate>>> {
    Ok(Json(circuit_or_404(&state, walk_id)?.collection.coordinate_array()))
}

#[derive(Serialize)]
struct DirectionsInputResponse {
    coordinates: String,
}

async fn get_directions_input(
    State(state): State<Arc<AppState>>,
    Path(walk_id): Path<u64>,
) -> Result<Json<DirectionsInputResponse>> {
    Ok(Json(DirectionsInputResponse {
        coordinates: circuit_or_404(&state, walk_id)?.collection.directions_input(),
    }))
}

async fn export_gpx(
    State(state): State<Arc<AppState>>,
    Path(walk_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let gpx = circuit_or_404(&state, walk_id)?.to_gpx()?;
    Ok(([(header::CONTENT_TYPE, "application/gpx+xml")], gpx))
}

// ─── Positions ───────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct UpdatePositionRequest {
    user_id: u64,
    walk_id: u64,
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
    #[validate(range(min = 0.0, max = 360.0))]
    heading: Option<f64>,
    route_progress_index: Option<usize>,
}

#[derive(Serialize)]
struct UpdatePositionResponse {
    success: bool,
}

/// GPS tick: last-write-wins upsert of the user's position on a walk.
async fn update_position(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdatePositionRequest>,
) -> Result<Json<UpdatePositionResponse>> {
    validated(&req)?;

    let walk = state
        .db
        .get_walk(req.walk_id)
        .ok_or_else(|| AppError::NotFound(format!("Walk {}", req.walk_id)))?;
    if walk.user_id != req.user_id {
        return Err(AppError::InvalidInput(format!(
            "walk {} does not belong to user {}",
            req.walk_id, req.user_id
        )));
    }

    state.db.upsert_position(ActivePosition {
        user_id: req.user_id,
        walk_id: req.walk_id,
        coordinate: Coordinate::new(req.longitude, req.latitude)?,
        heading: req.heading,
        route_progress_index: req.route_progress_index,
        last_update_at: Utc::now(),
        is_active: true,
    });

    Ok(Json(UpdatePositionResponse { success: true }))
}

// ─── Meetings ────────────────────────────────────────────────

#[derive(Serialize)]
struct DetectedPairResponse {
    match_id: String,
    user_a_id: u64,
    user_b_id: u64,
    distance_meters: f64,
}

/// Run one detection pass and notify both sides of each new proposal.
async fn detect_meetings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DetectedPairResponse>>> {
    let detected = state.meeting_detector.detect(Utc::now())?;

    let mut response = Vec::with_capacity(detected.len());
    for pair in &detected {
        let rounded = (pair.distance_meters * 10.0).round() / 10.0;
        let proposal = &pair.proposal;

        state.notifier.broadcast_to(
            proposal.user_a_id,
            &MeetingEvent::Proposed {
                match_id: proposal.match_id.clone(),
                other_user_id: proposal.user_b_id,
                distance_meters: rounded,
                proposed_at: proposal.proposed_at,
            },
        );
        state.notifier.broadcast_to(
            proposal.user_b_id,
            &MeetingEvent::Proposed {
                match_id: proposal.match_id.clone(),
                other_user_id: proposal.user_a_id,
                distance_meters: rounded,
                proposed_at: proposal.proposed_at,
            },
        );

        response.push(DetectedPairResponse {
            match_id: proposal.match_id.clone(),
            user_a_id: proposal.user_a_id,
            user_b_id: proposal.user_b_id,
            distance_meters: rounded,
        });
    }

    Ok(Json(response))
}

async fn get_meeting(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<Json<MeetingProposal>> {
    state
        .db
        .get_proposal(&match_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Meeting {}", match_id)))
}

#[derive(Deserialize)]
struct UserActionRequest {
    user_id: u64,
}

fn proposal_for_user(state: &AppState, match_id: &str, user_id: u64) -> Result<MeetingProposal> {
    let proposal = state
        .db
        .get_proposal(match_id)
        .ok_or_else(|| AppError::NotFound(format!("Meeting {}", match_id)))?;
    if !proposal.includes_user(user_id) {
        return Err(AppError::InvalidInput(format!(
            "user {} is not part of meeting {}",
            user_id, match_id
        )));
    }
    Ok(proposal)
}

#[derive(Serialize)]
struct AcceptMeetingResponse {
    match_id: String,
    meeting_point: MeetingPointPayload,
}

/// Accept a proposed meeting: resolve the meeting point, compute both users'
/// detours, and notify both sides.
async fn accept_meeting(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    Json(req): Json<UserActionRequest>,
) -> Result<Json<AcceptMeetingResponse>> {
    proposal_for_user(&state, &match_id, req.user_id)?;

    let now = Utc::now();
    let accepted = state.db.update_proposal(&match_id, |p| p.accept(now))?;

    let position_a = state
        .db
        .get_position(accepted.user_a_id, accepted.walk_a_id)
        .ok_or_else(|| {
            AppError::PositionsUnavailable(format!("no live position for user {}", accepted.user_a_id))
        })?;
    let position_b = state
        .db
        .get_position(accepted.user_b_id, accepted.walk_b_id)
        .ok_or_else(|| {
            AppError::PositionsUnavailable(format!("no live position for user {}", accepted.user_b_id))
        })?;

    let meeting_point = state
        .meeting_points
        .resolve(position_a.coordinate, position_b.coordinate)
        .await?;

    let resolved = state.db.update_proposal(&match_id, |p| {
        p.meeting_point = Some(meeting_point.coordinate);
        p.meeting_place_name = meeting_point.place_name.clone();
        Ok(())
    })?;

    let (segment_a, segment_b) = state
        .meeting_routes
        .resolve(&resolved, meeting_point.coordinate)
        .await?;

    let point_payload = MeetingPointPayload {
        latitude: meeting_point.coordinate.lat,
        longitude: meeting_point.coordinate.lng,
        poi_name: meeting_point.place_name.clone(),
    };

    state.notifier.broadcast_to(
        resolved.user_a_id,
        &MeetingEvent::Accepted {
            match_id: match_id.clone(),
            meeting_point: point_payload.clone(),
            route: MeetingRoutePayload::from(&segment_a),
            other_user_id: resolved.user_b_id,
        },
    );
    state.notifier.broadcast_to(
        resolved.user_b_id,
        &MeetingEvent::Accepted {
            match_id: match_id.clone(),
            meeting_point: point_payload.clone(),
            route: MeetingRoutePayload::from(&segment_b),
            other_user_id: resolved.user_a_id,
        },
    );

    Ok(Json(AcceptMeetingResponse {
        match_id,
        meeting_point: point_payload,
    }))
}

#[derive(Serialize)]
struct MeetingStatusResponse {
    match_id: String,
    status: String,
}

/// Decline a proposal (or back out of an accepted meeting). Only the other
/// party is notified.
async fn decline_meeting(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    Json(req): Json<UserActionRequest>,
) -> Result<Json<MeetingStatusResponse>> {
    proposal_for_user(&state, &match_id, req.user_id)?;

    let cancelled = state.db.update_proposal(&match_id, |p| p.cancel())?;

    state.notifier.broadcast_to(
        cancelled.other_user(req.user_id),
        &MeetingEvent::Declined {
            match_id: match_id.clone(),
        },
    );

    Ok(Json(MeetingStatusResponse {
        match_id,
        status: cancelled.status.to_string(),
    }))
}

async fn start_meeting(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    Json(req): Json<UserActionRequest>,
) -> Result<Json<MeetingStatusResponse>> {
    proposal_for_user(&state, &match_id, req.user_id)?;

    let now = Utc::now();
    let started = state.db.update_proposal(&match_id, |p| p.start(now))?;

    for user_id in [started.user_a_id, started.user_b_id] {
        state.notifier.broadcast_to(
            user_id,
            &MeetingEvent::Started {
                match_id: match_id.clone(),
                timestamp: started.meeting_started_at,
            },
        );
    }

    Ok(Json(MeetingStatusResponse {
        match_id,
        status: started.status.to_string(),
    }))
}

async fn complete_meeting(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    Json(req): Json<UserActionRequest>,
) -> Result<Json<MeetingStatusResponse>> {
    proposal_for_user(&state, &match_id, req.user_id)?;

    let now = Utc::now();
    let completed = state.db.update_proposal(&match_id, |p| p.complete(now))?;

    for user_id in [completed.user_a_id, completed.user_b_id] {
        state.notifier.broadcast_to(
            user_id,
            &MeetingEvent::Completed {
                match_id: match_id.clone(),
                timestamp: completed.meeting_ended_at,
            },
        );
    }

    Ok(Json(MeetingStatusResponse {
        match_id,
        status: completed.status.to_string(),
    }))
}
