// SPDX-License-Identifier: MIT

//! Meeting proposal between two walkers, with its status state machine,
//! and the per-user route segments computed once a meeting is accepted.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::position::ActivePosition;

/// Meeting lifecycle status.
///
/// Allowed transitions:
/// `proposed → accepted → in_progress → completed`, plus
/// `proposed → cancelled` and `accepted → cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Proposed,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl MeetingStatus {
    /// A proposal still blocking its user pair from being re-matched.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MeetingStatus::Proposed | MeetingStatus::Accepted | MeetingStatus::InProgress
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Proposed => "proposed",
            MeetingStatus::Accepted => "accepted",
            MeetingStatus::InProgress => "in_progress",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed (or ongoing) meeting between two walkers.
///
/// The user pair is canonicalized so `user_a_id < user_b_id`; at most one
/// active proposal may exist per unordered pair. Each status timestamp is
/// written only by its transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingProposal {
    pub match_id: String,
    pub user_a_id: u64,
    pub user_b_id: u64,
    pub walk_a_id: u64,
    pub walk_b_id: u64,
    pub status: MeetingStatus,
    pub initial_distance_meters: f64,
    pub proposed_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub meeting_started_at: Option<DateTime<Utc>>,
    pub meeting_ended_at: Option<DateTime<Utc>>,
    /// Resolved meeting point, set on acceptance.
    pub meeting_point: Option<Coordinate>,
    /// Name of the place chosen as the meeting point, when one was found.
    pub meeting_place_name: Option<String>,
}

impl MeetingProposal {
    /// Create a proposal from two detected positions.
    ///
    /// The pair is ordered so the lower user id becomes side A regardless of
    /// detection order.
    pub fn propose(
        pos_a: &ActivePosition,
        pos_b: &ActivePosition,
        distance_meters: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if pos_a.user_id == pos_b.user_id {
            return Err(AppError::InvalidInput(
                "a meeting requires two distinct users".to_string(),
            ));
        }
        if pos_a.walk_id == pos_b.walk_id {
            return Err(AppError::InvalidInput(
                "a meeting requires two distinct walks".to_string(),
            ));
        }

        let (a, b) = if pos_a.user_id < pos_b.user_id {
            (pos_a, pos_b)
        } else {
            (pos_b, pos_a)
        };

        Ok(Self {
            match_id: generate_match_id(),
            user_a_id: a.user_id,
            user_b_id: b.user_id,
            walk_a_id: a.walk_id,
            walk_b_id: b.walk_id,
            status: MeetingStatus::Proposed,
            initial_distance_meters: distance_meters,
            proposed_at: now,
            accepted_at: None,
            meeting_started_at: None,
            meeting_ended_at: None,
            meeting_point: None,
            meeting_place_name: None,
        })
    }

    /// Canonical unordered pair key for dedup.
    pub fn pair_key(user_a: u64, user_b: u64) -> (u64, u64) {
        if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        }
    }

    pub fn includes_user(&self, user_id: u64) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    /// The other side of the pair.
    pub fn other_user(&self, user_id: u64) -> u64 {
        if self.user_a_id == user_id {
            self.user_b_id
        } else {
            self.user_a_id
        }
    }

    /// The walk belonging to the given user within this meeting.
    pub fn walk_for_user(&self, user_id: u64) -> u64 {
        if self.user_a_id == user_id {
            self.walk_a_id
        } else {
            self.walk_b_id
        }
    }

    // ─── Status transitions ──────────────────────────────────────

    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            MeetingStatus::Proposed => {
                self.status = MeetingStatus::Accepted;
                self.accepted_at = Some(now);
                Ok(())
            }
            from => Err(AppError::InvalidStateTransition {
                from,
                action: "accept",
            }),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            MeetingStatus::Accepted => {
                self.status = MeetingStatus::InProgress;
                self.meeting_started_at = Some(now);
                Ok(())
            }
            from => Err(AppError::InvalidStateTransition {
                from,
                action: "start",
            }),
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            MeetingStatus::InProgress => {
                self.status = MeetingStatus::Completed;
                self.meeting_ended_at = Some(now);
                Ok(())
            }
            from => Err(AppError::InvalidStateTransition {
                from,
                action: "complete",
            }),
        }
    }

    /// A party may decline before the walk has started, but not after.
    pub fn cancel(&mut self) -> Result<(), AppError> {
        match self.status {
            MeetingStatus::Proposed | MeetingStatus::Accepted => {
                self.status = MeetingStatus::Cancelled;
                Ok(())
            }
            from => Err(AppError::InvalidStateTransition {
                from,
                action: "cancel",
            }),
        }
    }
}

/// One walking path with its cost, as returned by the directions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePath {
    /// Ordered path coordinates (serializes as a GeoJSON coordinate array).
    pub geometry: Vec<Coordinate>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Per-user detour for an accepted meeting: the path to the meeting point and
/// the path back onto the user's original circuit. Exactly two per resolved
/// meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRouteSegment {
    pub match_id: String,
    pub user_id: u64,
    pub to_meeting: RoutePath,
    pub from_meeting: RoutePath,
    /// Index into the user's original circuit coordinates chosen as rejoin point.
    pub resume_index: usize,
    pub resume_coordinate: Coordinate,
}

/// Random 32-hex-char match identifier.
fn generate_match_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}{:016x}", rng.gen::<u64>(), rng.gen::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(user_id: u64, walk_id: u64) -> ActivePosition {
        ActivePosition {
            user_id,
            walk_id,
            coordinate: Coordinate {
                lng: 2.3522,
                lat: 48.8566,
            },
            heading: None,
            route_progress_index: None,
            last_update_at: Utc::now(),
            is_active: true,
        }
    }

    fn proposal() -> MeetingProposal {
        MeetingProposal::propose(&position(2, 10), &position(1, 11), 42.0, Utc::now()).unwrap()
    }

    #[test]
    fn test_propose_canonicalizes_pair() {
        let p = proposal();
        assert_eq!(p.user_a_id, 1);
        assert_eq!(p.user_b_id, 2);
        assert_eq!(p.walk_a_id, 11);
        assert_eq!(p.walk_b_id, 10);
        assert_eq!(p.status, MeetingStatus::Proposed);
        assert_eq!(p.match_id.len(), 32);
    }

    #[test]
    fn test_propose_rejects_same_user_or_walk() {
        assert!(MeetingProposal::propose(&position(1, 10), &position(1, 11), 1.0, Utc::now())
            .is_err());
        assert!(MeetingProposal::propose(&position(1, 10), &position(2, 10), 1.0, Utc::now())
            .is_err());
    }

    #[test]
    fn test_happy_path_transitions_set_timestamps() {
        let mut p = proposal();
        let now = Utc::now();

        p.accept(now).unwrap();
        assert_eq!(p.status, MeetingStatus::Accepted);
        assert_eq!(p.accepted_at, Some(now));

        p.start(now).unwrap();
        assert_eq!(p.status, MeetingStatus::InProgress);
        assert_eq!(p.meeting_started_at, Some(now));

        p.complete(now).unwrap();
        assert_eq!(p.status, MeetingStatus::Completed);
        assert_eq!(p.meeting_ended_at, Some(now));
    }

    #[test]
    fn test_complete_on_proposed_fails_without_mutation() {
        let mut p = proposal();
        let err = p.complete(Utc::now()).unwrap_err();

        assert!(matches!(
            err,
            AppError::InvalidStateTransition {
                from: MeetingStatus::Proposed,
                action: "complete"
            }
        ));
        assert_eq!(p.status, MeetingStatus::Proposed);
        assert_eq!(p.meeting_ended_at, None);
    }

    #[test]
    fn test_cancel_allowed_from_proposed_and_accepted_only() {
        let mut p = proposal();
        p.cancel().unwrap();
        assert_eq!(p.status, MeetingStatus::Cancelled);

        let mut p = proposal();
        p.accept(Utc::now()).unwrap();
        p.cancel().unwrap();
        assert_eq!(p.status, MeetingStatus::Cancelled);

        let mut p = proposal();
        p.accept(Utc::now()).unwrap();
        p.start(Utc::now()).unwrap();
        assert!(p.cancel().is_err());
        assert_eq!(p.status, MeetingStatus::InProgress);
    }

    #[test]
    fn test_active_statuses() {
        assert!(MeetingStatus::Proposed.is_active());
        assert!(MeetingStatus::Accepted.is_active());
        assert!(MeetingStatus::InProgress.is_active());
        assert!(!MeetingStatus::Completed.is_active());
        assert!(!MeetingStatus::Cancelled.is_active());
    }

    #[test]
    fn test_pair_key_is_unordered() {
        assert_eq!(MeetingProposal::pair_key(5, 3), (3, 5));
        assert_eq!(MeetingProposal::pair_key(3, 5), (3, 5));
    }

    #[test]
    fn test_other_user_and_walk_lookup() {
        let p = proposal();
        assert_eq!(p.other_user(1), 2);
        assert_eq!(p.other_user(2), 1);
        assert_eq!(p.walk_for_user(1), 11);
        assert_eq!(p.walk_for_user(2), 10);
        assert!(p.includes_user(1));
        assert!(!p.includes_user(99));
    }
}
