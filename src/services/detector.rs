// SPDX-License-Identifier: MIT

//! Proximity meeting detection.
//!
//! Periodic (or on-demand) scan of live positions for pairs of walkers close
//! enough to meet. The scan is a plain O(n²) pairwise comparison: the active
//! set is bounded by concurrently-running sociable walks, which stays small.
//! A spatial index becomes worthwhile only if that assumption breaks.

use chrono::{DateTime, Utc};

use crate::db::MemoryDb;
use crate::error::AppError;
use crate::models::{ActivePosition, MeetingProposal};

/// Two walkers closer than this are proposed a meeting.
pub const PROXIMITY_THRESHOLD_METERS: f64 = 100.0;

/// Positions older than this are excluded from matching.
pub const POSITION_FRESHNESS_MINUTES: i64 = 5;

/// A newly detected pair with its freshly created proposal.
#[derive(Debug, Clone)]
pub struct DetectedMeeting {
    pub proposal: MeetingProposal,
    pub position_a: ActivePosition,
    pub position_b: ActivePosition,
    pub distance_meters: f64,
}

/// Scans active positions and creates meeting proposals for close pairs.
#[derive(Clone)]
pub struct MeetingDetector {
    db: MemoryDb,
}

impl MeetingDetector {
    pub fn new(db: MemoryDb) -> Self {
        Self { db }
    }

    /// Run one detection pass.
    ///
    /// Only creates proposals for pairs without an existing active one, so
    /// back-to-back runs with unchanged state detect nothing new. Proposal
    /// insertion is atomic per canonical pair; a concurrent scan losing the
    /// race simply skips the pair.
    pub fn detect(&self, now: DateTime<Utc>) -> Result<Vec<DetectedMeeting>, AppError> {
        let positions = self.db.available_positions(now, POSITION_FRESHNESS_MINUTES);
        let mut detected = Vec::new();

        for (i, pos_a) in positions.iter().enumerate() {
            for pos_b in &positions[i + 1..] {
                if pos_a.user_id == pos_b.user_id {
                    continue;
                }
                if self.db.has_active_proposal(pos_a.user_id, pos_b.user_id) {
                    continue;
                }

                let distance = pos_a.distance_to(pos_b);
                if distance > PROXIMITY_THRESHOLD_METERS {
                    continue;
                }

                let proposal = MeetingProposal::propose(pos_a, pos_b, distance, now)?;
                let Some(created) = self.db.create_proposal_if_absent(proposal) else {
                    // Another scan reserved this pair first.
                    continue;
                };

                tracing::info!(
                    match_id = %created.match_id,
                    user_a = created.user_a_id,
                    user_b = created.user_b_id,
                    distance_meters = distance,
                    "Meeting proposed"
                );

                // Keep A/B aligned with the canonicalized proposal.
                let (position_a, position_b) = if pos_a.user_id == created.user_a_id {
                    (pos_a.clone(), pos_b.clone())
                } else {
                    (pos_b.clone(), pos_a.clone())
                };

                detected.push(DetectedMeeting {
                    proposal: created,
                    position_a,
                    position_b,
                    distance_meters: distance,
                });
            }
        }

        tracing::info!(count = detected.len(), "Detection pass finished");
        Ok(detected)
    }
}
