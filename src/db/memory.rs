// SPDX-License-Identifier: MIT

//! In-memory store with typed operations.
//!
//! Provides high-level operations for:
//! - Walks (session registry)
//! - Circuits (one generated route per walk)
//! - Active positions (one per user per walk, last write wins)
//! - Meeting proposals (with an atomic per-pair reservation)
//! - Meeting route segments (two per resolved meeting)
//!
//! The active-pair index is the one place needing compare-and-swap
//! semantics: two near-simultaneous detector scans must not create duplicate
//! proposals for the same unordered user pair.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{ActivePosition, Circuit, MeetingProposal, MeetingRouteSegment, Walk};

/// Shared in-memory database.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_walk_id: AtomicU64,
    walks: DashMap<u64, Walk>,
    /// Keyed by walk id (1:1).
    circuits: DashMap<u64, Circuit>,
    /// Keyed by (user_id, walk_id).
    positions: DashMap<(u64, u64), ActivePosition>,
    /// Keyed by match id.
    proposals: DashMap<String, MeetingProposal>,
    /// Canonical (user_a, user_b) pair -> match id of the active proposal.
    active_pairs: DashMap<(u64, u64), String>,
    /// Keyed by (match_id, user_id).
    route_segments: DashMap<(String, u64), MeetingRouteSegment>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Walk operations ─────────────────────────────────────────

    /// Register a walk and assign it an id.
    pub fn create_walk(&self, user_id: u64, sociable: bool) -> Walk {
        let id = self.inner.next_walk_id.fetch_add(1, Ordering::Relaxed) + 1;
        let walk = Walk {
            id,
            user_id,
            sociable,
            created_at: Utc::now().to_rfc3339(),
        };
        self.inner.walks.insert(id, walk.clone());
        walk
    }

    pub fn get_walk(&self, walk_id: u64) -> Option<Walk> {
        self.inner.walks.get(&walk_id).map(|w| w.clone())
    }

    // ─── Circuit operations ──────────────────────────────────────

    /// Store a circuit for its walk, replacing any previous one.
    pub fn put_circuit(&self, circuit: Circuit) {
        self.inner.circuits.insert(circuit.walk_id, circuit);
    }

    pub fn get_circuit(&self, walk_id: u64) -> Option<Circuit> {
        self.inner.circuits.get(&walk_id).map(|c| c.clone())
    }

    // ─── Position operations ─────────────────────────────────────

    /// Last-write-wins upsert of a user's live position.
    pub fn upsert_position(&self, position: ActivePosition) {
        self.inner
            .positions
            .insert((position.user_id, position.walk_id), position);
    }

    pub fn get_position(&self, user_id: u64, walk_id: u64) -> Option<ActivePosition> {
        self.inner
            .positions
            .get(&(user_id, walk_id))
            .map(|p| p.clone())
    }

    /// Positions eligible for matching: active, fresh, and on a sociable walk.
    pub fn available_positions(
        &self,
        now: DateTime<Utc>,
        freshness_minutes: i64,
    ) -> Vec<ActivePosition> {
        self.inner
            .positions
            .iter()
            .filter(|entry| {
                let pos = entry.value();
                pos.is_active
                    && pos.is_fresh(now, freshness_minutes)
                    && self
                        .get_walk(pos.walk_id)
                        .map(|w| w.sociable)
                        .unwrap_or(false)
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    // ─── Meeting proposal operations ─────────────────────────────

    /// Whether an active proposal already exists for the unordered user pair.
    pub fn has_active_proposal(&self, user_a: u64, user_b: u64) -> bool {
        let pair = MeetingProposal::pair_key(user_a, user_b);
        match self.inner.active_pairs.get(&pair) {
            Some(match_id) => self
                .inner
                .proposals
                .get(match_id.value())
                .map(|p| p.status.is_active())
                .unwrap_or(false),
            None => false,
        }
    }

    /// Insert a proposal unless the pair already has an active one.
    ///
    /// The pair reservation happens under the pair entry lock, so two
    /// concurrent scans cannot both insert for the same pair.
    pub fn create_proposal_if_absent(
        &self,
        proposal: MeetingProposal,
    ) -> Option<MeetingProposal> {
        let pair = MeetingProposal::pair_key(proposal.user_a_id, proposal.user_b_id);
        match self.inner.active_pairs.entry(pair) {
            Entry::Occupied(mut occupied) => {
                let still_active = self
                    .inner
                    .proposals
                    .get(occupied.get())
                    .map(|p| p.status.is_active())
                    .unwrap_or(false);
                if still_active {
                    return None;
                }
                // Stale reservation from a finished meeting: take it over.
                occupied.insert(proposal.match_id.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(proposal.match_id.clone());
            }
        }
        self.inner
            .proposals
            .insert(proposal.match_id.clone(), proposal.clone());
        Some(proposal)
    }

    pub fn get_proposal(&self, match_id: &str) -> Option<MeetingProposal> {
        self.inner.proposals.get(match_id).map(|p| p.clone())
    }

    /// Apply a mutation to a proposal under its lock.
    ///
    /// If the mutation fails, the stored proposal is untouched. When the
    /// proposal leaves the active set, its pair reservation is released.
    pub fn update_proposal<F>(&self, match_id: &str, f: F) -> Result<MeetingProposal, AppError>
    where
        F: FnOnce(&mut MeetingProposal) -> Result<(), AppError>,
    {
        let updated = {
            let mut entry = self
                .inner
                .proposals
                .get_mut(match_id)
                .ok_or_else(|| AppError::NotFound(format!("Meeting {}", match_id)))?;
            let mut candidate = entry.value().clone();
            f(&mut candidate)?;
            *entry.value_mut() = candidate.clone();
            candidate
        };

        if !updated.status.is_active() {
            let pair = MeetingProposal::pair_key(updated.user_a_id, updated.user_b_id);
            self.inner
                .active_pairs
                .remove_if(&pair, |_, reserved| reserved == match_id);
        }

        Ok(updated)
    }

    // ─── Meeting route segments ──────────────────────────────────

    pub fn put_route_segment(&self, segment: MeetingRouteSegment) {
        self.inner
            .route_segments
            .insert((segment.match_id.clone(), segment.user_id), segment);
    }

    pub fn get_route_segment(&self, match_id: &str, user_id: u64) -> Option<MeetingRouteSegment> {
        self.inner
            .route_segments
            .get(&(match_id.to_string(), user_id))
            .map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;

    fn db_with_positions() -> (MemoryDb, ActivePosition, ActivePosition) {
        let db = MemoryDb::new();
        let walk_a = db.create_walk(1, true);
        let walk_b = db.create_walk(2, true);
        let now = Utc::now();

        let pos_a = ActivePosition {
            user_id: 1,
            walk_id: walk_a.id,
            coordinate: Coordinate {
                lng: 2.3522,
                lat: 48.8566,
            },
            heading: None,
            route_progress_index: None,
            last_update_at: now,
            is_active: true,
        };
        let pos_b = ActivePosition {
            user_id: 2,
            walk_id: walk_b.id,
            coordinate: Coordinate {
                lng: 2.3525,
                lat: 48.8566,
            },
            heading: None,
            route_progress_index: None,
            last_update_at: now,
            is_active: true,
        };
        db.upsert_position(pos_a.clone());
        db.upsert_position(pos_b.clone());
        (db, pos_a, pos_b)
    }

    #[test]
    fn test_walk_ids_are_sequential() {
        let db = MemoryDb::new();
        let w1 = db.create_walk(1, true);
        let w2 = db.create_walk(1, false);
        assert!(w2.id > w1.id);
        assert!(db.get_walk(w1.id).unwrap().sociable);
        assert!(!db.get_walk(w2.id).unwrap().sociable);
    }

    #[test]
    fn test_position_last_write_wins() {
        let (db, mut pos_a, _) = db_with_positions();
        pos_a.coordinate = Coordinate {
            lng: 2.40,
            lat: 48.86,
        };
        db.upsert_position(pos_a.clone());

        let stored = db.get_position(1, pos_a.walk_id).unwrap();
        assert_eq!(stored.coordinate.lng, 2.40);
    }

    #[test]
    fn test_available_positions_excludes_unsociable_walks() {
        let (db, _, pos_b) = db_with_positions();
        let solo_walk = db.create_walk(3, false);
        db.upsert_position(ActivePosition {
            user_id: 3,
            walk_id: solo_walk.id,
            ..pos_b.clone()
        });

        let available = db.available_positions(Utc::now(), 5);
        assert_eq!(available.len(), 2);
        assert!(available.iter().all(|p| p.user_id != 3));
    }

    #[test]
    fn test_pair_reservation_blocks_duplicates() {
        let (db, pos_a, pos_b) = db_with_positions();
        let now = Utc::now();

        let first = MeetingProposal::propose(&pos_a, &pos_b, 30.0, now).unwrap();
        assert!(db.create_proposal_if_absent(first.clone()).is_some());
        assert!(db.has_active_proposal(1, 2));
        assert!(db.has_active_proposal(2, 1));

        // Same pair, opposite detection order: rejected.
        let second = MeetingProposal::propose(&pos_b, &pos_a, 31.0, now).unwrap();
        assert!(db.create_proposal_if_absent(second).is_none());
    }

    #[test]
    fn test_pair_released_when_proposal_leaves_active_set() {
        let (db, pos_a, pos_b) = db_with_positions();
        let now = Utc::now();

        let proposal = MeetingProposal::propose(&pos_a, &pos_b, 30.0, now).unwrap();
        let match_id = proposal.match_id.clone();
        db.create_proposal_if_absent(proposal).unwrap();

        db.update_proposal(&match_id, |p| p.cancel()).unwrap();
        assert!(!db.has_active_proposal(1, 2));

        // Pair can be matched again.
        let again = MeetingProposal::propose(&pos_a, &pos_b, 40.0, now).unwrap();
        assert!(db.create_proposal_if_absent(again).is_some());
    }

    #[test]
    fn test_failed_update_leaves_proposal_unchanged() {
        let (db, pos_a, pos_b) = db_with_positions();
        let now = Utc::now();

        let proposal = MeetingProposal::propose(&pos_a, &pos_b, 30.0, now).unwrap();
        let match_id = proposal.match_id.clone();
        db.create_proposal_if_absent(proposal).unwrap();

        let err = db.update_proposal(&match_id, |p| p.complete(now));
        assert!(err.is_err());

        let stored = db.get_proposal(&match_id).unwrap();
        assert_eq!(stored.status, crate::models::MeetingStatus::Proposed);
        assert!(db.has_active_proposal(1, 2));
    }

    #[test]
    fn test_update_missing_proposal_is_not_found() {
        let db = MemoryDb::new();
        let err = db.update_proposal("nope", |p| p.cancel()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
