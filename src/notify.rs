// SPDX-License-Identifier: MIT

//! Per-user meeting event delivery.
//!
//! The engine's notification collaborator: meeting lifecycle events are
//! serialized to JSON and pushed onto a per-user channel. Transport is
//! someone else's concern; subscribers take an in-process receiver. Events
//! for users without a subscriber are dropped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::{Coordinate, MeetingRouteSegment};

/// Meeting point payload shared by both sides of an accepted meeting.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingPointPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub poi_name: Option<String>,
}

/// One user's detour payload for an accepted meeting.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingRoutePayload {
    pub to_meeting: Vec<Coordinate>,
    pub from_meeting: Vec<Coordinate>,
    pub to_meeting_distance: f64,
    pub to_meeting_duration: f64,
    pub from_meeting_distance: f64,
    pub from_meeting_duration: f64,
}

impl From<&MeetingRouteSegment> for MeetingRoutePayload {
    fn from(segment: &MeetingRouteSegment) -> Self {
        Self {
            to_meeting: segment.to_meeting.geometry.clone(),
            from_meeting: segment.from_meeting.geometry.clone(),
            to_meeting_distance: segment.to_meeting.distance_meters,
            to_meeting_duration: segment.to_meeting.duration_seconds,
            from_meeting_distance: segment.from_meeting.distance_meters,
            from_meeting_duration: segment.from_meeting.duration_seconds,
        }
    }
}

/// Meeting lifecycle events, delivered as tagged JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum MeetingEvent {
    #[serde(rename = "meeting_proposed")]
    Proposed {
        match_id: String,
        other_user_id: u64,
        /// Measured distance at detection time, one decimal.
        distance_meters: f64,
        proposed_at: DateTime<Utc>,
    },
    #[serde(rename = "meeting_accepted")]
    Accepted {
        match_id: String,
        meeting_point: MeetingPointPayload,
        route: MeetingRoutePayload,
        other_user_id: u64,
    },
    #[serde(rename = "meeting_declined")]
    Declined { match_id: String },
    #[serde(rename = "meeting_started")]
    Started {
        match_id: String,
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "meeting_completed")]
    Completed {
        match_id: String,
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Per-user JSON event channels.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Arc<DashMap<u64, mpsc::UnboundedSender<serde_json::Value>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or replace) the event stream for a user.
    pub fn subscribe(&self, user_id: u64) -> mpsc::UnboundedReceiver<serde_json::Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.insert(user_id, tx);
        rx
    }

    /// Deliver an event to one user's channel. Events for users without a
    /// live subscription are dropped.
    pub fn broadcast_to(&self, user_id: u64, event: &MeetingEvent) {
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize meeting event");
                return;
            }
        };

        match self.channels.get(&user_id) {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    drop(sender);
                    // Receiver is gone; clean up the dead channel.
                    self.channels.remove(&user_id);
                    tracing::debug!(user_id, "Dropped event for closed channel");
                }
            }
            None => {
                tracing::debug!(user_id, "No subscriber for meeting event");
            }
        }
    }
}
