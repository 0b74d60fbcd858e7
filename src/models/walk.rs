// SPDX-License-Identifier: MIT

//! Walk session model.
//!
//! The engine only needs the slice of the walk the matching and circuit
//! subsystems depend on: ownership and the sociable flag that opts the walk
//! into proximity matching.

use serde::{Deserialize, Serialize};

/// A walk session, owner of at most one circuit and one live position per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Walk {
    pub id: u64,
    pub user_id: u64,
    /// Whether this walk is open to proximity meetings.
    pub sociable: bool,
    /// When the walk was registered (ISO 8601)
    pub created_at: String,
}
