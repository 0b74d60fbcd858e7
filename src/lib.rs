// SPDX-License-Identifier: MIT

//! Walkloop: closed-loop dog-walk circuit generation and proximity meetings
//!
//! This crate provides the backend engine for generating multi-waypoint
//! walking circuits from isochrone geometry and for pairing nearby walkers
//! into in-person meetings with shared detour routes.

pub mod config;
pub mod db;
pub mod error;
pub mod geo_math;
pub mod models;
pub mod notify;
pub mod routes;
pub mod services;

use config::Config;
use db::MemoryDb;
use notify::Notifier;
use services::{
    CircuitGenerator, MapboxClient, MeetingDetector, MeetingPointResolver, MeetingRouteResolver,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: MemoryDb,
    pub notifier: Notifier,
    pub circuit_generator: CircuitGenerator,
    pub meeting_detector: MeetingDetector,
    pub meeting_points: MeetingPointResolver,
    pub meeting_routes: MeetingRouteResolver,
}

impl AppState {
    /// Wire up all services from a config.
    pub fn from_config(config: Config) -> Self {
        let db = MemoryDb::new();
        let mapbox = MapboxClient::new(
            config.mapbox_token.clone(),
            config.mapbox_base_url.clone(),
            config.upstream_timeout_secs,
        );

        Self {
            db: db.clone(),
            notifier: Notifier::new(),
            circuit_generator: CircuitGenerator::new(mapbox.clone()),
            meeting_detector: MeetingDetector::new(db.clone()),
            meeting_points: MeetingPointResolver::new(mapbox.clone()),
            meeting_routes: MeetingRouteResolver::new(mapbox, db),
            config,
        }
    }
}
