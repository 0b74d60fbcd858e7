// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! The Mapbox token is the only required value; everything else has a
//! development default. The base URL override exists so tests can point the
//! geo clients at a local stub server.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mapbox access token (isochrone, geocoding, directions, map matching)
    pub mapbox_token: String,
    /// Mapbox API base URL (overridable for tests)
    pub mapbox_base_url: String,
    /// Per-call timeout for upstream geo queries, in seconds
    pub upstream_timeout_secs: u64,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
}

const DEFAULT_MAPBOX_BASE_URL: &str = "https://api.mapbox.com";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            mapbox_token: env::var("MAPBOX_API_KEY")
                .map_err(|_| ConfigError::Missing("MAPBOX_API_KEY"))?,
            mapbox_base_url: env::var("MAPBOX_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MAPBOX_BASE_URL.to_string()),
            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            mapbox_token: "test_token".to_string(),
            mapbox_base_url: DEFAULT_MAPBOX_BASE_URL.to_string(),
            upstream_timeout_secs: 2,
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
