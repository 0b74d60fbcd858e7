// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::meeting::MeetingStatus;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Rejected before any upstream call (bad duration, coordinate out of range).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A structural upstream failure (isochrone or directions): the containing
    /// operation cannot proceed without the data.
    #[error("Upstream geo API error: {0}")]
    Upstream(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Meeting-route resolution is missing one of the two required positions.
    #[error("Positions unavailable: {0}")]
    PositionsUnavailable(String),

    /// A meeting status transition outside the allowed edges. The proposal is
    /// left unchanged.
    #[error("Invalid meeting transition: cannot {action} a {from} meeting")]
    InvalidStateTransition {
        from: MeetingStatus,
        action: &'static str,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input", Some(msg.clone()))
            }
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream geo API failure");
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::PositionsUnavailable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "positions_unavailable",
                Some(msg.clone()),
            ),
            AppError::InvalidStateTransition { .. } => (
                StatusCode::CONFLICT,
                "invalid_state_transition",
                Some(self.to_string()),
            ),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
