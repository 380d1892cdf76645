// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! API error responses.
//!
//! Every failure leaving the HTTP surface is an [`ErrorPayload`] with a
//! canonical code, an RFC 3339 timestamp and a request id. Internal errors
//! are sanitized; the original goes to the log, not the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use gibberlink_api::{ErrorCode, ErrorPayload};

/// Convert a `SystemTime` to an RFC 3339 string.
pub fn system_time_to_rfc3339(time: std::time::SystemTime) -> String {
    let offset_datetime = time::OffsetDateTime::from(time);
    offset_datetime.format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Now, RFC 3339.
pub fn now_rfc3339() -> String {
    system_time_to_rfc3339(std::time::SystemTime::now())
}

/// An API failure on its way out.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "missing or invalid x-api-key")
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(ErrorCode::SessionNotFound, format!("session '{id}' not found or expired"))
    }

    pub fn policy_violation(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyViolation, reason)
    }

    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecodeFailed, message)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, what)
    }

    /// Internal error with a sanitized client message; the detail is
    /// logged.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "internal server error");
        Self::new(ErrorCode::InternalServerError, "internal server error")
    }

    /// Build the wire payload (also used by the WebSocket error messages).
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.code,
            message: self.message.clone(),
            timestamp: now_rfc3339(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_payload())).into_response()
    }
}

impl From<gibberlink_gateway::GatewayError> for ApiError {
    fn from(e: gibberlink_gateway::GatewayError) -> Self {
        use gibberlink_gateway::GatewayError;
        match e {
            GatewayError::Configuration(message) => Self::bad_request(message),
            GatewayError::Session(message) => Self::new(ErrorCode::SessionNotFound, message),
            e @ (GatewayError::Audit(_)
            | GatewayError::Transport(_)
            | GatewayError::Io(_)
            | GatewayError::Core(_)) => Self::internal(e),
        }
    }
}
