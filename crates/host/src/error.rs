// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bgtask_core::ManagerError;
use serde::{Deserialize, Serialize};

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Wraps a [`ManagerError`] so it can be returned directly from an axum
/// handler via `?`; renders using the same code/status the manager already
/// carries (`ManagerError::as_str()` / `http_status()`).
pub struct ApiError(pub ManagerError);

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: ErrorBody { code: self.0.as_str().to_owned(), message: self.0.to_string() } };
        (status, Json(body)).into_response()
    }
}

/// Errors raised by the tool-surface binary itself, outside the manager's
/// own taxonomy (malformed request bodies, inbound auth failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Unauthorized,
    BadRequest,
}

impl TransportError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
        }
    }

    pub fn into_response(self, message: impl Into<String>) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::UNAUTHORIZED);
        let body = ErrorResponse { error: ErrorBody { code: self.as_str().to_owned(), message: message.into() } };
        (status, Json(body)).into_response()
    }
}
