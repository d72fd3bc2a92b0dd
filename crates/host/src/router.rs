// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::TransportError;
use crate::http::{cancel, health, launch, retrieve, session_status_webhook, system_prompt};
use crate::state::AppState;

/// Constant-time bearer-token comparison, same guard the teacher's mux
/// crate uses against timing side-channels.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), TransportError> {
    let Some(expected) = expected else { return Ok(()) };
    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(TransportError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(TransportError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(TransportError::Unauthorized)
    }
}

async fn auth_layer(state: State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    if req.uri().path() == "/api/v1/health" {
        return next.run(req).await;
    }
    if let Err(err) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        return err.into_response("unauthorized");
    }
    next.run(req).await
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/tools/launch", post(launch))
        .route("/api/v1/tools/retrieve", post(retrieve))
        .route("/api/v1/tools/cancel", post(cancel))
        .route("/api/v1/system-prompt", post(system_prompt))
        .route("/api/v1/webhooks/session-status", post(session_status_webhook))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") })
}
