// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Basic-auth realm enforcement for the ingress HTTP server.
//!
//! Two realms with distinct credentials: "app" for the upstream push
//! endpoint and `/status`, "peer" for the `/internal/*` endpoints used by
//! sibling nodes. Any credential mismatch answers 401 before the handler
//! runs.

use crate::context::Context;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tracing::debug;

/// Validate an `Authorization: Basic` header against one realm's
/// credentials.
#[must_use]
pub fn check_basic_auth(headers: &HeaderMap, username: &str, password: &str) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return false;
    };
    user == username && pass == password
}

fn unauthorized(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            format!("Basic realm=\"{realm}\""),
        )],
    )
        .into_response()
}

/// Middleware guarding app-realm routes.
pub async fn require_app_auth(
    State(ctx): State<Arc<Context>>,
    request: Request,
    next: Next,
) -> Response {
    if check_basic_auth(
        request.headers(),
        &ctx.config.auth.app_username,
        &ctx.config.auth.app_password,
    ) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Rejected app-realm request");
        unauthorized("app")
    }
}

/// Middleware guarding peer-realm routes.
pub async fn require_peer_auth(
    State(ctx): State<Arc<Context>>,
    request: Request,
    next: Next,
) -> Response {
    if check_basic_auth(
        request.headers(),
        &ctx.config.auth.peer_username,
        &ctx.config.auth.peer_password,
    ) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Rejected peer-realm request");
        unauthorized("peer")
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;
