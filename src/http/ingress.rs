// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Upstream push/delete ingress.
//!
//! The upstream pushes zone saves and deletes to a single endpoint,
//! discriminated by the `action` field. The policy is durable-accept,
//! repair-later: only structurally wrong requests are rejected (bad auth,
//! malformed body or zone text, non-owner delete); everything admitted is
//! durably queued and answered 200, with backend failures healed by the
//! workers.

use crate::context::Context;
use crate::queue::{DeleteItem, SaveItem};
use crate::zone::{canonical_zone_name, parse_zone};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Body of a push or delete request.
#[derive(Debug, Deserialize)]
pub struct DnsAdminRequest {
    /// `save` (alias `rawsave`) or `delete`
    pub action: String,
    /// Zone name, any case, with or without trailing dot
    pub domain: String,
    /// Full RFC 1035 zone text; required for saves
    #[serde(default)]
    pub zone_data: Option<String>,
    /// Hostname of the pushing upstream instance
    pub upstream_hostname: String,
    /// Owning user on the upstream
    #[serde(default)]
    pub upstream_username: String,
}

fn reject(status: StatusCode, reason: &str) -> Response {
    (status, Json(json!({ "status": "rejected", "reason": reason }))).into_response()
}

fn queued() -> Response {
    (StatusCode::OK, Json(json!({ "status": "queued" }))).into_response()
}

/// `POST /CMD_API_DNS_ADMIN` - zone push or delete.
///
/// The body is decoded by hand so every malformed shape answers 400, not
/// just syntactically invalid JSON.
pub async fn dns_admin(State(ctx): State<Arc<Context>>, Json(body): Json<serde_json::Value>) -> Response {
    let request: DnsAdminRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => return reject(StatusCode::BAD_REQUEST, &format!("malformed body: {e}")),
    };

    let zone_name = canonical_zone_name(&request.domain);
    if zone_name.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "empty domain");
    }
    if request.upstream_hostname.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "missing upstream_hostname");
    }

    match request.action.as_str() {
        "save" | "rawsave" => handle_save(&ctx, &zone_name, &request).await,
        "delete" => handle_delete(&ctx, &zone_name, &request).await,
        other => reject(StatusCode::BAD_REQUEST, &format!("unknown action '{other}'")),
    }
}

async fn handle_save(ctx: &Context, zone_name: &str, request: &DnsAdminRequest) -> Response {
    let Some(zone_data) = request.zone_data.as_deref().filter(|d| !d.is_empty()) else {
        return reject(StatusCode::BAD_REQUEST, "save requires zone_data");
    };
    if let Err(e) = parse_zone(zone_name, zone_data) {
        return reject(
            StatusCode::BAD_REQUEST,
            &format!("zone text does not parse: {e}"),
        );
    }

    // Ownership transfer: a push from a different upstream rewrites the
    // recorded owner in place.
    match ctx.store.get_domain(zone_name).await {
        Ok(Some(row)) => {
            let recorded = row.upstream_server_hostname.as_deref().unwrap_or_default();
            if !recorded.is_empty() && recorded != request.upstream_hostname {
                info!(
                    zone = zone_name,
                    from = recorded,
                    to = %request.upstream_hostname,
                    "[migration] zone ownership transferred by push"
                );
                if let Err(e) = ctx
                    .store
                    .set_upstream_hostname(zone_name, &request.upstream_hostname)
                    .await
                {
                    error!(zone = zone_name, error = %e, "Failed to record ownership transfer");
                    return reject(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!(zone = zone_name, error = %e, "Failed to read domain row at admission");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }

    let item = SaveItem {
        zone_name: zone_name.to_string(),
        zone_data: zone_data.to_string(),
        upstream_hostname: request.upstream_hostname.clone(),
        upstream_username: request.upstream_username.clone(),
        target_backends: None,
        // Upstream pushes are fresh edits; the drainer stamps write time.
        zone_updated_at: None,
    };
    if let Err(e) = ctx.queues.save.push(&item) {
        error!(zone = zone_name, error = %e, "Failed to enqueue save");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "queue failure");
    }

    info!(
        zone = zone_name,
        upstream = %request.upstream_hostname,
        user = %request.upstream_username,
        "Zone push queued"
    );
    queued()
}

async fn handle_delete(ctx: &Context, zone_name: &str, request: &DnsAdminRequest) -> Response {
    // Delete guard: only the recorded owner may remove a zone. A different
    // upstream still listing the domain is the Keep-DNS scenario.
    match ctx.store.get_domain(zone_name).await {
        Ok(Some(row)) => {
            let recorded = row.upstream_server_hostname.as_deref().unwrap_or_default();
            if !recorded.is_empty() && recorded != request.upstream_hostname {
                warn!(
                    zone = zone_name,
                    owner = recorded,
                    requester = %request.upstream_hostname,
                    "Non-owner delete rejected (Keep-DNS scenario)"
                );
                return reject(
                    StatusCode::FORBIDDEN,
                    "non-owner delete rejected (Keep-DNS scenario)",
                );
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!(zone = zone_name, error = %e, "Failed to read domain row at admission");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }

    let item = DeleteItem {
        zone_name: zone_name.to_string(),
        upstream_hostname: request.upstream_hostname.clone(),
        target_backends: None,
    };
    if let Err(e) = ctx.queues.delete.push(&item) {
        error!(zone = zone_name, error = %e, "Failed to enqueue delete");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "queue failure");
    }

    info!(
        zone = zone_name,
        upstream = %request.upstream_hostname,
        "Zone delete queued"
    );
    queued()
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
