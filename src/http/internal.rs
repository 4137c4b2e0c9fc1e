// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Peer-facing internal endpoints.
//!
//! Used only by sibling zonegate nodes during peer sync: zone listings
//! with metadata for newer-wins comparison, and the known-peer list for
//! gossip discovery. All routes sit behind the peer realm.

use crate::context::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// One zone's sync metadata, as exchanged between peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneMeta {
    pub zone_name: String,
    pub zone_data: String,
    pub zone_updated_at: DateTime<Utc>,
}

/// Query string of `GET /internal/zone`.
#[derive(Debug, Deserialize)]
pub struct ZoneQuery {
    pub domain: String,
}

/// `GET /internal/zones` - all zones with metadata.
///
/// Rows that have never completed a backend write carry no zone data and
/// are omitted; a peer cannot apply them.
pub async fn list_zones(State(ctx): State<Arc<Context>>) -> Response {
    match ctx.store.list_domains().await {
        Ok(rows) => {
            let zones: Vec<ZoneMeta> = rows
                .into_iter()
                .filter_map(|row| {
                    Some(ZoneMeta {
                        zone_name: row.zone_name,
                        zone_data: row.zone_data?,
                        zone_updated_at: row.zone_updated_at?,
                    })
                })
                .collect();
            Json(zones).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list zones for peer");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}

/// `GET /internal/zone?domain=…` - one zone's metadata.
pub async fn get_zone(
    State(ctx): State<Arc<Context>>,
    Query(query): Query<ZoneQuery>,
) -> Response {
    let zone_name = crate::zone::canonical_zone_name(&query.domain);
    match ctx.store.get_domain(&zone_name).await {
        Ok(Some(row)) => match (row.zone_data, row.zone_updated_at) {
            (Some(zone_data), Some(zone_updated_at)) => Json(ZoneMeta {
                zone_name: row.zone_name,
                zone_data,
                zone_updated_at,
            })
            .into_response(),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "zone has no applied data" })),
            )
                .into_response(),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown zone" })),
        )
            .into_response(),
        Err(e) => {
            error!(zone = %zone_name, error = %e, "Failed to fetch zone for peer");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}

/// `GET /internal/peers` - the current known-peer URL list.
pub async fn list_peers(State(ctx): State<Arc<Context>>) -> Json<Vec<String>> {
    Json(ctx.peers.urls())
}

#[cfg(test)]
#[path = "internal_tests.rs"]
mod internal_tests;
