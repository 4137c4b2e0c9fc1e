// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ingress HTTP server: routing, realms, and serving.
//!
//! Routes:
//!
//! | Path | Realm | Purpose |
//! |---|---|---|
//! | `POST /CMD_API_DNS_ADMIN` | app | Zone push or delete |
//! | `GET /status` | app | Composite health/telemetry document |
//! | `GET /internal/zones` | peer | All zones + metadata |
//! | `GET /internal/zone?domain=…` | peer | One zone's metadata |
//! | `GET /internal/peers` | peer | Known peer URL list |
//! | `GET /healthz` | open | Liveness probe |
//! | `GET /metrics` | open | Prometheus metrics |

use crate::constants::{DNS_ADMIN_PATH, METRICS_PATH};
use crate::context::Context;
use crate::metrics;
use anyhow::{Context as _, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::{error, info};

pub mod auth;
pub mod ingress;
pub mod internal;
pub mod status;

/// Liveness probe handler.
async fn healthz() -> &'static str {
    "ok"
}

/// Prometheus metrics handler.
async fn metrics_handler() -> String {
    match metrics::gather_metrics() {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            String::from("# Error gathering metrics\n")
        }
    }
}

/// Build the full ingress router over the shared context.
#[must_use]
pub fn build_router(ctx: Arc<Context>) -> Router {
    let app_routes = Router::new()
        .route(DNS_ADMIN_PATH, post(ingress::dns_admin))
        .route("/status", get(status::status))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_app_auth,
        ));

    let peer_routes = Router::new()
        .route("/internal/zones", get(internal::list_zones))
        .route("/internal/zone", get(internal::get_zone))
        .route("/internal/peers", get(internal::list_peers))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_peer_auth,
        ));

    let open_routes = Router::new()
        .route("/healthz", get(healthz))
        .route(METRICS_PATH, get(metrics_handler));

    Router::new()
        .merge(app_routes)
        .merge(peer_routes)
        .merge(open_routes)
        .with_state(ctx)
}

/// Bind the listener and serve until shutdown fires, draining in-flight
/// handlers.
///
/// # Errors
///
/// Returns an error if the port cannot be bound; the daemon treats this as
/// an unrecoverable startup failure.
pub async fn serve(ctx: Arc<Context>) -> Result<()> {
    let bind_addr = format!("{}:{}", ctx.config.http.bind_address, ctx.config.http.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind ingress server to {bind_addr}"))?;
    info!(bind_addr, "Ingress HTTP server listening");

    let mut shutdown = ctx.shutdown_rx();
    let router = build_router(ctx);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("ingress server error")?;

    info!("Ingress HTTP server stopped");
    Ok(())
}
