// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Composite `/status` document.
//!
//! Combines queue depths, worker liveness, the last reconcile run, peer
//! health, live zone count, and the dead-letter count into one document.
//! The overall state is `ok`, `degraded`, or `error`: a dead worker means
//! `error`; dead letters, deep queue backlogs, or unhealthy peers mean
//! `degraded`.

use crate::constants::QUEUE_BACKLOG_DEGRADED_THRESHOLD;
use crate::context::{Context, ReconcileRun};
use crate::peers::PeerStatus;
use crate::workers::{WORKER_LIVENESS_MAX_AGE, WORKER_NAMES};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Depth of each durable queue.
#[derive(Debug, Serialize)]
pub struct QueueDepths {
    pub save: usize,
    pub delete: usize,
    pub retry: usize,
}

/// Liveness of one worker.
#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    pub alive: bool,
    pub last_beat: Option<DateTime<Utc>>,
}

/// The composite status document.
#[derive(Debug, Serialize)]
pub struct StatusDocument {
    /// `ok`, `degraded`, or `error`
    pub state: String,
    pub zones: u64,
    pub dead_letters: u64,
    pub queues: QueueDepths,
    pub workers: BTreeMap<String, WorkerStatus>,
    pub peers: Vec<PeerStatus>,
    pub last_reconcile: Option<ReconcileRun>,
}

/// `GET /status` - health and telemetry for operators and load balancers.
pub async fn status(State(ctx): State<Arc<Context>>) -> Response {
    let zones = match ctx.store.domain_count().await {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "Failed to count zones for status");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "state": "error", "reason": "storage failure" })),
            )
                .into_response();
        }
    };
    let dead_letters = match ctx.store.dead_letter_count().await {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "Failed to count dead letters for status");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "state": "error", "reason": "storage failure" })),
            )
                .into_response();
        }
    };

    let queues = QueueDepths {
        save: ctx.queues.save.depth(),
        delete: ctx.queues.delete.depth(),
        retry: ctx.queues.retry.depth(),
    };

    let beats = ctx.worker_health.snapshot();
    let mut workers = BTreeMap::new();
    let mut any_worker_dead = false;
    for name in WORKER_NAMES {
        let alive = ctx.worker_health.alive(name, WORKER_LIVENESS_MAX_AGE);
        if !alive {
            any_worker_dead = true;
        }
        workers.insert(
            (*name).to_string(),
            WorkerStatus {
                alive,
                last_beat: beats.get(*name).copied(),
            },
        );
    }

    let peers = ctx.peers.snapshot();
    let unhealthy_peers = peers.iter().filter(|peer| !peer.healthy).count();
    let backlog =
        queues.save + queues.delete + queues.retry;

    let state = if any_worker_dead {
        "error"
    } else if dead_letters > 0 || unhealthy_peers > 0 || backlog > QUEUE_BACKLOG_DEGRADED_THRESHOLD
    {
        "degraded"
    } else {
        "ok"
    };

    let document = StatusDocument {
        state: state.to_string(),
        zones,
        dead_letters,
        queues,
        workers,
        peers,
        last_reconcile: ctx.reconcile_run(),
    };
    Json(document).into_response()
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
