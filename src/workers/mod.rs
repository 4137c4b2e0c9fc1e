// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Long-lived workers and their lifecycle.
//!
//! Five workers run for the life of the daemon, all observing the single
//! composite shutdown signal:
//!
//! - [`save::run`] - drains the save queue in strict FIFO order
//! - [`delete::run`] - drains the delete queue
//! - [`retry::run`] - replays failed backend writes with backoff
//! - [`reconcile::run`] - orphan detection and backend healing on a timer
//! - [`peersync::run`] - newer-wins zone replication with sibling nodes
//!
//! Every worker stamps a heartbeat at least once per
//! [`WORKER_HEARTBEAT_INTERVAL`]; `/status` reports a worker dead when its
//! heartbeat exceeds [`WORKER_LIVENESS_MAX_AGE`]. Workers log and continue
//! on internal errors - they never crash the process.

use crate::context::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub mod delete;
pub mod peersync;
pub mod reconcile;
pub mod retry;
pub mod save;

/// Heartbeat name of the save drainer
pub const WORKER_SAVE: &str = "save_drainer";
/// Heartbeat name of the delete drainer
pub const WORKER_DELETE: &str = "delete_drainer";
/// Heartbeat name of the retry drainer
pub const WORKER_RETRY: &str = "retry_drainer";
/// Heartbeat name of the reconciliation worker
pub const WORKER_RECONCILE: &str = "reconciler";
/// Heartbeat name of the peer-sync worker
pub const WORKER_PEER_SYNC: &str = "peer_sync";

/// All worker heartbeat names, for `/status`
pub const WORKER_NAMES: &[&str] = &[
    WORKER_SAVE,
    WORKER_DELETE,
    WORKER_RETRY,
    WORKER_RECONCILE,
    WORKER_PEER_SYNC,
];

/// Maximum interval between heartbeats while a worker is healthy
pub const WORKER_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Heartbeat age beyond which `/status` reports a worker dead
pub const WORKER_LIVENESS_MAX_AGE: Duration = Duration::from_secs(180);

/// Sleep for `duration`, waking early on shutdown and keeping the worker's
/// heartbeat fresh throughout.
///
/// Returns `true` if shutdown fired during the sleep.
pub async fn sleep_observing(
    ctx: &Context,
    worker: &'static str,
    duration: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        ctx.worker_health.beat(worker);
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }
        let chunk = (deadline - now).min(Duration::from_secs(15));
        tokio::select! {
            () = tokio::time::sleep(chunk) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

/// Spawn all five workers.
#[must_use]
pub fn spawn_workers(ctx: &Arc<Context>) -> Vec<JoinHandle<()>> {
    info!("Starting workers");
    vec![
        tokio::spawn(save::run(ctx.clone())),
        tokio::spawn(delete::run(ctx.clone())),
        tokio::spawn(retry::run(ctx.clone())),
        tokio::spawn(reconcile::run(ctx.clone())),
        tokio::spawn(peersync::run(ctx.clone())),
    ]
}

/// Wait for every worker task to finish.
pub async fn join_workers(handles: Vec<JoinHandle<()>>) {
    futures::future::join_all(handles).await;
    info!("All workers stopped");
}
