// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Delete drainer: consumes the delete queue.
//!
//! Symmetrical to the save drainer. Calls `DeleteZone` on every targeted
//! backend and verifies absence via `ZoneExists`; the domain row is
//! deleted only when every targeted backend reports success, otherwise the
//! failures are scoped into a retry item. The ingress delete guard has
//! already confirmed ownership; the drainer does not re-check.

use crate::context::Context;
use crate::dispatch::{dispatch_delete, partition};
use crate::metrics;
use crate::queue::{DeleteItem, RetryPayload};
use anyhow::{Context as _, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::save::enqueue_retry;
use super::{WORKER_DELETE, WORKER_HEARTBEAT_INTERVAL};

/// Run the delete drainer until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let mut shutdown = ctx.shutdown_rx();
    info!("Delete drainer started");

    loop {
        ctx.worker_health.beat(WORKER_DELETE);
        metrics::set_queue_depth("delete", ctx.queues.delete.depth());

        let popped = tokio::time::timeout(
            WORKER_HEARTBEAT_INTERVAL,
            ctx.queues.delete.pop(&mut shutdown),
        )
        .await;

        let pending = match popped {
            Err(_) => continue,
            Ok(Ok(None)) => break,
            Ok(Ok(Some(pending))) => pending,
            Ok(Err(e)) => {
                error!(error = %e, "Delete queue dequeue failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        let zone_name = pending.item.zone_name.clone();
        match process_delete(&ctx, &pending.item).await {
            Ok(_) => {
                if let Err(e) = pending.commit() {
                    error!(zone = %zone_name, error = %e, "Failed to commit delete item");
                }
            }
            Err(e) => {
                error!(
                    zone = %zone_name,
                    error = %e,
                    "Delete processing failed before durable hand-off"
                );
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    info!("Delete drainer stopped");
}

/// Process one delete item. Returns whether every targeted backend
/// succeeded.
pub async fn process_delete(ctx: &Context, item: &DeleteItem) -> Result<bool> {
    let targets = ctx.target_backends(item.target_backends.as_ref());
    if targets.is_empty() {
        warn!(zone = %item.zone_name, "No enabled backends match this delete item, removing row");
        ctx.store
            .delete_domain(&item.zone_name)
            .await
            .context("delete domain row")?;
        return Ok(true);
    }

    let started = Instant::now();
    let outcomes = dispatch_delete(&targets, &item.zone_name).await;
    metrics::record_dispatch_duration("delete", started.elapsed());
    for outcome in &outcomes {
        metrics::record_zone_delete(&outcome.backend, outcome.succeeded());
    }

    let (succeeded, failed) = partition(outcomes);

    if failed.is_empty() {
        ctx.store
            .delete_domain(&item.zone_name)
            .await
            .context("delete domain row")?;
        info!(
            zone = %item.zone_name,
            backends = succeeded.len(),
            "Zone deleted from all targeted backends"
        );
        return Ok(true);
    }

    enqueue_retry(
        ctx,
        RetryPayload::Delete(DeleteItem {
            target_backends: None,
            ..item.clone()
        }),
        &failed,
    )?;
    Ok(false)
}

#[cfg(test)]
#[path = "delete_tests.rs"]
mod delete_tests;
