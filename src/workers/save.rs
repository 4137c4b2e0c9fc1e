// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Save drainer: consumes the save queue in strict FIFO order.
//!
//! For each item the zone text is parsed once and its record count becomes
//! the verification reference. The item's target backends (explicit set
//! for healing and retries, all enabled backends otherwise) are dispatched
//! in parallel; succeeded backends update the store, failed backends are
//! scoped into a single retry item. Within one zone the sequence
//! {parse → dispatch → verify → store update} happens before the next
//! dequeue.
//!
//! Consecutive dequeues are grouped into a telemetry batch; the batch
//! closes when the queue is observed empty and logs zones processed,
//! failures, elapsed ms, and zones/sec.

use crate::constants::{MAX_RETRY_ATTEMPTS, RETRY_BACKOFF_SECS};
use crate::context::Context;
use crate::dispatch::{dispatch_write, partition};
use crate::errors::BackendError;
use crate::metrics;
use crate::queue::{RetryItem, RetryPayload, SaveItem};
use crate::zone::parse_zone;
use anyhow::{Context as _, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::{WORKER_HEARTBEAT_INTERVAL, WORKER_SAVE};

/// Telemetry over a run of consecutive dequeues.
struct BatchStats {
    started: Instant,
    zones: usize,
    failures: usize,
}

impl BatchStats {
    fn open() -> Self {
        Self {
            started: Instant::now(),
            zones: 0,
            failures: 0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn emit(&self) {
        let elapsed = self.started.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            self.zones as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            zones = self.zones,
            failures = self.failures,
            elapsed_ms = elapsed.as_millis() as u64,
            zones_per_sec = format!("{rate:.1}"),
            "Save batch complete"
        );
    }
}

/// Run the save drainer until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let mut shutdown = ctx.shutdown_rx();
    info!("Save drainer started");
    let mut batch: Option<BatchStats> = None;

    loop {
        ctx.worker_health.beat(WORKER_SAVE);
        metrics::set_queue_depth("save", ctx.queues.save.depth());

        // Bounded wait keeps the heartbeat fresh while the queue is idle.
        let popped = tokio::time::timeout(
            WORKER_HEARTBEAT_INTERVAL,
            ctx.queues.save.pop(&mut shutdown),
        )
        .await;

        let pending = match popped {
            Err(_) => continue,
            Ok(Ok(None)) => break,
            Ok(Ok(Some(pending))) => pending,
            Ok(Err(e)) => {
                error!(error = %e, "Save queue dequeue failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        let stats = batch.get_or_insert_with(BatchStats::open);
        stats.zones += 1;
        let zone_name = pending.item.zone_name.clone();

        match process_save(&ctx, &pending.item).await {
            Ok(all_succeeded) => {
                if !all_succeeded {
                    stats.failures += 1;
                }
                if let Err(e) = pending.commit() {
                    error!(zone = %zone_name, error = %e, "Failed to commit save item");
                }
            }
            Err(e) => {
                // Leave the item on disk: it is re-delivered after restart.
                error!(
                    zone = %zone_name,
                    error = %e,
                    "Save processing failed before durable hand-off"
                );
                stats.failures += 1;
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }

        // Batch closes when the queue is observed empty.
        if ctx.queues.save.depth() == 0 {
            if let Some(stats) = batch.take() {
                stats.emit();
            }
        }
    }

    if let Some(stats) = batch.take() {
        stats.emit();
    }
    info!("Save drainer stopped");
}

/// Process one save item: parse, dispatch, verify, update store, scope
/// failures into a retry.
///
/// Returns whether every targeted backend succeeded. An `Err` means the
/// durable hand-off itself failed and the item must not be committed.
pub async fn process_save(ctx: &Context, item: &SaveItem) -> Result<bool> {
    let parsed = match parse_zone(&item.zone_name, &item.zone_data) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Only reachable through on-disk tampering: ingress already
            // parse-checked this text. Not retryable.
            warn!(zone = %item.zone_name, error = %e, "Queued zone text does not parse, dead-lettering");
            let now = Utc::now();
            ctx.store
                .insert_dead_letter(
                    "write",
                    &item.zone_name,
                    &item.zone_data,
                    &[],
                    &format!("zone text does not parse: {e}"),
                    now,
                    now,
                    0,
                )
                .await
                .context("dead-letter unparseable save item")?;
            metrics::record_dead_letter("write");
            return Ok(false);
        }
    };
    let expected = parsed.record_count();

    let targets = ctx.target_backends(item.target_backends.as_ref());
    if targets.is_empty() {
        warn!(zone = %item.zone_name, "No enabled backends match this save item, dropping");
        return Ok(true);
    }

    let started = Instant::now();
    let outcomes = dispatch_write(&targets, &item.zone_name, &item.zone_data, expected).await;
    metrics::record_dispatch_duration("save", started.elapsed());
    for outcome in &outcomes {
        metrics::record_zone_save(&outcome.backend, outcome.succeeded());
    }

    let (succeeded, failed) = partition(outcomes);

    if !succeeded.is_empty() {
        // Upstream pushes stamp the write time; peer-applied and healing
        // items carry the timestamp they were compared under.
        ctx.store
            .upsert_zone(
                &item.zone_name,
                &item.zone_data,
                &item.upstream_hostname,
                &item.upstream_username,
                item.zone_updated_at.unwrap_or_else(Utc::now),
            )
            .await
            .context("update store after save")?;
    }

    if failed.is_empty() {
        info!(
            zone = %item.zone_name,
            backends = succeeded.len(),
            records = expected,
            "Zone written to all targeted backends"
        );
        return Ok(true);
    }

    enqueue_retry(
        ctx,
        RetryPayload::Save(SaveItem {
            target_backends: None,
            ..item.clone()
        }),
        &failed,
    )?;
    Ok(false)
}

/// Summarize dispatch failures for logs and dead letters.
pub fn failure_causes(failed: &[BackendError]) -> Vec<String> {
    failed
        .iter()
        .map(|e| format!("{}[{}]: {e}", e.backend(), e.cause_label()))
        .collect()
}

/// Scope a dispatch's failures into a single attempt-1 retry item.
pub fn enqueue_retry(ctx: &Context, payload: RetryPayload, failed: &[BackendError]) -> Result<()> {
    let pending: Vec<String> = failed.iter().map(|e| e.backend().to_string()).collect();
    // Permanent failures get flagged up front: they will grind through the
    // whole schedule before landing in the dead letters.
    let permanent = failed.iter().filter(|e| !e.is_transient()).count();
    let now = Utc::now();
    let item = RetryItem {
        payload,
        pending_backends: pending.clone(),
        attempt: 1,
        not_before: now + ChronoDuration::seconds(i64::try_from(RETRY_BACKOFF_SECS[0]).unwrap_or(30)),
        first_failure: now,
    };

    warn!(
        zone = %item.zone_name(),
        kind = item.kind(),
        backends = ?pending,
        causes = ?failure_causes(failed),
        permanent_failures = permanent,
        max_attempts = MAX_RETRY_ATTEMPTS,
        "Backends failed, scheduling retry"
    );
    ctx.queues
        .retry
        .push(&item)
        .context("enqueue retry item")?;
    Ok(())
}

#[cfg(test)]
#[path = "save_tests.rs"]
mod save_tests;
