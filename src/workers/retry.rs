// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry drainer: replays failed backend operations with backoff.
//!
//! Scans the retry queue on a short jittered tick. An item is eligible
//! when the wall clock has passed its `not_before`; ineligible items are
//! rotated back to the queue, so retries are best-effort rather than
//! FIFO-strict. Backends that succeed are dropped from the item's pending
//! set; when the set empties the item is done. The backoff schedule is
//! 30 s, 2 m, 5 m, 15 m, 30 m - an item that fails its fifth attempt is
//! moved to the dead-letter table and never retried again.

use crate::backends::select_backends;
use crate::constants::{MAX_RETRY_ATTEMPTS, RETRY_BACKOFF_SECS, RETRY_TICK};
use crate::context::Context;
use crate::dispatch::{dispatch_delete, dispatch_write, partition};
use crate::metrics;
use crate::queue::{RetryItem, RetryPayload};
use crate::zone::parse_zone;
use anyhow::{Context as _, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::save::failure_causes;
use super::{sleep_observing, WORKER_RETRY};

/// Delay applied before the given attempt (1-based).
fn delay_before_attempt(attempt: u32) -> ChronoDuration {
    let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(0);
    let secs = RETRY_BACKOFF_SECS
        .get(index)
        .copied()
        .unwrap_or(RETRY_BACKOFF_SECS[RETRY_BACKOFF_SECS.len() - 1]);
    ChronoDuration::seconds(i64::try_from(secs).unwrap_or(1800))
}

/// The tick with ±10% jitter, so sibling nodes do not scan in lockstep.
fn jittered_tick() -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    Duration::from_secs_f64(RETRY_TICK.as_secs_f64() * factor)
}

/// Run the retry drainer until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let mut shutdown = ctx.shutdown_rx();
    info!("Retry drainer started");

    loop {
        ctx.worker_health.beat(WORKER_RETRY);
        metrics::set_queue_depth("retry", ctx.queues.retry.depth());

        if let Err(e) = drain_eligible(&ctx).await {
            error!(error = %e, "Retry drain cycle failed");
        }

        if sleep_observing(&ctx, WORKER_RETRY, jittered_tick(), &mut shutdown).await {
            break;
        }
    }

    info!("Retry drainer stopped");
}

/// One scan over the queue: attempt every eligible item, rotate the rest.
pub async fn drain_eligible(ctx: &Context) -> Result<()> {
    let depth = ctx.queues.retry.depth();
    for _ in 0..depth {
        let Some(pending) = ctx.queues.retry.try_pop()? else {
            break;
        };

        if Utc::now() < pending.item.not_before {
            // Not yet eligible: rotate to the back of the queue.
            ctx.queues
                .retry
                .push(&pending.item)
                .context("rotate ineligible retry item")?;
            pending.commit().context("commit rotated retry item")?;
            continue;
        }

        let item = pending.item.clone();
        process_retry(ctx, item).await?;
        pending.commit().context("commit attempted retry item")?;
    }
    Ok(())
}

/// Perform one attempt for an eligible item.
pub async fn process_retry(ctx: &Context, item: RetryItem) -> Result<()> {
    metrics::record_retry_attempt(item.kind());
    info!(
        zone = %item.zone_name(),
        kind = item.kind(),
        attempt = item.attempt,
        backends = ?item.pending_backends,
        "Retrying backend operation"
    );

    let targets = select_backends(&ctx.backends, &item.pending_backends);
    if targets.len() < item.pending_backends.len() {
        warn!(
            zone = %item.zone_name(),
            "Some retry backends are no longer configured and are dropped"
        );
    }

    let outcomes = match &item.payload {
        RetryPayload::Save(save) => {
            let expected = match parse_zone(&save.zone_name, &save.zone_data) {
                Ok(parsed) => parsed.record_count(),
                Err(e) => {
                    dead_letter(ctx, &item, &format!("zone text does not parse: {e}")).await?;
                    return Ok(());
                }
            };
            dispatch_write(&targets, &save.zone_name, &save.zone_data, expected).await
        }
        RetryPayload::Delete(delete) => dispatch_delete(&targets, &delete.zone_name).await,
    };

    let (succeeded, failed) = partition(outcomes);

    if let RetryPayload::Save(save) = &item.payload {
        if !succeeded.is_empty() {
            ctx.store
                .upsert_zone(
                    &save.zone_name,
                    &save.zone_data,
                    &save.upstream_hostname,
                    &save.upstream_username,
                    save.zone_updated_at.unwrap_or_else(Utc::now),
                )
                .await
                .context("update store after retry save")?;
        }
    }

    if failed.is_empty() {
        if let RetryPayload::Delete(delete) = &item.payload {
            ctx.store
                .delete_domain(&delete.zone_name)
                .await
                .context("delete domain row after retry")?;
        }
        info!(
            zone = %item.zone_name(),
            kind = item.kind(),
            attempt = item.attempt,
            "Retry succeeded, item discarded"
        );
        return Ok(());
    }

    if item.attempt >= MAX_RETRY_ATTEMPTS {
        let cause = failure_causes(&failed).join("; ");
        dead_letter(
            ctx,
            &RetryItem {
                pending_backends: failed.iter().map(|e| e.backend().to_string()).collect(),
                ..item
            },
            &cause,
        )
        .await?;
        return Ok(());
    }

    let next_attempt = item.attempt + 1;
    let next = RetryItem {
        payload: item.payload,
        pending_backends: failed.iter().map(|e| e.backend().to_string()).collect(),
        attempt: next_attempt,
        not_before: Utc::now() + delay_before_attempt(next_attempt),
        first_failure: item.first_failure,
    };
    warn!(
        zone = %next.zone_name(),
        kind = next.kind(),
        attempt = next_attempt,
        not_before = %next.not_before,
        backends = ?next.pending_backends,
        causes = ?failure_causes(&failed),
        "Retry failed, rescheduling"
    );
    ctx.queues
        .retry
        .push(&next)
        .context("re-enqueue retry item")?;
    Ok(())
}

/// Move an exhausted item to the dead-letter table.
async fn dead_letter(ctx: &Context, item: &RetryItem, cause: &str) -> Result<()> {
    let payload = match &item.payload {
        RetryPayload::Save(save) => save.zone_data.clone(),
        RetryPayload::Delete(_) => String::new(),
    };
    ctx.store
        .insert_dead_letter(
            item.kind(),
            item.zone_name(),
            &payload,
            &item.pending_backends,
            cause,
            item.first_failure,
            Utc::now(),
            item.attempt,
        )
        .await
        .context("insert dead letter")?;
    metrics::record_dead_letter(item.kind());
    error!(
        zone = %item.zone_name(),
        kind = item.kind(),
        attempts = item.attempt,
        backends = ?item.pending_backends,
        cause,
        "Retries exhausted, item dead-lettered"
    );
    Ok(())
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
