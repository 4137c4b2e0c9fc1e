// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation worker: orphan detection and backend healing.
//!
//! Runs on a configurable interval with an initial delay to stagger
//! siblings behind a load balancer. Each cycle makes two passes, in order:
//!
//! 1. **Orphan detection & backfill** - poll every configured upstream for
//!    its authoritative zone list, backfill missing owner hostnames,
//!    migrate ownership that moved, and enqueue deletes for zones the
//!    owning upstream no longer lists. An unreachable upstream is skipped
//!    for the cycle - orphans are never computed from a partial list.
//! 2. **Backend healing** - for every stored zone, re-push the stored
//!    `zone_data` to exactly the backends that are missing it.
//!
//! All per-pass counters land in the context's `last_run` for `/status`.

use crate::context::{Context, ReconcileRun};
use crate::metrics;
use crate::queue::{DeleteItem, SaveItem};
use crate::upstream::UpstreamClient;
use anyhow::{Context as _, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{sleep_observing, WORKER_RECONCILE};

/// Run the reconciliation worker until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let mut shutdown = ctx.shutdown_rx();
    let interval = Duration::from_secs(ctx.config.reconcile.interval_secs);
    let initial_delay = Duration::from_secs(ctx.config.reconcile.initial_delay_secs);
    info!(
        interval_secs = interval.as_secs(),
        initial_delay_secs = initial_delay.as_secs(),
        dry_run = ctx.config.reconcile.dry_run,
        "Reconciliation worker started"
    );

    if !initial_delay.is_zero()
        && sleep_observing(&ctx, WORKER_RECONCILE, initial_delay, &mut shutdown).await
    {
        info!("Reconciliation worker stopped during initial delay");
        return;
    }

    loop {
        ctx.worker_health.beat(WORKER_RECONCILE);
        match run_cycle(&ctx).await {
            Ok(run) => {
                metrics::record_reconcile_cycle(true);
                info!(
                    duration_ms = run.duration_ms,
                    upstreams_polled = run.upstreams_polled,
                    orphans_found = run.orphans_found,
                    orphans_queued = run.orphans_queued,
                    hostnames_backfilled = run.hostnames_backfilled,
                    ownership_migrations = run.ownership_migrations,
                    backends_healed = run.backends_healed,
                    dry_run = run.dry_run,
                    "Reconcile cycle complete"
                );
                ctx.set_reconcile_run(run);
            }
            Err(e) => {
                metrics::record_reconcile_cycle(false);
                error!(error = %e, "Reconcile cycle failed");
            }
        }

        if sleep_observing(&ctx, WORKER_RECONCILE, interval, &mut shutdown).await {
            break;
        }
    }

    info!("Reconciliation worker stopped");
}

/// One full reconcile cycle: orphan pass, then healing pass.
pub async fn run_cycle(ctx: &Context) -> Result<ReconcileRun> {
    let started = Instant::now();
    let mut run = ReconcileRun {
        started_at: Some(Utc::now()),
        dry_run: ctx.config.reconcile.dry_run,
        ..ReconcileRun::default()
    };

    orphan_pass(ctx, &mut run).await?;
    run.zones_in_store = usize::try_from(ctx.store.domain_count().await?).unwrap_or(usize::MAX);
    healing_pass(ctx, &mut run).await?;

    run.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(run)
}

/// Pass 1: poll upstreams, backfill and migrate ownership, enqueue deletes
/// for orphans.
async fn orphan_pass(ctx: &Context, run: &mut ReconcileRun) -> Result<()> {
    for upstream_config in &ctx.config.upstreams {
        let client = UpstreamClient::new(ctx.http_client.clone(), upstream_config);

        let domains = match client.list_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                // No deletes from a partial or missing list.
                warn!(
                    upstream = %upstream_config.hostname,
                    error = %e,
                    "Upstream unreachable, skipping for this cycle"
                );
                continue;
            }
        };
        run.upstreams_polled += 1;
        run.zones_in_upstream += domains.len();
        let upstream_set: HashSet<String> = domains.into_iter().collect();

        // Backfill and ownership migration for zones the upstream lists.
        for zone_name in &upstream_set {
            let Some(row) = ctx
                .store
                .get_domain(zone_name)
                .await
                .context("read domain during orphan pass")?
            else {
                continue;
            };
            match row.upstream_server_hostname.as_deref() {
                None | Some("") => {
                    info!(
                        zone = %zone_name,
                        upstream = %upstream_config.hostname,
                        "Backfilling missing upstream hostname"
                    );
                    ctx.store
                        .set_upstream_hostname(zone_name, &upstream_config.hostname)
                        .await?;
                    run.hostnames_backfilled += 1;
                }
                Some(recorded) if recorded != upstream_config.hostname => {
                    info!(
                        zone = %zone_name,
                        from = recorded,
                        to = %upstream_config.hostname,
                        "[migration] zone ownership migrated by reconcile"
                    );
                    ctx.store
                        .set_upstream_hostname(zone_name, &upstream_config.hostname)
                        .await?;
                    run.ownership_migrations += 1;
                }
                Some(_) => {}
            }
        }

        // Orphans: rows owned by this upstream it no longer lists.
        let owned = ctx
            .store
            .domains_owned_by(&upstream_config.hostname)
            .await
            .context("list owned domains during orphan pass")?;
        for row in owned {
            if upstream_set.contains(&row.zone_name) {
                continue;
            }
            run.orphans_found += 1;
            if ctx.config.reconcile.dry_run {
                info!(
                    zone = %row.zone_name,
                    upstream = %upstream_config.hostname,
                    "Dry run: orphan detected, delete not queued"
                );
                continue;
            }
            info!(
                zone = %row.zone_name,
                upstream = %upstream_config.hostname,
                "Orphan detected, queueing delete"
            );
            ctx.queues
                .delete
                .push(&DeleteItem {
                    zone_name: row.zone_name.clone(),
                    upstream_hostname: row
                        .upstream_server_hostname
                        .unwrap_or_else(|| upstream_config.hostname.clone()),
                    target_backends: None,
                })
                .context("enqueue orphan delete")?;
            run.orphans_queued += 1;
        }
    }
    Ok(())
}

/// Pass 2: re-push stored zone data to backends that are missing it.
async fn healing_pass(ctx: &Context, run: &mut ReconcileRun) -> Result<()> {
    let rows = ctx
        .store
        .list_domains()
        .await
        .context("list domains during healing pass")?;

    for row in rows {
        let Some(zone_data) = row.zone_data.filter(|data| !data.is_empty()) else {
            continue;
        };

        let mut missing: Vec<String> = Vec::new();
        for backend in &ctx.backends {
            match backend.zone_exists(&row.zone_name).await {
                Ok(true) => {}
                Ok(false) => missing.push(backend.name().to_string()),
                Err(e) => {
                    // Driver errors during healing are logged and skipped.
                    warn!(
                        backend = backend.name(),
                        zone = %row.zone_name,
                        error = %e,
                        "Backend check failed during healing, skipping"
                    );
                }
            }
        }
        if missing.is_empty() {
            continue;
        }

        debug!(
            zone = %row.zone_name,
            backends = ?missing,
            "Backends missing zone, queueing scoped heal"
        );
        ctx.queues
            .save
            .push(&SaveItem {
                zone_name: row.zone_name.clone(),
                zone_data,
                upstream_hostname: row.upstream_server_hostname.unwrap_or_default(),
                upstream_username: row.upstream_username.unwrap_or_default(),
                target_backends: Some(missing.clone()),
                // Healing restores content a backend lost; the zone itself
                // did not change, so the row keeps its timestamp.
                zone_updated_at: row.zone_updated_at,
            })
            .context("enqueue healing save")?;
        run.backends_healed += missing.len();
    }
    Ok(())
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod reconcile_tests;
