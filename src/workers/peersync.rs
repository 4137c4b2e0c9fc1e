// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Peer-sync worker: newer-wins zone replication across the mesh.
//!
//! Each cycle contacts every peer in the live set: fetches its zone list
//! with peer-realm credentials, enqueues a local save for every zone where
//! the peer's `zone_updated_at` is strictly newer (owner set to this
//! node's own hostname - the zone is re-applied locally, not forwarded
//! upstream), and merges the peer's known-peer list into ours
//! (gossip-lite discovery). Conflict resolution is deterministic and
//! monotonic: last writer by `zone_updated_at` wins; equal timestamps are
//! a no-op. The queued save carries the peer's timestamp, so the converged
//! row compares equal on the following cycle and the mesh settles instead
//! of trading the same zone back and forth.
//!
//! Peer failures stay silent per-peer: a consecutive-failure counter marks
//! the peer unhealthy at the threshold and a later success logs it
//! recovered. Nothing else observes a peer outage.

use crate::context::Context;
use crate::http::internal::ZoneMeta;
use crate::metrics;
use crate::queue::SaveItem;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{sleep_observing, WORKER_PEER_SYNC};

/// Run the peer-sync worker until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let mut shutdown = ctx.shutdown_rx();
    let interval = Duration::from_secs(ctx.config.peers.sync_interval_secs);
    info!(
        interval_secs = interval.as_secs(),
        peers = ctx.peers.urls().len(),
        "Peer-sync worker started"
    );

    loop {
        ctx.worker_health.beat(WORKER_PEER_SYNC);
        sync_cycle(&ctx).await;

        if sleep_observing(&ctx, WORKER_PEER_SYNC, interval, &mut shutdown).await {
            break;
        }
    }

    info!("Peer-sync worker stopped");
}

/// One sync cycle over the current peer set.
pub async fn sync_cycle(ctx: &Context) {
    let timeout = Duration::from_secs(ctx.config.peers.timeout_secs);

    for peer in ctx.peers.urls() {
        match fetch_zones(ctx, &peer, timeout).await {
            Err(e) => {
                metrics::record_peer_sync(false);
                let streak = ctx.peers.record_failure(&peer);
                debug!(peer = %peer, error = %e, failures = streak, "Peer sync failed");
                if streak == crate::constants::PEER_FAILURE_THRESHOLD {
                    warn!(peer = %peer, failures = streak, "Peer marked unhealthy");
                }
            }
            Ok(zones) => {
                metrics::record_peer_sync(true);
                if ctx.peers.record_success(&peer) {
                    info!(peer = %peer, "Peer recovered");
                }

                let mut applied = 0usize;
                for meta in zones {
                    match apply_peer_zone(ctx, &meta).await {
                        Ok(true) => applied += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(peer = %peer, zone = %meta.zone_name, error = %e, "Failed to apply peer zone");
                        }
                    }
                }
                if applied > 0 {
                    info!(peer = %peer, zones = applied, "Queued newer zones from peer");
                }

                discover_peers(ctx, &peer, timeout).await;
            }
        }
    }
}

/// Fetch a peer's full zone list.
async fn fetch_zones(ctx: &Context, peer: &str, timeout: Duration) -> Result<Vec<ZoneMeta>> {
    let url = format!("{}/internal/zones", peer.trim_end_matches('/'));
    let response = ctx
        .http_client
        .get(&url)
        .basic_auth(
            &ctx.config.auth.peer_username,
            Some(&ctx.config.auth.peer_password),
        )
        .timeout(timeout)
        .send()
        .await?;
    if !response.status().is_success() {
        anyhow::bail!("peer answered HTTP {}", response.status());
    }
    Ok(response.json::<Vec<ZoneMeta>>().await?)
}

/// Compare one peer zone against the local store; enqueue a save when the
/// peer's version is strictly newer. Returns whether a save was queued.
async fn apply_peer_zone(ctx: &Context, meta: &ZoneMeta) -> Result<bool> {
    let local = ctx.store.get_domain(&meta.zone_name).await?;
    let peer_is_newer = match &local {
        None => true,
        Some(row) => match row.zone_updated_at {
            None => true,
            // Strictly newer wins; equal timestamps are a no-op.
            Some(local_ts) => local_ts < meta.zone_updated_at,
        },
    };
    if !peer_is_newer {
        return Ok(false);
    }

    debug!(
        zone = %meta.zone_name,
        peer_updated_at = %meta.zone_updated_at,
        "Peer holds a newer version, queueing local save"
    );
    ctx.queues.save.push(&SaveItem {
        zone_name: meta.zone_name.clone(),
        zone_data: meta.zone_data.clone(),
        // Re-applying locally: the owner is this node, not the peer's
        // upstream.
        upstream_hostname: ctx.hostname().to_string(),
        upstream_username: String::new(),
        target_backends: None,
        // Carry the peer's timestamp so the converged row compares equal
        // on the next cycle instead of reading as a fresh local edit.
        zone_updated_at: Some(meta.zone_updated_at),
    })?;
    Ok(true)
}

/// Gossip-lite mesh discovery: merge the peer's known-peer list.
async fn discover_peers(ctx: &Context, peer: &str, timeout: Duration) {
    let url = format!("{}/internal/peers", peer.trim_end_matches('/'));
    let response = ctx
        .http_client
        .get(&url)
        .basic_auth(
            &ctx.config.auth.peer_username,
            Some(&ctx.config.auth.peer_password),
        )
        .timeout(timeout)
        .send()
        .await;

    let urls: Vec<String> = match response {
        Ok(response) if response.status().is_success() => {
            match response.json::<Vec<String>>().await {
                Ok(urls) => urls,
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Peer list did not parse");
                    return;
                }
            }
        }
        Ok(response) => {
            debug!(peer = %peer, status = %response.status(), "Peer list fetch rejected");
            return;
        }
        Err(e) => {
            debug!(peer = %peer, error = %e, "Peer list fetch failed");
            return;
        }
    };

    for url in urls {
        // Never gossip ourselves into our own peer set.
        if url == ctx.config.node.advertise_url {
            continue;
        }
        if ctx.peers.add(&url) {
            info!(peer = %url, discovered_via = %peer, "Discovered new peer");
        }
    }
}

#[cfg(test)]
#[path = "peersync_tests.rs"]
mod peersync_tests;
