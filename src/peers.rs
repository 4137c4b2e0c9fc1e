// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Live peer set and per-peer health tracking.
//!
//! The peer set starts from the configured URLs and grows through gossip
//! discovery; it is never persisted - peers are cheap to rediscover. The
//! set is mutated by the peer-sync worker and read by the ingress
//! (`/internal/peers`, `/status`), so access goes through a read-write
//! lock.

use crate::constants::PEER_FAILURE_THRESHOLD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Health bookkeeping for one peer, in memory only.
#[derive(Debug, Clone, Default)]
pub struct PeerHealth {
    /// Consecutive sync failures since the last success
    pub consecutive_failures: u32,
    /// Last successful contact
    pub last_seen: Option<DateTime<Utc>>,
}

impl PeerHealth {
    /// A peer is healthy while its failure streak is below the threshold.
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.consecutive_failures < PEER_FAILURE_THRESHOLD
    }
}

/// Snapshot of one peer's state for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub url: String,
    pub consecutive_failures: u32,
    pub last_seen: Option<DateTime<Utc>>,
    pub healthy: bool,
}

/// The set of known peers with their health.
pub struct PeerSet {
    peers: RwLock<BTreeMap<String, PeerHealth>>,
}

impl PeerSet {
    /// Build the set from the statically configured peer URLs.
    #[must_use]
    pub fn new(initial: &[String]) -> Self {
        let peers = initial
            .iter()
            .map(|url| (url.clone(), PeerHealth::default()))
            .collect();
        Self {
            peers: RwLock::new(peers),
        }
    }

    /// All known peer URLs.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.peers
            .read()
            .expect("peer set poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Add a discovered peer. Returns `true` if it was new.
    pub fn add(&self, url: &str) -> bool {
        self.peers
            .write()
            .expect("peer set poisoned")
            .insert(url.to_string(), PeerHealth::default())
            .is_none()
    }

    /// Record a successful sync with a peer.
    ///
    /// Returns `true` if the peer had crossed the failure threshold and is
    /// now recovered.
    pub fn record_success(&self, url: &str) -> bool {
        let mut peers = self.peers.write().expect("peer set poisoned");
        let health = peers.entry(url.to_string()).or_default();
        let recovered = !health.healthy();
        health.consecutive_failures = 0;
        health.last_seen = Some(Utc::now());
        recovered
    }

    /// Record a failed sync with a peer. Returns the new failure streak.
    pub fn record_failure(&self, url: &str) -> u32 {
        let mut peers = self.peers.write().expect("peer set poisoned");
        let health = peers.entry(url.to_string()).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.consecutive_failures
    }

    /// Number of currently unhealthy peers.
    #[must_use]
    pub fn unhealthy_count(&self) -> usize {
        self.peers
            .read()
            .expect("peer set poisoned")
            .values()
            .filter(|health| !health.healthy())
            .count()
    }

    /// Snapshot every peer's state for `/status`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerStatus> {
        self.peers
            .read()
            .expect("peer set poisoned")
            .iter()
            .map(|(url, health)| PeerStatus {
                url: url.clone(),
                consecutive_failures: health.consecutive_failures,
                last_seen: health.last_seen,
                healthy: health.healthy(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "peers_tests.rs"]
mod peers_tests;
