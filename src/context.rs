// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the HTTP server and all workers.
//!
//! Every worker and request handler receives an `Arc<Context>` carrying the
//! resolved configuration, the datastore, the three durable queues, the
//! backend drivers, the shared HTTP client, the live peer set, and the
//! composite shutdown signal. The context is constructed once at startup
//! and never mutated structurally afterwards; the mutable pieces (peer set,
//! reconciler stats, worker heartbeats) guard themselves.

use crate::backends::{select_backends, BackendDriver};
use crate::config::Config;
use crate::constants::UPSTREAM_HTTP_TIMEOUT;
use crate::peers::PeerSet;
use crate::queue::{DeleteItem, DurableQueue, RetryItem, SaveItem};
use crate::store::Store;
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// The three durable queues.
pub struct Queues {
    pub save: DurableQueue<SaveItem>,
    pub delete: DurableQueue<DeleteItem>,
    pub retry: DurableQueue<RetryItem>,
}

impl Queues {
    /// Open all three queues under the configured root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a queue directory cannot be created or scanned.
    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self {
            save: DurableQueue::open(&root.join(crate::constants::SAVE_QUEUE_DIR))
                .context("open save queue")?,
            delete: DurableQueue::open(&root.join(crate::constants::DELETE_QUEUE_DIR))
                .context("open delete queue")?,
            retry: DurableQueue::open(&root.join(crate::constants::RETRY_QUEUE_DIR))
                .context("open retry queue")?,
        })
    }
}

/// Counters from the most recent reconciliation cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileRun {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub upstreams_polled: usize,
    pub zones_in_upstream: usize,
    pub zones_in_store: usize,
    pub orphans_found: usize,
    pub orphans_queued: usize,
    pub hostnames_backfilled: usize,
    pub ownership_migrations: usize,
    pub backends_healed: usize,
}

/// Heartbeat registry for worker liveness.
///
/// Each worker stamps its name once per loop; `/status` treats a worker as
/// dead when its heartbeat is older than a multiple of its cadence.
#[derive(Default)]
pub struct WorkerHealth {
    beats: RwLock<BTreeMap<&'static str, DateTime<Utc>>>,
}

impl WorkerHealth {
    /// Record that the named worker is alive now.
    pub fn beat(&self, worker: &'static str) {
        self.beats
            .write()
            .expect("worker health poisoned")
            .insert(worker, Utc::now());
    }

    /// Whether the named worker has beaten within `max_age`.
    #[must_use]
    pub fn alive(&self, worker: &str, max_age: Duration) -> bool {
        let beats = self.beats.read().expect("worker health poisoned");
        beats.get(worker).is_some_and(|last| {
            Utc::now().signed_duration_since(*last).num_milliseconds()
                <= i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX)
        })
    }

    /// Snapshot every worker's last heartbeat.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.beats
            .read()
            .expect("worker health poisoned")
            .iter()
            .map(|(worker, ts)| ((*worker).to_string(), *ts))
            .collect()
    }
}

/// Shared state passed to the HTTP server and all workers.
pub struct Context {
    /// Resolved immutable configuration
    pub config: Config,
    /// Internal datastore
    pub store: Store,
    /// Durable queues
    pub queues: Queues,
    /// Enabled backend drivers, in configuration order
    pub backends: Vec<Arc<dyn BackendDriver>>,
    /// Shared HTTP client for upstream and peer calls
    pub http_client: reqwest::Client,
    /// Live peer set with health
    pub peers: PeerSet,
    /// Stats from the last reconciliation cycle
    pub reconcile_last_run: RwLock<Option<ReconcileRun>>,
    /// Worker heartbeat registry
    pub worker_health: WorkerHealth,
    shutdown_tx: watch::Sender<bool>,
}

impl Context {
    /// Assemble the context from its startup-constructed parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared HTTP client cannot be built.
    pub fn new(
        config: Config,
        store: Store,
        queues: Queues,
        backends: Vec<Arc<dyn BackendDriver>>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(UPSTREAM_HTTP_TIMEOUT)
            .build()
            .context("build shared HTTP client")?;

        let peers = PeerSet::new(&config.peers.urls);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            queues,
            backends,
            http_client,
            peers,
            reconcile_last_run: RwLock::new(None),
            worker_health: WorkerHealth::default(),
            shutdown_tx,
        })
    }

    /// A receiver on the composite shutdown signal.
    #[must_use]
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Fire the shutdown signal; all workers observe it.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Resolve the target backend set for a queue item: the item's explicit
    /// set when present (healing and retries), all enabled backends
    /// otherwise.
    #[must_use]
    pub fn target_backends(&self, explicit: Option<&Vec<String>>) -> Vec<Arc<dyn BackendDriver>> {
        match explicit {
            Some(names) => select_backends(&self.backends, names),
            None => self.backends.clone(),
        }
    }

    /// This node's hostname, recorded as owner on peer-sync writes.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.config.node.hostname
    }

    /// Store the stats of a finished reconcile cycle.
    pub fn set_reconcile_run(&self, run: ReconcileRun) {
        *self
            .reconcile_last_run
            .write()
            .expect("reconcile run poisoned") = Some(run);
    }

    /// The stats of the most recent reconcile cycle, if any.
    #[must_use]
    pub fn reconcile_run(&self) -> Option<ReconcileRun> {
        self.reconcile_last_run
            .read()
            .expect("reconcile run poisoned")
            .clone()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
