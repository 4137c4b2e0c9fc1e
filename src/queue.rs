// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Durable on-disk FIFO queues.
//!
//! Each queue is a directory of JSON item files named by a zero-padded
//! sequence number. Enqueue writes a temp file, fsyncs it, renames it into
//! place, and fsyncs the directory, so a crash never leaves a half-written
//! item visible. Dequeue hands out the lowest-sequence item without touching
//! the file; the consumer calls [`Pending::commit`] only after the
//! post-consumption side effect (store update, retry enqueue, dead letter)
//! has itself been durably applied. Items that were dequeued but never
//! committed are re-delivered after a restart.
//!
//! Queues are single-consumer: one drainer task owns each queue's pop side.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

/// A queued zone write.
///
/// Enqueued by ingress pushes, reconciler healing, peer sync, and the retry
/// drainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveItem {
    /// Canonical zone name
    pub zone_name: String,
    /// Full zone text to write
    pub zone_data: String,
    /// Upstream hostname that owns the zone
    pub upstream_hostname: String,
    /// Last-seen owning user on the upstream
    pub upstream_username: String,
    /// Explicit target backends; `None` means all enabled backends
    #[serde(default)]
    pub target_backends: Option<Vec<String>>,
    /// Timestamp to record on the store row; `None` stamps the write time.
    /// Peer-applied and healing saves carry the existing timestamp so a
    /// re-applied zone does not read as a fresh edit to the rest of the
    /// mesh.
    #[serde(default)]
    pub zone_updated_at: Option<DateTime<Utc>>,
}

/// A queued zone delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItem {
    /// Canonical zone name
    pub zone_name: String,
    /// Owner recorded at delete-issue time
    pub upstream_hostname: String,
    /// Explicit target backends; `None` means all enabled backends
    #[serde(default)]
    pub target_backends: Option<Vec<String>>,
}

/// The original operation carried by a retry item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPayload {
    Save(SaveItem),
    Delete(DeleteItem),
}

/// A failed operation awaiting its next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryItem {
    /// The operation to repeat
    pub payload: RetryPayload,
    /// Backends that have not yet succeeded
    pub pending_backends: Vec<String>,
    /// Attempt number this item represents (1-based)
    pub attempt: u32,
    /// Earliest wall-clock instant the attempt may run
    pub not_before: DateTime<Utc>,
    /// When the operation first failed, carried through to dead letters
    pub first_failure: DateTime<Utc>,
}

impl RetryItem {
    /// The zone this retry concerns.
    #[must_use]
    pub fn zone_name(&self) -> &str {
        match &self.payload {
            RetryPayload::Save(item) => &item.zone_name,
            RetryPayload::Delete(item) => &item.zone_name,
        }
    }

    /// Stable operation label for logs and dead letters.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            RetryPayload::Save(_) => "write",
            RetryPayload::Delete(_) => "delete",
        }
    }
}

/// In-memory index over the queue directory.
struct QueueIndex {
    /// Sequence → item file path, for items not yet handed to the consumer
    pending: BTreeMap<u64, PathBuf>,
    /// Next sequence number to assign
    next_seq: u64,
}

/// A dequeued item whose file is still on disk.
///
/// Dropping a `Pending` without committing leaves the file in place, so the
/// item is re-delivered on the next daemon start.
#[must_use = "uncommitted items are only re-delivered after a restart"]
pub struct Pending<T> {
    /// The deserialized item
    pub item: T,
    path: PathBuf,
    dir: PathBuf,
}

impl<T> Pending<T> {
    /// Remove the item file, marking the item fully consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed or the directory
    /// cannot be synced.
    pub fn commit(self) -> Result<()> {
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove queue item {}", self.path.display()))?;
        sync_dir(&self.dir)
    }
}

/// Durable single-consumer FIFO queue of JSON-serializable items.
pub struct DurableQueue<T> {
    dir: PathBuf,
    index: Mutex<QueueIndex>,
    notify: Notify,
    _marker: PhantomData<fn() -> T>,
}

/// fsync a directory so renames and unlinks inside it are durable.
fn sync_dir(dir: &Path) -> Result<()> {
    let handle = fs::File::open(dir)
        .with_context(|| format!("Failed to open queue directory {}", dir.display()))?;
    handle
        .sync_all()
        .with_context(|| format!("Failed to sync queue directory {}", dir.display()))?;
    Ok(())
}

impl<T: Serialize + DeserializeOwned> DurableQueue<T> {
    /// Open (creating if necessary) the queue rooted at `dir` and index any
    /// items that survived a previous run.
    ///
    /// Stale temp files from interrupted enqueues are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or scanned.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create queue directory {}", dir.display()))?;

        let mut pending = BTreeMap::new();
        let mut next_seq: u64 = 0;
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to scan queue directory {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".tmp") {
                debug!(file = %path.display(), "Removing stale queue temp file");
                let _ = fs::remove_file(&path);
                continue;
            }
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let Ok(seq) = stem.parse::<u64>() else {
                continue;
            };
            next_seq = next_seq.max(seq + 1);
            pending.insert(seq, path);
        }

        if !pending.is_empty() {
            debug!(
                dir = %dir.display(),
                items = pending.len(),
                "Re-indexed surviving queue items"
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            index: Mutex::new(QueueIndex { pending, next_seq }),
            notify: Notify::new(),
            _marker: PhantomData,
        })
    }

    /// Durably append an item to the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn push(&self, item: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(item).context("Failed to serialize queue item")?;

        let seq = {
            let mut index = self.index.lock().expect("queue index poisoned");
            let seq = index.next_seq;
            index.next_seq += 1;
            seq
        };

        let tmp_path = self.dir.join(format!("{seq:020}.tmp"));
        let final_path = self.dir.join(format!("{seq:020}.json"));

        fs::write(&tmp_path, &json)
            .with_context(|| format!("Failed to write queue item {}", tmp_path.display()))?;
        let file = fs::File::open(&tmp_path)?;
        file.sync_all()
            .with_context(|| format!("Failed to sync queue item {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("Failed to publish queue item {}", final_path.display()))?;
        sync_dir(&self.dir)?;

        self.index
            .lock()
            .expect("queue index poisoned")
            .pending
            .insert(seq, final_path);
        self.notify.notify_one();
        Ok(())
    }

    /// Dequeue the lowest-sequence item without blocking.
    ///
    /// Returns `Ok(None)` when the queue is empty. Items whose file no
    /// longer deserializes are set aside as `.corrupt` and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error on filesystem failures.
    pub fn try_pop(&self) -> Result<Option<Pending<T>>> {
        loop {
            let entry = {
                let mut index = self.index.lock().expect("queue index poisoned");
                index.pending.pop_first()
            };
            let Some((seq, path)) = entry else {
                return Ok(None);
            };

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(seq, file = %path.display(), error = %e, "Failed to read queue item, skipping");
                    continue;
                }
            };
            match serde_json::from_slice::<T>(&bytes) {
                Ok(item) => {
                    return Ok(Some(Pending {
                        item,
                        path,
                        dir: self.dir.clone(),
                    }));
                }
                Err(e) => {
                    warn!(
                        seq,
                        file = %path.display(),
                        error = %e,
                        "Queue item does not deserialize, setting aside as .corrupt"
                    );
                    let corrupt = path.with_extension("corrupt");
                    let _ = fs::rename(&path, &corrupt);
                }
            }
        }
    }

    /// Dequeue the next item, waiting until one arrives or shutdown fires.
    ///
    /// Returns `Ok(None)` once shutdown is signalled.
    ///
    /// # Errors
    ///
    /// Returns an error on filesystem failures.
    pub async fn pop(&self, shutdown: &mut watch::Receiver<bool>) -> Result<Option<Pending<T>>> {
        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }
            if let Some(pending) = self.try_pop()? {
                return Ok(Some(pending));
            }
            tokio::select! {
                () = self.notify.notified() => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Number of items awaiting dequeue.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.index.lock().expect("queue index poisoned").pending.len()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;
