// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! File-based backend driver.
//!
//! Writes each zone to `{zone_dir}/{zone}.zone` and maintains a
//! daemon-include file with one `zone` stanza per managed zone, then
//! invokes the daemon's control binary to reload. Zone files are staged to
//! a temp file and renamed into place so the daemon never sees a partial
//! file; writes to the same zone are serialized by a per-zone lock.

use crate::constants::RELOAD_EXEC_TIMEOUT;
use crate::errors::BackendError;
use crate::zone::parse_zone;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::BackendDriver;

/// Extension used for managed zone files.
const ZONE_FILE_EXT: &str = "zone";

/// File-based backend: zone files + include file + daemon reload.
pub struct FileBackend {
    name: String,
    zone_dir: PathBuf,
    include_file: PathBuf,
    reload_command: Vec<String>,
    zone_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    // Serializes include-file rewrites racing from different zones.
    include_lock: tokio::sync::Mutex<()>,
}

impl FileBackend {
    /// Create the driver, ensuring the zone directory exists.
    ///
    /// An empty `reload_command` disables the reload exec; useful when an
    /// external watcher reloads the daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone directory cannot be created.
    pub fn new(
        name: String,
        zone_dir: PathBuf,
        include_file: PathBuf,
        reload_command: Vec<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&zone_dir)?;
        Ok(Self {
            name,
            zone_dir,
            include_file,
            reload_command,
            zone_locks: Mutex::new(HashMap::new()),
            include_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn zone_file_path(&self, zone_name: &str) -> PathBuf {
        self.zone_dir.join(format!("{zone_name}.{ZONE_FILE_EXT}"))
    }

    /// Reject zone names that could escape the zone directory.
    fn validate_zone_name(&self, zone_name: &str) -> Result<(), BackendError> {
        if zone_name.is_empty()
            || zone_name.contains('/')
            || zone_name.contains('\\')
            || zone_name.contains("..")
        {
            return Err(BackendError::InvalidZone {
                backend: self.name.clone(),
                zone: zone_name.to_string(),
                reason: "zone name is not a safe file name".to_string(),
            });
        }
        Ok(())
    }

    async fn lock_zone(&self, zone_name: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.zone_locks.lock().expect("zone lock map poisoned");
            locks
                .entry(zone_name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Write `content` to `path` atomically: temp file, fsync, rename.
    fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        let file = std::fs::File::open(&tmp)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rewrite the daemon-include file listing every managed zone.
    fn rewrite_include_file(&self) -> std::io::Result<()> {
        let mut zones: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&self.zone_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ZONE_FILE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    zones.push(stem.to_string());
                }
            }
        }
        zones.sort_unstable();

        let mut content = String::from("# Managed by zonegate; do not edit.\n");
        for zone in &zones {
            let file = self.zone_file_path(zone);
            content.push_str(&format!(
                "zone \"{zone}\" {{ type master; file \"{}\"; }};\n",
                file.display()
            ));
        }
        Self::write_atomic(&self.include_file, &content)
    }

    /// Invoke the daemon control binary, capped at the reload deadline.
    async fn reload_daemon(&self) -> Result<(), BackendError> {
        let Some((program, args)) = self.reload_command.split_first() else {
            debug!(backend = %self.name, "No reload command configured, skipping reload");
            return Ok(());
        };

        let output = tokio::time::timeout(
            RELOAD_EXEC_TIMEOUT,
            Command::new(program).args(args).output(),
        )
        .await;

        match output {
            Err(_) => Err(BackendError::ReloadFailed {
                backend: self.name.clone(),
                reason: format!("timed out after {}s", RELOAD_EXEC_TIMEOUT.as_secs()),
            }),
            Ok(Err(e)) => Err(BackendError::ReloadFailed {
                backend: self.name.clone(),
                reason: format!("failed to spawn '{program}': {e}"),
            }),
            Ok(Ok(output)) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(BackendError::ReloadFailed {
                    backend: self.name.clone(),
                    reason: format!("exit status {}: {}", output.status, stderr.trim()),
                })
            }
            Ok(Ok(_)) => {
                debug!(backend = %self.name, "Daemon reloaded");
                Ok(())
            }
        }
    }

    fn write_error(&self, zone_name: &str, reason: impl std::fmt::Display) -> BackendError {
        BackendError::WriteFailed {
            backend: self.name.clone(),
            zone: zone_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl BackendDriver for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_zone(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError> {
        self.validate_zone_name(zone_name)?;
        let _guard = self.lock_zone(zone_name).await;

        let path = self.zone_file_path(zone_name);
        Self::write_atomic(&path, zone_text).map_err(|e| self.write_error(zone_name, e))?;
        {
            let _include = self.include_lock.lock().await;
            self.rewrite_include_file()
                .map_err(|e| self.write_error(zone_name, format!("include file: {e}")))?;
        }
        self.reload_daemon().await?;

        info!(backend = %self.name, zone = zone_name, "Zone file written");
        Ok(())
    }

    async fn delete_zone(&self, zone_name: &str) -> Result<(), BackendError> {
        self.validate_zone_name(zone_name)?;
        let _guard = self.lock_zone(zone_name).await;

        let path = self.zone_file_path(zone_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(backend = %self.name, zone = zone_name, "Zone file already absent");
            }
            Err(e) => {
                return Err(BackendError::DeleteFailed {
                    backend: self.name.clone(),
                    zone: zone_name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        {
            let _include = self.include_lock.lock().await;
            self.rewrite_include_file()
                .map_err(|e| BackendError::DeleteFailed {
                    backend: self.name.clone(),
                    zone: zone_name.to_string(),
                    reason: format!("include file: {e}"),
                })?;
        }
        self.reload_daemon().await?;

        info!(backend = %self.name, zone = zone_name, "Zone file deleted");
        Ok(())
    }

    async fn zone_exists(&self, zone_name: &str) -> Result<bool, BackendError> {
        self.validate_zone_name(zone_name)?;
        Ok(self.zone_file_path(zone_name).exists())
    }

    async fn count_records(&self, zone_name: &str) -> Result<usize, BackendError> {
        self.validate_zone_name(zone_name)?;
        let path = self.zone_file_path(zone_name);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.write_error(zone_name, e)),
        };
        match parse_zone(zone_name, &text) {
            Ok(zone) => Ok(zone.record_count()),
            Err(e) => {
                warn!(backend = %self.name, zone = zone_name, error = %e, "Served zone file does not parse");
                Ok(0)
            }
        }
    }

    async fn reconcile(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError> {
        // The whole zone lives in one file, so reconciliation is a rewrite
        // from the reference text.
        self.write_zone(zone_name, zone_text).await
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod file_tests;
