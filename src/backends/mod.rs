// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backend driver contract and driver construction.
//!
//! Every DNS backend this daemon pushes zones into implements
//! [`BackendDriver`]: a uniform, idempotent contract over zone writes,
//! deletes, existence checks, record counting, and reconciliation. Two
//! drivers ship in-tree:
//!
//! - [`file::FileBackend`] - zone files plus a daemon-include file and a
//!   control-binary reload (BIND/NSD style)
//! - [`database::DatabaseBackend`] - row-level upsert/delete in a shared
//!   relational schema (CoreDNS/PowerDNS style)
//!
//! Drivers are thread-safe; the file driver serializes writes per zone with
//! a per-zone lock, the database driver relies on its transactions.

use crate::config::BackendConfig;
use crate::errors::BackendError;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub mod database;
pub mod file;

#[cfg(test)]
pub mod testutil;

/// Uniform contract every backend driver implements.
///
/// All operations are idempotent: re-writing a zone replaces all prior
/// content atomically from the daemon's consumers' perspective, and
/// deleting an absent zone succeeds.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// The backend's unique configured name.
    fn name(&self) -> &str;

    /// Replace the zone's contents with `zone_text`.
    async fn write_zone(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError>;

    /// Remove the zone. Removing an absent zone is not an error.
    async fn delete_zone(&self, zone_name: &str) -> Result<(), BackendError>;

    /// Whether the backend currently serves the zone.
    async fn zone_exists(&self, zone_name: &str) -> Result<bool, BackendError>;

    /// Number of records currently served for the zone, using the same
    /// counting rule as the zone parser.
    async fn count_records(&self, zone_name: &str) -> Result<usize, BackendError>;

    /// Remove everything held for `zone_name` that is not in `zone_text`
    /// and restore what is missing. Safe on an already-consistent zone.
    async fn reconcile(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError>;
}

/// Construct drivers for every enabled backend in the configuration.
///
/// # Errors
///
/// Returns an error if a driver fails to initialize (e.g. the database
/// backend's schema cannot be created).
pub async fn build_backends(configs: &[BackendConfig]) -> Result<Vec<Arc<dyn BackendDriver>>> {
    let mut drivers: Vec<Arc<dyn BackendDriver>> = Vec::new();
    for config in configs {
        if !config.enabled() {
            info!(backend = config.name(), "Backend disabled, skipping");
            continue;
        }
        match config {
            BackendConfig::File {
                name,
                zone_dir,
                include_file,
                reload_command,
                ..
            } => {
                drivers.push(Arc::new(file::FileBackend::new(
                    name.clone(),
                    zone_dir.clone(),
                    include_file.clone(),
                    reload_command.clone(),
                )?));
            }
            BackendConfig::Database {
                name, database_url, ..
            } => {
                drivers.push(Arc::new(
                    database::DatabaseBackend::open(name.clone(), database_url).await?,
                ));
            }
        }
        info!(backend = config.name(), "Backend driver initialized");
    }
    Ok(drivers)
}

/// Select drivers by name, preserving driver order.
///
/// Names without a matching driver are ignored; retry items may reference a
/// backend that has since been removed from the configuration.
#[must_use]
pub fn select_backends(
    drivers: &[Arc<dyn BackendDriver>],
    names: &[String],
) -> Vec<Arc<dyn BackendDriver>> {
    drivers
        .iter()
        .filter(|driver| names.iter().any(|name| name == driver.name()))
        .cloned()
        .collect()
}
