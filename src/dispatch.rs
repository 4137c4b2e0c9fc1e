// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Parallel backend dispatch with per-backend verification.
//!
//! One enabled backend is called inline; two or more are dispatched
//! concurrently, one task per backend, and results are collected as they
//! complete so a slow or failing backend never blocks the others. The task
//! group is joined before the caller dequeues the next item.
//!
//! After a successful write the backend's record count is checked against
//! the parsed reference count; on disagreement the driver's `reconcile` is
//! invoked and the count re-checked. A mismatch after reconciliation is a
//! backend failure.

use crate::backends::BackendDriver;
use crate::errors::BackendError;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Result of one backend's participation in a dispatch.
#[derive(Debug)]
pub struct BackendOutcome {
    /// Backend name
    pub backend: String,
    /// What happened
    pub result: Result<(), BackendError>,
}

impl BackendOutcome {
    /// Whether this backend completed the operation.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Partition outcomes into succeeded backend names and failures.
///
/// Every [`BackendError`] carries its backend name, so the failure side is
/// just the errors; callers recover the names via [`BackendError::backend`].
#[must_use]
pub fn partition(outcomes: Vec<BackendOutcome>) -> (Vec<String>, Vec<BackendError>) {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(()) => succeeded.push(outcome.backend),
            Err(e) => failed.push(e),
        }
    }
    (succeeded, failed)
}

/// Write a zone to one backend and verify the served record count.
async fn write_and_verify(
    backend: &dyn BackendDriver,
    zone_name: &str,
    zone_text: &str,
    expected_count: usize,
) -> Result<(), BackendError> {
    backend.write_zone(zone_name, zone_text).await?;

    let count = backend.count_records(zone_name).await?;
    if count == expected_count {
        return Ok(());
    }

    warn!(
        backend = backend.name(),
        zone = zone_name,
        expected = expected_count,
        actual = count,
        "Record count mismatch after write, reconciling"
    );
    backend.reconcile(zone_name, zone_text).await?;

    let count = backend.count_records(zone_name).await?;
    if count == expected_count {
        debug!(
            backend = backend.name(),
            zone = zone_name,
            "Reconciliation converged the backend"
        );
        return Ok(());
    }
    Err(BackendError::VerifyMismatch {
        backend: backend.name().to_string(),
        zone: zone_name.to_string(),
        expected: expected_count,
        actual: count,
    })
}

/// Delete a zone from one backend and verify its absence.
async fn delete_and_verify(
    backend: &dyn BackendDriver,
    zone_name: &str,
) -> Result<(), BackendError> {
    backend.delete_zone(zone_name).await?;
    if backend.zone_exists(zone_name).await? {
        return Err(BackendError::DeleteFailed {
            backend: backend.name().to_string(),
            zone: zone_name.to_string(),
            reason: "zone still present after delete".to_string(),
        });
    }
    Ok(())
}

/// Write a zone to every target backend, verifying each.
///
/// `expected_count` is the reference record count from parsing the zone
/// text once, upstream of dispatch.
pub async fn dispatch_write(
    backends: &[Arc<dyn BackendDriver>],
    zone_name: &str,
    zone_text: &str,
    expected_count: usize,
) -> Vec<BackendOutcome> {
    match backends {
        [] => Vec::new(),
        [only] => {
            let result = write_and_verify(only.as_ref(), zone_name, zone_text, expected_count).await;
            vec![BackendOutcome {
                backend: only.name().to_string(),
                result,
            }]
        }
        many => {
            let mut tasks = JoinSet::new();
            for backend in many {
                let backend = backend.clone();
                let zone_name = zone_name.to_string();
                let zone_text = zone_text.to_string();
                tasks.spawn(async move {
                    let result =
                        write_and_verify(backend.as_ref(), &zone_name, &zone_text, expected_count)
                            .await;
                    BackendOutcome {
                        backend: backend.name().to_string(),
                        result,
                    }
                });
            }
            collect(tasks).await
        }
    }
}

/// Delete a zone from every target backend, verifying each.
pub async fn dispatch_delete(
    backends: &[Arc<dyn BackendDriver>],
    zone_name: &str,
) -> Vec<BackendOutcome> {
    match backends {
        [] => Vec::new(),
        [only] => {
            let result = delete_and_verify(only.as_ref(), zone_name).await;
            vec![BackendOutcome {
                backend: only.name().to_string(),
                result,
            }]
        }
        many => {
            let mut tasks = JoinSet::new();
            for backend in many {
                let backend = backend.clone();
                let zone_name = zone_name.to_string();
                tasks.spawn(async move {
                    let result = delete_and_verify(backend.as_ref(), &zone_name).await;
                    BackendOutcome {
                        backend: backend.name().to_string(),
                        result,
                    }
                });
            }
            collect(tasks).await
        }
    }
}

/// Join all dispatch tasks, collecting results as they complete.
async fn collect(mut tasks: JoinSet<BackendOutcome>) -> Vec<BackendOutcome> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "Dispatch task panicked"),
        }
    }
    outcomes
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod dispatch_tests;
