// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory backend driver for worker and dispatcher tests.

use crate::errors::BackendError;
use crate::zone::parse_zone;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::BackendDriver;

/// A controllable in-memory backend.
///
/// `fail_writes`/`fail_deletes` make operations fail with transient errors;
/// `miscount_until_reconciled` makes `count_records` under-report until
/// `reconcile` is called, exercising the verify-then-reconcile path.
#[derive(Default)]
pub struct MemoryBackend {
    name: String,
    zones: Mutex<HashMap<String, String>>,
    pub fail_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub miscount_until_reconciled: AtomicBool,
    pub write_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub reconcile_calls: AtomicUsize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// The zone text currently "served", if any.
    #[must_use]
    pub fn zone_text(&self, zone_name: &str) -> Option<String> {
        self.zones.lock().unwrap().get(zone_name).cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendDriver for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_zone(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::WriteFailed {
                backend: self.name.clone(),
                zone: zone_name.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.zones
            .lock()
            .unwrap()
            .insert(zone_name.to_string(), zone_text.to_string());
        Ok(())
    }

    async fn delete_zone(&self, zone_name: &str) -> Result<(), BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::DeleteFailed {
                backend: self.name.clone(),
                zone: zone_name.to_string(),
                reason: "injected delete failure".to_string(),
            });
        }
        self.zones.lock().unwrap().remove(zone_name);
        Ok(())
    }

    async fn zone_exists(&self, zone_name: &str) -> Result<bool, BackendError> {
        Ok(self.zones.lock().unwrap().contains_key(zone_name))
    }

    async fn count_records(&self, zone_name: &str) -> Result<usize, BackendError> {
        let Some(text) = self.zone_text(zone_name) else {
            return Ok(0);
        };
        let count = parse_zone(zone_name, &text)
            .map(|zone| zone.record_count())
            .unwrap_or(0);
        if self.miscount_until_reconciled.load(Ordering::SeqCst) {
            return Ok(count.saturating_sub(1));
        }
        Ok(count)
    }

    async fn reconcile(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError> {
        self.reconcile_calls.fetch_add(1, Ordering::SeqCst);
        self.miscount_until_reconciled.store(false, Ordering::SeqCst);
        self.zones
            .lock()
            .unwrap()
            .insert(zone_name.to_string(), zone_text.to_string());
        Ok(())
    }
}
