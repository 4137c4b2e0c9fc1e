// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the parallel dispatcher and verification loop.

#[cfg(test)]
mod tests {
    use crate::backends::testutil::MemoryBackend;
    use crate::backends::BackendDriver;
    use crate::dispatch::{dispatch_delete, dispatch_write, partition};
    use crate::errors::BackendError;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const ZONE_TEXT: &str = "$TTL 3600
@ IN SOA ns1.example.com. admin.example.com. 1 3600 600 604800 86400
@ IN NS ns1.example.com.
@ IN NS ns2.example.com.
www IN A 192.0.2.10
";

    fn drivers(backends: Vec<Arc<MemoryBackend>>) -> Vec<Arc<dyn BackendDriver>> {
        backends
            .into_iter()
            .map(|b| b as Arc<dyn BackendDriver>)
            .collect()
    }

    #[tokio::test]
    async fn test_single_backend_inline_write() {
        let backend = Arc::new(MemoryBackend::new("solo"));
        let outcomes = dispatch_write(
            &drivers(vec![backend.clone()]),
            "example.com",
            ZONE_TEXT,
            4,
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].succeeded());
        assert_eq!(backend.zone_text("example.com").unwrap(), ZONE_TEXT);
    }

    #[tokio::test]
    async fn test_two_backends_both_written() {
        let a = Arc::new(MemoryBackend::new("a"));
        let b = Arc::new(MemoryBackend::new("b"));
        let outcomes = dispatch_write(
            &drivers(vec![a.clone(), b.clone()]),
            "example.com",
            ZONE_TEXT,
            4,
        )
        .await;

        let (succeeded, failed) = partition(outcomes);
        assert_eq!(succeeded.len(), 2);
        assert!(failed.is_empty());
        assert!(a.zone_text("example.com").is_some());
        assert!(b.zone_text("example.com").is_some());
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_block_the_other() {
        let healthy = Arc::new(MemoryBackend::new("healthy"));
        let broken = Arc::new(MemoryBackend::new("broken"));
        broken.set_fail_writes(true);

        let outcomes = dispatch_write(
            &drivers(vec![healthy.clone(), broken.clone()]),
            "example.com",
            ZONE_TEXT,
            4,
        )
        .await;

        let (succeeded, failed) = partition(outcomes);
        assert_eq!(succeeded, vec!["healthy".to_string()]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].backend(), "broken");
        assert!(failed[0].is_transient());
    }

    #[tokio::test]
    async fn test_miscount_triggers_reconcile_then_succeeds() {
        let backend = Arc::new(MemoryBackend::new("drifty"));
        backend.miscount_until_reconciled.store(true, Ordering::SeqCst);

        let outcomes =
            dispatch_write(&drivers(vec![backend.clone()]), "example.com", ZONE_TEXT, 4).await;

        assert!(outcomes[0].succeeded());
        assert_eq!(backend.reconcile_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_verifies_absence() {
        let a = Arc::new(MemoryBackend::new("a"));
        let b = Arc::new(MemoryBackend::new("b"));
        let set = drivers(vec![a.clone(), b.clone()]);
        dispatch_write(&set, "example.com", ZONE_TEXT, 4).await;

        let outcomes = dispatch_delete(&set, "example.com").await;
        let (succeeded, failed) = partition(outcomes);
        assert_eq!(succeeded.len(), 2);
        assert!(failed.is_empty());
        assert!(a.zone_text("example.com").is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_reported() {
        let backend = Arc::new(MemoryBackend::new("stuck"));
        let set = drivers(vec![backend.clone()]);
        dispatch_write(&set, "example.com", ZONE_TEXT, 4).await;
        backend.set_fail_deletes(true);

        let outcomes = dispatch_delete(&set, "example.com").await;
        let (_, failed) = partition(outcomes);
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], BackendError::DeleteFailed { .. }));
        assert_eq!(failed[0].backend(), "stuck");
    }

    #[tokio::test]
    async fn test_empty_backend_set() {
        let outcomes = dispatch_write(&[], "example.com", ZONE_TEXT, 4).await;
        assert!(outcomes.is_empty());
    }
}
