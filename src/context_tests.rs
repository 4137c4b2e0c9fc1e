// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the shared context.

#[cfg(test)]
mod tests {
    use crate::context::WorkerHealth;
    use crate::testutil::build_context;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_target_backends_default_is_all_enabled() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context(&dir, &["a", "b"]).await;

        let all = ctx.target_backends(None);
        assert_eq!(all.len(), 2);

        let scoped = ctx.target_backends(Some(&vec!["b".to_string()]));
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name(), "b");

        // A retry may reference a backend that was removed from config.
        let gone = ctx.target_backends(Some(&vec!["missing".to_string()]));
        assert!(gone.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context(&dir, &[]).await;

        let mut rx = ctx.shutdown_rx();
        assert!(!*rx.borrow());
        ctx.trigger_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(ctx.is_shutting_down());
    }

    #[test]
    fn test_worker_health_staleness() {
        let health = WorkerHealth::default();
        assert!(!health.alive("save_drainer", Duration::from_secs(60)));

        health.beat("save_drainer");
        assert!(health.alive("save_drainer", Duration::from_secs(60)));
        assert!(!health.alive("delete_drainer", Duration::from_secs(60)));

        let snapshot = health.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("save_drainer"));
    }
}
