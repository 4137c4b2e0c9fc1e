// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the composite status document.

#[cfg(test)]
mod tests {
    use crate::context::ReconcileRun;
    use crate::http::status::status;
    use crate::testutil::{build_context, SAMPLE_ZONE};
    use crate::workers::WORKER_NAMES;
    use axum::extract::State;
    use axum::http::StatusCode;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn beat_all(ctx: &crate::context::Context) {
        for name in WORKER_NAMES {
            ctx.worker_health.beat(name);
        }
    }

    #[tokio::test]
    async fn test_dead_workers_mean_error_state() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context(&dir, &[]).await;

        let response = status(State(ctx)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert_eq!(doc["state"], "error");
        assert_eq!(doc["workers"]["save_drainer"]["alive"], false);
    }

    #[tokio::test]
    async fn test_healthy_daemon_reports_ok() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context(&dir, &[]).await;
        beat_all(&ctx);
        ctx.store
            .upsert_zone("example.com", SAMPLE_ZONE, "da1", "alice", Utc::now())
            .await
            .unwrap();
        ctx.set_reconcile_run(ReconcileRun {
            started_at: Some(Utc::now()),
            orphans_queued: 1,
            ..ReconcileRun::default()
        });

        let response = status(State(ctx)).await;
        let doc = body_json(response).await;
        assert_eq!(doc["state"], "ok");
        assert_eq!(doc["zones"], 1);
        assert_eq!(doc["dead_letters"], 0);
        assert_eq!(doc["queues"]["save"], 0);
        assert_eq!(doc["last_reconcile"]["orphans_queued"], 1);
    }

    #[tokio::test]
    async fn test_dead_letters_degrade_state() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context(&dir, &[]).await;
        beat_all(&ctx);

        let now = Utc::now();
        ctx.store
            .insert_dead_letter(
                "write",
                "stuck.example",
                SAMPLE_ZONE,
                &["b".to_string()],
                "WriteFailed: connection refused",
                now,
                now,
                5,
            )
            .await
            .unwrap();

        let response = status(State(ctx)).await;
        let doc = body_json(response).await;
        assert_eq!(doc["state"], "degraded");
        assert_eq!(doc["dead_letters"], 1);
    }

    #[tokio::test]
    async fn test_unhealthy_peer_degrades_state() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context(&dir, &[]).await;
        beat_all(&ctx);

        ctx.peers.add("http://ns9.example.net:2222");
        for _ in 0..3 {
            ctx.peers.record_failure("http://ns9.example.net:2222");
        }

        let response = status(State(ctx)).await;
        let doc = body_json(response).await;
        assert_eq!(doc["state"], "degraded");
        assert_eq!(doc["peers"][0]["healthy"], false);
    }
}
