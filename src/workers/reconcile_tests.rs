// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the reconciliation worker.

#[cfg(test)]
mod tests {
    use crate::backends::BackendDriver;
    use crate::config::UpstreamConfig;
    use crate::testutil::{build_context_with_config, test_config, SAMPLE_ZONE};
    use crate::workers::reconcile::run_cycle;
    use chrono::Utc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(server: &MockServer) -> UpstreamConfig {
        UpstreamConfig {
            hostname: "da1.example.net".to_string(),
            base_url: server.uri(),
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        }
    }

    async fn mock_domains(server: &MockServer, domains: Vec<&str>) {
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(domains))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_orphan_detected_and_delete_queued() {
        let server = MockServer::start().await;
        mock_domains(&server, vec!["keep.example"]).await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.upstreams = vec![upstream(&server)];
        let (ctx, _) = build_context_with_config(config, &["a"]).await;

        let now = Utc::now();
        ctx.store
            .upsert_zone("keep.example", SAMPLE_ZONE, "da1.example.net", "alice", now)
            .await
            .unwrap();
        ctx.store
            .upsert_zone("old.example", SAMPLE_ZONE, "da1.example.net", "alice", now)
            .await
            .unwrap();

        let run = run_cycle(&ctx).await.unwrap();

        assert_eq!(run.upstreams_polled, 1);
        assert_eq!(run.orphans_found, 1);
        assert_eq!(run.orphans_queued, 1);

        let pending = ctx.queues.delete.try_pop().unwrap().unwrap();
        assert_eq!(pending.item.zone_name, "old.example");
        assert_eq!(pending.item.upstream_hostname, "da1.example.net");
        pending.commit().unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_logs_but_does_not_queue() {
        let server = MockServer::start().await;
        mock_domains(&server, vec![]).await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.upstreams = vec![upstream(&server)];
        config.reconcile.dry_run = true;
        let (ctx, _) = build_context_with_config(config, &["a"]).await;

        ctx.store
            .upsert_zone(
                "old.example",
                SAMPLE_ZONE,
                "da1.example.net",
                "alice",
                Utc::now(),
            )
            .await
            .unwrap();

        let run = run_cycle(&ctx).await.unwrap();
        assert!(run.dry_run);
        assert_eq!(run.orphans_found, 1);
        assert_eq!(run.orphans_queued, 0);
        assert_eq!(ctx.queues.delete.depth(), 0);
    }

    #[tokio::test]
    async fn test_hostname_backfill_and_migration() {
        let server = MockServer::start().await;
        mock_domains(&server, vec!["blank.example", "moved.example"]).await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.upstreams = vec![upstream(&server)];
        let (ctx, _) = build_context_with_config(config, &["a"]).await;

        // A legacy row with no recorded owner, and one owned elsewhere.
        sqlx::query("INSERT INTO domains (zone_name) VALUES ('blank.example')")
            .execute(ctx.store.pool())
            .await
            .unwrap();
        ctx.store
            .upsert_zone(
                "moved.example",
                SAMPLE_ZONE,
                "da9.example.net",
                "bob",
                Utc::now(),
            )
            .await
            .unwrap();

        let run = run_cycle(&ctx).await.unwrap();
        assert_eq!(run.hostnames_backfilled, 1);
        assert_eq!(run.ownership_migrations, 1);

        let blank = ctx.store.get_domain("blank.example").await.unwrap().unwrap();
        assert_eq!(
            blank.upstream_server_hostname.as_deref(),
            Some("da1.example.net")
        );
        let moved = ctx.store.get_domain("moved.example").await.unwrap().unwrap();
        assert_eq!(
            moved.upstream_server_hostname.as_deref(),
            Some("da1.example.net")
        );
    }

    #[tokio::test]
    async fn test_unreachable_upstream_enqueues_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.upstreams = vec![upstream(&server)];
        let (ctx, _) = build_context_with_config(config, &["a"]).await;

        ctx.store
            .upsert_zone(
                "old.example",
                SAMPLE_ZONE,
                "da1.example.net",
                "alice",
                Utc::now(),
            )
            .await
            .unwrap();

        // Safety against false orphans: a failed poll must not delete.
        let run = run_cycle(&ctx).await.unwrap();
        assert_eq!(run.upstreams_polled, 0);
        assert_eq!(run.orphans_found, 0);
        assert_eq!(ctx.queues.delete.depth(), 0);
    }

    #[tokio::test]
    async fn test_healing_targets_only_missing_backends() {
        let dir = TempDir::new().unwrap();
        let (ctx, backends) = build_context_with_config(test_config(&dir), &["a", "b"]).await;

        // Backend a serves the zone, backend b lost it.
        backends[0]
            .write_zone("healme.example", SAMPLE_ZONE)
            .await
            .unwrap();
        ctx.store
            .upsert_zone(
                "healme.example",
                SAMPLE_ZONE,
                "da1.example.net",
                "alice",
                Utc::now(),
            )
            .await
            .unwrap();

        let run = run_cycle(&ctx).await.unwrap();
        assert_eq!(run.backends_healed, 1);

        let pending = ctx.queues.save.try_pop().unwrap().unwrap();
        assert_eq!(pending.item.zone_name, "healme.example");
        assert_eq!(pending.item.zone_data, SAMPLE_ZONE);
        assert_eq!(
            pending.item.target_backends,
            Some(vec!["b".to_string()])
        );
        pending.commit().unwrap();
    }

    #[tokio::test]
    async fn test_rows_without_zone_data_are_not_healed() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = build_context_with_config(test_config(&dir), &["a"]).await;

        sqlx::query("INSERT INTO domains (zone_name) VALUES ('empty.example')")
            .execute(ctx.store.pool())
            .await
            .unwrap();

        let run = run_cycle(&ctx).await.unwrap();
        assert_eq!(run.backends_healed, 0);
        assert_eq!(ctx.queues.save.depth(), 0);
    }
}
