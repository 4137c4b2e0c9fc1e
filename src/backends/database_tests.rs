// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the database-based backend driver.

#[cfg(test)]
mod tests {
    use crate::backends::database::DatabaseBackend;
    use crate::backends::BackendDriver;
    use crate::errors::BackendError;
    use sqlx::Row;
    use tempfile::TempDir;

    const ZONE_TEXT: &str = "$TTL 3600
@ IN SOA ns1.example.com. admin.example.com. 2024010101 3600 600 604800 86400
@ IN NS ns1.example.com.
@ IN MX 10 @
mail IN A 192.0.2.20
alias IN CNAME @
";

    async fn backend(dir: &TempDir) -> DatabaseBackend {
        let url = format!("sqlite://{}/backend.db", dir.path().display());
        DatabaseBackend::open("pdns-db".to_string(), &url)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_and_count() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        backend.write_zone("example.com", ZONE_TEXT).await.unwrap();
        assert_eq!(backend.count_records("example.com").await.unwrap(), 5);
        assert!(backend.zone_exists("example.com").await.unwrap());
        assert_eq!(backend.count_records("other.example").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_all_rows() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        backend.write_zone("example.com", ZONE_TEXT).await.unwrap();
        let smaller = "@ IN SOA ns1.example.com. admin.example.com. 2 3600 600 604800 86400\n@ IN NS ns1.example.com.\n";
        backend.write_zone("example.com", smaller).await.unwrap();
        assert_eq!(backend.count_records("example.com").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_apex_targets_stored_as_absolute_fqdn() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        backend.write_zone("example.com", ZONE_TEXT).await.unwrap();

        let url = format!("sqlite://{}/backend.db", dir.path().display());
        let pool = sqlx::SqlitePool::connect(&url).await.unwrap();

        let cname = sqlx::query(
            "SELECT content FROM backend_records WHERE rtype = 'CNAME'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(cname.get::<String, _>("content"), "example.com");

        let mx = sqlx::query("SELECT content, prio FROM backend_records WHERE rtype = 'MX'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mx.get::<String, _>("content"), "example.com");
        assert_eq!(mx.get::<i64, _>("prio"), 10);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        backend.write_zone("example.com", ZONE_TEXT).await.unwrap();
        backend.delete_zone("example.com").await.unwrap();
        assert!(!backend.zone_exists("example.com").await.unwrap());
        assert_eq!(backend.count_records("example.com").await.unwrap(), 0);
        // Deleting again is fine.
        backend.delete_zone("example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_removes_foreign_rows_and_restores_missing() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        backend.write_zone("example.com", ZONE_TEXT).await.unwrap();

        let url = format!("sqlite://{}/backend.db", dir.path().display());
        let pool = sqlx::SqlitePool::connect(&url).await.unwrap();

        // Drift: a row the reference does not contain, plus a missing row.
        sqlx::query(
            "INSERT INTO backend_records (domain_id, name, rtype, content, ttl, prio)
             SELECT id, 'rogue.example.com', 'A', '203.0.113.9', 60, NULL
             FROM backend_domains WHERE name = 'example.com'",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("DELETE FROM backend_records WHERE rtype = 'A' AND content = '192.0.2.20'")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(backend.count_records("example.com").await.unwrap(), 5);

        backend.reconcile("example.com", ZONE_TEXT).await.unwrap();
        assert_eq!(backend.count_records("example.com").await.unwrap(), 5);

        let rogue = sqlx::query("SELECT COUNT(*) AS n FROM backend_records WHERE name = 'rogue.example.com'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rogue.get::<i64, _>("n"), 0);
        let mail = sqlx::query("SELECT COUNT(*) AS n FROM backend_records WHERE content = '192.0.2.20'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mail.get::<i64, _>("n"), 1);
    }

    #[tokio::test]
    async fn test_reconcile_on_consistent_zone_is_noop() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        backend.write_zone("example.com", ZONE_TEXT).await.unwrap();
        backend.reconcile("example.com", ZONE_TEXT).await.unwrap();
        assert_eq!(backend.count_records("example.com").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unparseable_zone_rejected_permanently() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        let err = backend
            .write_zone("example.com", "complete garbage\n")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidZone { .. }));
        assert!(!err.is_transient());
    }
}
