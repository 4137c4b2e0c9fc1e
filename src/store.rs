// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Internal datastore for domains and dead letters.
//!
//! The store is a small relational database (SQLite via sqlx by default;
//! `store.database_url` is the extension point for an external server). It
//! holds the `domains` table - the authoritative record of what the
//! backends were most recently asked to serve - and the `dead_letters`
//! table of operations that exhausted their retries.
//!
//! All timestamps are persisted as fixed-width RFC 3339 UTC text so that
//! lexicographic comparison in SQL matches chronological order.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::constants::DEFAULT_MANAGED_BY;

/// One row of the `domains` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRow {
    /// Canonical zone name (lowercased, dotless)
    pub zone_name: String,
    /// Upstream instance that currently owns the zone
    pub upstream_server_hostname: Option<String>,
    /// Last-seen owning user on the upstream
    pub upstream_username: Option<String>,
    /// Lifecycle tag
    pub managed_by: String,
    /// Exact zone text last successfully written to a backend
    pub zone_data: Option<String>,
    /// Wall-clock timestamp of the last successful write
    pub zone_updated_at: Option<DateTime<Utc>>,
}

/// One row of the `dead_letters` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRow {
    pub id: i64,
    /// Operation kind: `write` or `delete`
    pub kind: String,
    pub zone_name: String,
    /// Zone text for writes, empty for deletes
    pub payload: String,
    /// Backends that never succeeded
    pub backends: Vec<String>,
    /// Cause summary from the final failure
    pub cause: String,
    pub first_failure: DateTime<Utc>,
    pub last_failure: DateTime<Utc>,
    pub attempts: i64,
}

/// Render a timestamp in the fixed-width form used throughout the schema.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back to UTC.
fn parse_ts(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("Invalid stored timestamp '{text}'"))?
        .with_timezone(&Utc))
}

fn row_to_domain(row: &sqlx::sqlite::SqliteRow) -> Result<DomainRow> {
    let updated: Option<String> = row.get("zone_updated_at");
    Ok(DomainRow {
        zone_name: row.get("zone_name"),
        upstream_server_hostname: row.get("upstream_server_hostname"),
        upstream_username: row.get("upstream_username"),
        managed_by: row.get("managed_by"),
        zone_data: row.get("zone_data"),
        zone_updated_at: updated.as_deref().map(parse_ts).transpose()?,
    })
}

const DOMAIN_COLUMNS: &str = "zone_name, upstream_server_hostname, upstream_username, managed_by, zone_data, zone_updated_at";

/// Handle to the internal datastore.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the datastore and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated; the
    /// daemon treats this as an unrecoverable startup failure.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open datastore at '{database_url}'"))?;

        Self::migrate(&pool).await?;
        info!(database_url, "Datastore opened");
        Ok(Self { pool })
    }

    /// Create tables and additively add any columns missing on legacy
    /// `domains` rows (`zone_data`, `zone_updated_at`, `managed_by`).
    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS domains (
                zone_name TEXT PRIMARY KEY,
                upstream_server_hostname TEXT,
                upstream_username TEXT,
                managed_by TEXT NOT NULL DEFAULT 'directadmin',
                zone_data TEXT,
                zone_updated_at TEXT
            )
            ",
        )
        .execute(pool)
        .await
        .context("create domains table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS dead_letters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                zone_name TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '',
                backends TEXT NOT NULL,
                cause TEXT NOT NULL,
                first_failure TEXT NOT NULL,
                last_failure TEXT NOT NULL,
                attempts INTEGER NOT NULL
            )
            ",
        )
        .execute(pool)
        .await
        .context("create dead_letters table")?;

        let existing: Vec<String> = sqlx::query("PRAGMA table_info(domains)")
            .fetch_all(pool)
            .await
            .context("inspect domains schema")?
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        let additive = [
            ("zone_data", "ALTER TABLE domains ADD COLUMN zone_data TEXT"),
            (
                "zone_updated_at",
                "ALTER TABLE domains ADD COLUMN zone_updated_at TEXT",
            ),
            (
                "managed_by",
                "ALTER TABLE domains ADD COLUMN managed_by TEXT NOT NULL DEFAULT 'directadmin'",
            ),
        ];
        for (column, statement) in additive {
            if !existing.iter().any(|name| name == column) {
                debug!(column, "Adding missing column to legacy domains table");
                sqlx::query(statement)
                    .execute(pool)
                    .await
                    .with_context(|| format!("add column {column}"))?;
            }
        }

        Ok(())
    }

    /// The underlying pool, for status queries.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upsert a domain row after a successful backend write.
    ///
    /// `zone_updated_at` only moves forward: an upsert carrying an older
    /// timestamp keeps the existing value.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn upsert_zone(
        &self,
        zone_name: &str,
        zone_data: &str,
        upstream_hostname: &str,
        upstream_username: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let ts = fmt_ts(updated_at);
        sqlx::query(
            r"
            INSERT INTO domains
                (zone_name, upstream_server_hostname, upstream_username, managed_by,
                 zone_data, zone_updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (zone_name) DO UPDATE SET
                upstream_server_hostname = excluded.upstream_server_hostname,
                upstream_username        = excluded.upstream_username,
                managed_by               = excluded.managed_by,
                zone_data                = excluded.zone_data,
                zone_updated_at = CASE
                    WHEN domains.zone_updated_at IS NULL
                         OR excluded.zone_updated_at > domains.zone_updated_at
                    THEN excluded.zone_updated_at
                    ELSE domains.zone_updated_at
                END
            ",
        )
        .bind(zone_name)
        .bind(upstream_hostname)
        .bind(upstream_username)
        .bind(DEFAULT_MANAGED_BY)
        .bind(zone_data)
        .bind(&ts)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert domain {zone_name}"))?;
        Ok(())
    }

    /// Fetch one domain row.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn get_domain(&self, zone_name: &str) -> Result<Option<DomainRow>> {
        let row = sqlx::query(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains WHERE zone_name = ?"
        ))
        .bind(zone_name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("fetch domain {zone_name}"))?;
        row.as_ref().map(row_to_domain).transpose()
    }

    /// List all domain rows, ordered by zone name.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn list_domains(&self) -> Result<Vec<DomainRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains ORDER BY zone_name"
        ))
        .fetch_all(&self.pool)
        .await
        .context("list domains")?;
        rows.iter().map(row_to_domain).collect()
    }

    /// List domains owned by the given upstream hostname.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn domains_owned_by(&self, upstream_hostname: &str) -> Result<Vec<DomainRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains WHERE upstream_server_hostname = ? ORDER BY zone_name"
        ))
        .bind(upstream_hostname)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("list domains owned by {upstream_hostname}"))?;
        rows.iter().map(row_to_domain).collect()
    }

    /// Rewrite a row's owning upstream hostname (ownership transfer or
    /// reconciler backfill).
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn set_upstream_hostname(
        &self,
        zone_name: &str,
        upstream_hostname: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE domains SET upstream_server_hostname = ? WHERE zone_name = ?")
            .bind(upstream_hostname)
            .bind(zone_name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("set upstream hostname for {zone_name}"))?;
        Ok(())
    }

    /// Delete a domain row. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn delete_domain(&self, zone_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM domains WHERE zone_name = ?")
            .bind(zone_name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete domain {zone_name}"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of live domain rows.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn domain_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM domains")
            .fetch_one(&self.pool)
            .await
            .context("count domains")?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }

    /// Record an operation that exhausted its retries.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn insert_dead_letter(
        &self,
        kind: &str,
        zone_name: &str,
        payload: &str,
        backends: &[String],
        cause: &str,
        first_failure: DateTime<Utc>,
        last_failure: DateTime<Utc>,
        attempts: u32,
    ) -> Result<i64> {
        let backends_json =
            serde_json::to_string(backends).context("serialize dead-letter backends")?;
        let row = sqlx::query(
            r"
            INSERT INTO dead_letters
                (kind, zone_name, payload, backends, cause, first_failure, last_failure, attempts)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(kind)
        .bind(zone_name)
        .bind(payload)
        .bind(&backends_json)
        .bind(cause)
        .bind(fmt_ts(first_failure))
        .bind(fmt_ts(last_failure))
        .bind(i64::from(attempts))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("insert dead letter for {zone_name}"))?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Number of dead letters on record.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn dead_letter_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM dead_letters")
            .fetch_one(&self.pool)
            .await
            .context("count dead letters")?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }

    /// List dead letters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRow>> {
        let rows = sqlx::query(
            r"
            SELECT id, kind, zone_name, payload, backends, cause,
                   first_failure, last_failure, attempts
            FROM dead_letters
            ORDER BY last_failure DESC
            LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("list dead letters")?;

        rows.iter()
            .map(|row| {
                let backends_json: String = row.get("backends");
                Ok(DeadLetterRow {
                    id: row.get("id"),
                    kind: row.get("kind"),
                    zone_name: row.get("zone_name"),
                    payload: row.get("payload"),
                    backends: serde_json::from_str(&backends_json)
                        .context("decode dead-letter backends")?,
                    cause: row.get("cause"),
                    first_failure: parse_ts(&row.get::<String, _>("first_failure"))?,
                    last_failure: parse_ts(&row.get::<String, _>("last_failure"))?,
                    attempts: row.get("attempts"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
