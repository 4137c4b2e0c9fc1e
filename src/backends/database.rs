// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Database-based backend driver.
//!
//! Pushes zones into a shared relational schema read by a database-backed
//! DNS daemon: one `backend_domains` row per zone, one `backend_records`
//! row per resource record. A zone write is a single transaction that
//! replaces all prior rows, so the daemon never observes a partial zone.
//!
//! In-zone targets (NS/CNAME/MX/SRV/PTR rdata) are stored as absolute
//! FQDNs, never origin-relativized: database daemons have no `$ORIGIN`
//! context.

use crate::errors::BackendError;
use crate::zone::{absolute_name, parse_zone, ParsedZone, ZoneRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use super::BackendDriver;

/// One normalized record row as stored in the shared schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RecordRow {
    name: String,
    rtype: String,
    content: String,
    ttl: Option<u32>,
    prio: Option<i64>,
}

/// Normalize a parsed record into its stored row form.
///
/// MX and SRV carry their priority in the dedicated column; host-name
/// targets are absolutized against the zone origin.
fn normalize_record(record: &ZoneRecord, origin: &str) -> RecordRow {
    let tokens: Vec<&str> = record.rdata.split_whitespace().collect();
    let (content, prio) = match record.rtype.as_str() {
        "MX" => match tokens.as_slice() {
            [prio, target] => (
                absolute_name(target, origin),
                prio.parse::<i64>().ok(),
            ),
            _ => (record.rdata.clone(), None),
        },
        "SRV" => match tokens.as_slice() {
            [prio, weight, port, target] => (
                format!("{weight} {port} {}", absolute_name(target, origin)),
                prio.parse::<i64>().ok(),
            ),
            _ => (record.rdata.clone(), None),
        },
        "NS" | "CNAME" | "PTR" | "DNAME" | "ALIAS" => (absolute_name(&record.rdata, origin), None),
        "SOA" => {
            if tokens.len() >= 2 {
                let mut parts = vec![
                    absolute_name(tokens[0], origin),
                    absolute_name(tokens[1], origin),
                ];
                parts.extend(tokens[2..].iter().map(ToString::to_string));
                (parts.join(" "), None)
            } else {
                (record.rdata.clone(), None)
            }
        }
        _ => (record.rdata.clone(), None),
    };

    RecordRow {
        name: record.name.clone(),
        rtype: record.rtype.clone(),
        content,
        ttl: record.ttl,
        prio,
    }
}

fn normalize_zone(zone: &ParsedZone) -> Vec<RecordRow> {
    zone.records
        .iter()
        .map(|record| normalize_record(record, &zone.origin))
        .collect()
}

/// Database-backed driver over a shared `backend_domains`/`backend_records`
/// schema.
pub struct DatabaseBackend {
    name: String,
    pool: SqlitePool,
}

impl DatabaseBackend {
    /// Open the shared schema, creating tables if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn open(name: String, database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid backend database URL '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open backend database '{database_url}'"))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS backend_domains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            ",
        )
        .execute(&pool)
        .await
        .context("create backend_domains table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS backend_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                rtype TEXT NOT NULL,
                content TEXT NOT NULL,
                ttl INTEGER,
                prio INTEGER
            )
            ",
        )
        .execute(&pool)
        .await
        .context("create backend_records table")?;

        info!(backend = %name, "Backend database schema ready");
        Ok(Self { name, pool })
    }

    fn error(&self, zone: &str, reason: impl std::fmt::Display) -> BackendError {
        BackendError::WriteFailed {
            backend: self.name.clone(),
            zone: zone.to_string(),
            reason: reason.to_string(),
        }
    }

    async fn domain_id(&self, zone_name: &str) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT id FROM backend_domains WHERE name = ?")
            .bind(zone_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("id")))
    }

    fn parse(&self, zone_name: &str, zone_text: &str) -> Result<ParsedZone, BackendError> {
        parse_zone(zone_name, zone_text).map_err(|e| BackendError::InvalidZone {
            backend: self.name.clone(),
            zone: zone_name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BackendDriver for DatabaseBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_zone(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError> {
        let zone = self.parse(zone_name, zone_text)?;
        let rows = normalize_zone(&zone);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| self.error(zone_name, e))?;

        sqlx::query("INSERT INTO backend_domains (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(zone_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.error(zone_name, e))?;
        let domain_id: i64 = sqlx::query("SELECT id FROM backend_domains WHERE name = ?")
            .bind(zone_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| self.error(zone_name, e))?
            .get("id");

        // Stale rows go before new rows land, inside the same transaction.
        sqlx::query("DELETE FROM backend_records WHERE domain_id = ?")
            .bind(domain_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.error(zone_name, e))?;

        for row in &rows {
            sqlx::query(
                "INSERT INTO backend_records (domain_id, name, rtype, content, ttl, prio) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(domain_id)
            .bind(&row.name)
            .bind(&row.rtype)
            .bind(&row.content)
            .bind(row.ttl.map(i64::from))
            .bind(row.prio)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.error(zone_name, e))?;
        }

        tx.commit().await.map_err(|e| self.error(zone_name, e))?;
        info!(backend = %self.name, zone = zone_name, records = rows.len(), "Zone rows replaced");
        Ok(())
    }

    async fn delete_zone(&self, zone_name: &str) -> Result<(), BackendError> {
        let map_err = |e: sqlx::Error| BackendError::DeleteFailed {
            backend: self.name.clone(),
            zone: zone_name.to_string(),
            reason: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let row = sqlx::query("SELECT id FROM backend_domains WHERE name = ?")
            .bind(zone_name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;
        let Some(row) = row else {
            debug!(backend = %self.name, zone = zone_name, "Zone already absent");
            return Ok(());
        };
        let domain_id: i64 = row.get("id");

        sqlx::query("DELETE FROM backend_records WHERE domain_id = ?")
            .bind(domain_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        sqlx::query("DELETE FROM backend_domains WHERE id = ?")
            .bind(domain_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        tx.commit().await.map_err(map_err)?;

        info!(backend = %self.name, zone = zone_name, "Zone rows deleted");
        Ok(())
    }

    async fn zone_exists(&self, zone_name: &str) -> Result<bool, BackendError> {
        self.domain_id(zone_name)
            .await
            .map(|id| id.is_some())
            .map_err(|e| self.error(zone_name, e))
    }

    async fn count_records(&self, zone_name: &str) -> Result<usize, BackendError> {
        let Some(domain_id) = self
            .domain_id(zone_name)
            .await
            .map_err(|e| self.error(zone_name, e))?
        else {
            return Ok(0);
        };
        let row = sqlx::query("SELECT COUNT(*) AS n FROM backend_records WHERE domain_id = ?")
            .bind(domain_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.error(zone_name, e))?;
        Ok(usize::try_from(row.get::<i64, _>("n")).unwrap_or(0))
    }

    async fn reconcile(&self, zone_name: &str, zone_text: &str) -> Result<(), BackendError> {
        let zone = self.parse(zone_name, zone_text)?;
        let mut reference = normalize_zone(&zone);
        reference.sort();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| self.error(zone_name, e))?;

        sqlx::query("INSERT INTO backend_domains (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(zone_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.error(zone_name, e))?;
        let domain_id: i64 = sqlx::query("SELECT id FROM backend_domains WHERE name = ?")
            .bind(zone_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| self.error(zone_name, e))?
            .get("id");

        let existing_rows =
            sqlx::query("SELECT id, name, rtype, content, ttl, prio FROM backend_records WHERE domain_id = ?")
                .bind(domain_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| self.error(zone_name, e))?;

        // Remove rows not present in the reference, remembering what stays.
        let mut kept: Vec<RecordRow> = Vec::new();
        let mut removed = 0usize;
        for row in &existing_rows {
            let candidate = RecordRow {
                name: row.get("name"),
                rtype: row.get("rtype"),
                content: row.get("content"),
                ttl: row
                    .get::<Option<i64>, _>("ttl")
                    .and_then(|t| u32::try_from(t).ok()),
                prio: row.get("prio"),
            };
            let wanted = reference.iter().filter(|r| **r == candidate).count();
            let already_kept = kept.iter().filter(|r| **r == candidate).count();
            if already_kept < wanted {
                kept.push(candidate);
            } else {
                sqlx::query("DELETE FROM backend_records WHERE id = ?")
                    .bind(row.get::<i64, _>("id"))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| self.error(zone_name, e))?;
                removed += 1;
            }
        }

        // Insert reference rows the backend is missing.
        let mut inserted = 0usize;
        for row in &reference {
            let wanted = reference.iter().filter(|r| *r == row).count();
            let have = kept.iter().filter(|r| *r == row).count();
            if have < wanted {
                kept.push(row.clone());
                sqlx::query(
                    "INSERT INTO backend_records (domain_id, name, rtype, content, ttl, prio) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(domain_id)
                .bind(&row.name)
                .bind(&row.rtype)
                .bind(&row.content)
                .bind(row.ttl.map(i64::from))
                .bind(row.prio)
                .execute(&mut *tx)
                .await
                .map_err(|e| self.error(zone_name, e))?;
                inserted += 1;
            }
        }

        tx.commit().await.map_err(|e| self.error(zone_name, e))?;
        info!(
            backend = %self.name,
            zone = zone_name,
            removed,
            inserted,
            "Zone reconciled against reference"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod database_tests;
