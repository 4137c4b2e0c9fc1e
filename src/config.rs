// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration resolution for the zonegate daemon.
//!
//! Configuration is merged from three layers, strongest first:
//!
//! 1. `ZONEGATE_*` environment variables, applied through an explicit
//!    key → setter table
//! 2. a YAML configuration file
//! 3. built-in defaults
//!
//! The resolved [`Config`] is immutable once constructed and passed into
//! the core by value; nothing in the daemon reads configuration from the
//! environment after startup.

use crate::constants::{
    DEFAULT_HTTP_BIND_ADDRESS, DEFAULT_HTTP_PORT, DEFAULT_PEER_SYNC_INTERVAL_SECS,
    DEFAULT_PEER_TIMEOUT_SECS, DEFAULT_RECONCILE_INITIAL_DELAY_SECS,
    DEFAULT_RECONCILE_INTERVAL_SECS,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Identity of this node in the mesh.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Hostname recorded as the owner on peer-sync-originated writes.
    /// Falls back to the `HOSTNAME` environment variable when empty.
    pub hostname: String,
    /// URL peers use to reach this node; never gossiped into our own peer set
    pub advertise_url: String,
}

/// Ingress HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address for the ingress listener
    pub bind_address: String,
    /// Port for the ingress listener
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_HTTP_BIND_ADDRESS.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Basic-auth credentials for the two ingress realms.
///
/// The "app" realm guards upstream pushes and `/status`; the "peer" realm
/// guards the `/internal/*` endpoints used by sibling nodes.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub app_username: String,
    pub app_password: String,
    pub peer_username: String,
    pub peer_password: String,
}

/// Internal datastore settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx database URL, e.g. `sqlite:///var/lib/zonegate/zonegate.db`
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://zonegate.db".to_string(),
        }
    }
}

/// Durable queue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Root directory holding the three queue directories
    pub dir: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("queues"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One configured backend driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// File-based driver: zone files plus a daemon-include file and a
    /// control-binary reload
    File {
        /// Unique backend name used in retry scoping and dead letters
        name: String,
        /// Directory zone files are written into
        zone_dir: PathBuf,
        /// Include file listing every managed zone for the daemon
        include_file: PathBuf,
        /// Control binary argv invoked after every mutation
        reload_command: Vec<String>,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    /// Database-based driver: row-level upsert/delete in a shared schema
    Database {
        /// Unique backend name used in retry scoping and dead letters
        name: String,
        /// sqlx database URL of the shared schema
        database_url: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

impl BackendConfig {
    /// The backend's unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Database { name, .. } => name,
        }
    }

    /// Whether the backend participates in dispatch.
    #[must_use]
    pub fn enabled(&self) -> bool {
        match self {
            Self::File { enabled, .. } | Self::Database { enabled, .. } => *enabled,
        }
    }
}

/// One upstream control panel this node serves.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Hostname recorded as `upstream_server_hostname` on owned rows
    pub hostname: String,
    /// Base URL of the upstream API, e.g. `https://panel1.example.net:2222`
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Peer mesh settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Statically configured peer URLs; gossip extends this set at runtime
    pub urls: Vec<String>,
    /// Seconds between peer sync cycles
    pub sync_interval_secs: u64,
    /// Per-call timeout for peer HTTP requests
    pub timeout_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            sync_interval_secs: DEFAULT_PEER_SYNC_INTERVAL_SECS,
            timeout_secs: DEFAULT_PEER_TIMEOUT_SECS,
        }
    }
}

/// Reconciliation worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between reconcile cycles
    pub interval_secs: u64,
    /// Seconds to wait before the first cycle, to stagger siblings
    pub initial_delay_secs: u64,
    /// When true, orphan deletes are logged but not enqueued
    pub dry_run: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            initial_delay_secs: DEFAULT_RECONCILE_INITIAL_DELAY_SECS,
            dry_run: false,
        }
    }
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub http: HttpConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub queues: QueueConfig,
    pub backends: Vec<BackendConfig>,
    pub upstreams: Vec<UpstreamConfig>,
    pub peers: PeerConfig,
    pub reconcile: ReconcileConfig,
}

/// A single environment override: recognised key suffix plus the setter
/// applied when the variable is present.
type Setter = fn(&mut Config, &str) -> Result<()>;

fn set_node_hostname(c: &mut Config, v: &str) -> Result<()> {
    c.node.hostname = v.to_string();
    Ok(())
}

fn set_node_advertise_url(c: &mut Config, v: &str) -> Result<()> {
    c.node.advertise_url = v.to_string();
    Ok(())
}

fn set_http_bind_address(c: &mut Config, v: &str) -> Result<()> {
    c.http.bind_address = v.to_string();
    Ok(())
}

fn set_http_port(c: &mut Config, v: &str) -> Result<()> {
    c.http.port = v.parse().context("HTTP_PORT must be a port number")?;
    Ok(())
}

fn set_app_username(c: &mut Config, v: &str) -> Result<()> {
    c.auth.app_username = v.to_string();
    Ok(())
}

fn set_app_password(c: &mut Config, v: &str) -> Result<()> {
    c.auth.app_password = v.to_string();
    Ok(())
}

fn set_peer_username(c: &mut Config, v: &str) -> Result<()> {
    c.auth.peer_username = v.to_string();
    Ok(())
}

fn set_peer_password(c: &mut Config, v: &str) -> Result<()> {
    c.auth.peer_password = v.to_string();
    Ok(())
}

fn set_database_url(c: &mut Config, v: &str) -> Result<()> {
    c.store.database_url = v.to_string();
    Ok(())
}

fn set_queue_dir(c: &mut Config, v: &str) -> Result<()> {
    c.queues.dir = PathBuf::from(v);
    Ok(())
}

fn set_peer_url(c: &mut Config, v: &str) -> Result<()> {
    // Env admits a single peer; N >= 2 peers require the config file.
    c.peers.urls = vec![v.to_string()];
    Ok(())
}

fn set_peer_sync_interval(c: &mut Config, v: &str) -> Result<()> {
    c.peers.sync_interval_secs = v.parse().context("PEER_SYNC_INTERVAL_SECS must be seconds")?;
    Ok(())
}

fn set_peer_timeout(c: &mut Config, v: &str) -> Result<()> {
    c.peers.timeout_secs = v.parse().context("PEER_TIMEOUT_SECS must be seconds")?;
    Ok(())
}

fn set_reconcile_interval(c: &mut Config, v: &str) -> Result<()> {
    c.reconcile.interval_secs = v
        .parse()
        .context("RECONCILE_INTERVAL_SECS must be seconds")?;
    Ok(())
}

fn set_reconcile_initial_delay(c: &mut Config, v: &str) -> Result<()> {
    c.reconcile.initial_delay_secs = v
        .parse()
        .context("RECONCILE_INITIAL_DELAY_SECS must be seconds")?;
    Ok(())
}

fn set_reconcile_dry_run(c: &mut Config, v: &str) -> Result<()> {
    c.reconcile.dry_run = v.parse().context("RECONCILE_DRY_RUN must be true/false")?;
    Ok(())
}

/// Explicit key → setter table for environment overrides.
///
/// Keys are suffixes; the full variable name is `ZONEGATE_<KEY>`.
const ENV_SETTERS: &[(&str, Setter)] = &[
    ("NODE_HOSTNAME", set_node_hostname),
    ("NODE_ADVERTISE_URL", set_node_advertise_url),
    ("HTTP_BIND_ADDRESS", set_http_bind_address),
    ("HTTP_PORT", set_http_port),
    ("APP_USERNAME", set_app_username),
    ("APP_PASSWORD", set_app_password),
    ("PEER_USERNAME", set_peer_username),
    ("PEER_PASSWORD", set_peer_password),
    ("DATABASE_URL", set_database_url),
    ("QUEUE_DIR", set_queue_dir),
    ("PEER_URL", set_peer_url),
    ("PEER_SYNC_INTERVAL_SECS", set_peer_sync_interval),
    ("PEER_TIMEOUT_SECS", set_peer_timeout),
    ("RECONCILE_INTERVAL_SECS", set_reconcile_interval),
    ("RECONCILE_INITIAL_DELAY_SECS", set_reconcile_initial_delay),
    ("RECONCILE_DRY_RUN", set_reconcile_dry_run),
];

impl Config {
    /// Load configuration: defaults, then the YAML file, then environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, if
    /// an environment override has an unparseable value, or if validation
    /// fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(std::env::vars())?;
        config.finalize()?;
        Ok(config)
    }

    /// Apply `ZONEGATE_*` environment overrides from the given variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognised key carries an unparseable value.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix(crate::constants::ENV_PREFIX) else {
                continue;
            };
            if let Some((_, setter)) = ENV_SETTERS.iter().find(|(name, _)| *name == suffix) {
                setter(self, &value)
                    .with_context(|| format!("Invalid value for environment variable {key}"))?;
            }
        }
        Ok(())
    }

    /// Fill derived defaults and validate the resolved configuration.
    fn finalize(&mut self) -> Result<()> {
        if self.node.hostname.is_empty() {
            self.node.hostname =
                std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        }

        if !self.node.advertise_url.is_empty() {
            Url::parse(&self.node.advertise_url).context("node.advertise_url is not a URL")?;
        }
        for peer in &self.peers.urls {
            Url::parse(peer).with_context(|| format!("peer URL '{peer}' is not a URL"))?;
        }

        let mut names: Vec<&str> = self.backends.iter().map(BackendConfig::name).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.backends.len() {
            anyhow::bail!("backend names must be unique");
        }

        Ok(())
    }

    /// The enabled backends, in configuration order.
    #[must_use]
    pub fn enabled_backends(&self) -> Vec<&BackendConfig> {
        self.backends.iter().filter(|b| b.enabled()).collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
