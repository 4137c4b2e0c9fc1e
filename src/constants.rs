// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the zonegate daemon.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// Identity Constants
// ============================================================================

/// Default `managed_by` lifecycle tag recorded on domain rows
pub const DEFAULT_MANAGED_BY: &str = "directadmin";

/// Environment variable prefix recognised by the configuration resolver
pub const ENV_PREFIX: &str = "ZONEGATE_";

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Default bind address for the ingress HTTP server
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0";

/// Default port for the ingress HTTP server
pub const DEFAULT_HTTP_PORT: u16 = 2222;

/// Path of the combined push/delete ingress endpoint
pub const DNS_ADMIN_PATH: &str = "/CMD_API_DNS_ADMIN";

/// Grace period for draining in-flight ingress handlers on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ============================================================================
// Queue Constants
// ============================================================================

/// Directory name of the save queue under the queue root
pub const SAVE_QUEUE_DIR: &str = "save_queue";

/// Directory name of the delete queue under the queue root
pub const DELETE_QUEUE_DIR: &str = "delete_queue";

/// Directory name of the retry queue under the queue root
pub const RETRY_QUEUE_DIR: &str = "retry_queue";

/// Queue backlog above which `/status` reports the daemon degraded
pub const QUEUE_BACKLOG_DEGRADED_THRESHOLD: usize = 500;

// ============================================================================
// Retry Constants
// ============================================================================

/// How often the retry drainer scans for eligible items
pub const RETRY_TICK: Duration = Duration::from_secs(5);

/// Maximum delivery attempts before an item is dead-lettered
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Delay (seconds) applied before each retry attempt, indexed by `attempt - 1`
pub const RETRY_BACKOFF_SECS: [u64; 5] = [30, 120, 300, 900, 1800];

// ============================================================================
// Worker Cadence Constants
// ============================================================================

/// Default reconciliation interval (60 minutes)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 3600;

/// Default reconciliation initial delay (no stagger)
pub const DEFAULT_RECONCILE_INITIAL_DELAY_SECS: u64 = 0;

/// Default peer sync interval (15 minutes)
pub const DEFAULT_PEER_SYNC_INTERVAL_SECS: u64 = 900;

/// Consecutive failures after which a peer is considered unhealthy
pub const PEER_FAILURE_THRESHOLD: u32 = 3;

/// Idle gap after which the save drainer considers a telemetry batch closed
pub const BATCH_IDLE_THRESHOLD: Duration = Duration::from_secs(2);

// ============================================================================
// Outbound Timeout Constants
// ============================================================================

/// Default timeout for upstream control-panel calls
pub const UPSTREAM_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for large upstream list endpoints
pub const UPSTREAM_LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for peer-to-peer calls
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 10;

/// Wall-clock cap for a backend daemon-reload exec
pub const RELOAD_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for paginated upstream domain listings
pub const UPSTREAM_LIST_PAGE_SIZE: usize = 500;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Path for the Prometheus metrics endpoint
pub const METRICS_PATH: &str = "/metrics";
