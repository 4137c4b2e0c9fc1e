// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Zonegate - DNS Control-Plane Daemon
//!
//! Zonegate sits between a hosting control panel (the upstream) and one or
//! more authoritative DNS daemons (the backends). The upstream pushes zone
//! contents over HTTP; zonegate durably queues each push, fans it out to
//! every enabled backend in parallel, verifies the backends by record
//! count, retries failed writes with backoff, reconciles drift against the
//! upstream, and gossips zone contents with peer instances for eventual
//! consistency across a multi-node deployment.
//!
//! ## Overview
//!
//! The overarching policy is durable-accept, repair-later: the ingress only
//! rejects what is structurally wrong (auth, body, ownership); everything
//! else is queued and healed by the workers.
//!
//! ## Modules
//!
//! - [`zone`] - RFC 1035 zone parsing, the verification reference
//! - [`queue`] - Crash-safe on-disk FIFO queues
//! - [`store`] - Internal datastore (domains, dead letters)
//! - [`backends`] - Backend driver contract, file and database drivers
//! - [`dispatch`] - Parallel fan-out with per-backend verification
//! - [`workers`] - Save/delete/retry drainers, reconciler, peer sync
//! - [`http`] - Basic-auth-guarded ingress, peer, and status endpoints
//! - [`upstream`] - Control-panel client with legacy fallback
//! - [`peers`] - Live peer set with health tracking
//!
//! ## Example
//!
//! ```rust,no_run
//! use zonegate::config::Config;
//! use zonegate::zone::parse_zone;
//!
//! let zone = parse_zone(
//!     "example.com",
//!     "@ IN SOA ns1.example.com. admin.example.com. 1 3600 600 604800 86400\n",
//! )
//! .expect("valid zone");
//! assert_eq!(zone.record_count(), 1);
//!
//! let config = Config::default();
//! assert_eq!(config.http.port, 2222);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod peers;
pub mod queue;
pub mod store;
pub mod upstream;
pub mod workers;
pub mod zone;

#[cfg(test)]
pub mod testutil;
