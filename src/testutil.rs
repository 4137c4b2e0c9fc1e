// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared helpers for unit tests: a fully wired [`Context`] over temp
//! storage and controllable in-memory backends.

use crate::backends::testutil::MemoryBackend;
use crate::backends::BackendDriver;
use crate::config::Config;
use crate::context::{Context, Queues};
use crate::store::Store;
use std::sync::Arc;
use tempfile::TempDir;

/// A zone with SOA + 2 NS + 1 A, 4 records total.
pub const SAMPLE_ZONE: &str = "$TTL 3600
@ IN SOA ns1.example.com. admin.example.com. 2024010101 3600 600 604800 86400
@ IN NS ns1.example.com.
@ IN NS ns2.example.com.
www IN A 192.0.2.10
";

/// Default test configuration over the given temp directory.
#[must_use]
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.node.hostname = "ns-test.local".to_string();
    config.node.advertise_url = "http://ns-test.local:2222".to_string();
    config.auth.app_username = "app".to_string();
    config.auth.app_password = "app-secret".to_string();
    config.auth.peer_username = "peer".to_string();
    config.auth.peer_password = "peer-secret".to_string();
    config.store.database_url = format!("sqlite://{}/store.db", dir.path().display());
    config.queues.dir = dir.path().join("queues");
    config
}

/// Build a context with the given in-memory backends.
pub async fn build_context(
    dir: &TempDir,
    backend_names: &[&str],
) -> (Arc<Context>, Vec<Arc<MemoryBackend>>) {
    build_context_with_config(test_config(dir), backend_names).await
}

/// Build a context from an explicit configuration.
pub async fn build_context_with_config(
    config: Config,
    backend_names: &[&str],
) -> (Arc<Context>, Vec<Arc<MemoryBackend>>) {
    let store = Store::open(&config.store.database_url)
        .await
        .expect("open test store");
    let queues = Queues::open(&config.queues.dir).expect("open test queues");

    let memories: Vec<Arc<MemoryBackend>> = backend_names
        .iter()
        .map(|name| Arc::new(MemoryBackend::new(name)))
        .collect();
    let drivers: Vec<Arc<dyn BackendDriver>> = memories
        .iter()
        .map(|m| m.clone() as Arc<dyn BackendDriver>)
        .collect();

    let context = Context::new(config, store, queues, drivers).expect("build test context");
    (Arc::new(context), memories)
}
