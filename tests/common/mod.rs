// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared setup for integration tests: a context wired over temp storage
//! with real file-based backends.

use std::sync::Arc;
use tempfile::TempDir;
use zonegate::backends::build_backends;
use zonegate::config::{BackendConfig, Config};
use zonegate::context::{Context, Queues};
use zonegate::store::Store;

/// A zone with SOA + 2 NS + 1 A, 4 records total.
pub const SAMPLE_ZONE: &str = "$TTL 3600
@ IN SOA ns1.example.com. admin.example.com. 2024010101 3600 600 604800 86400
@ IN NS ns1.example.com.
@ IN NS ns2.example.com.
www IN A 192.0.2.10
";

/// Build a context with `count` file backends rooted under the temp dir.
pub async fn file_backed_context(dir: &TempDir, count: usize) -> Arc<Context> {
    let mut config = Config::default();
    config.node.hostname = "ns-test.local".to_string();
    config.auth.app_username = "app".to_string();
    config.auth.app_password = "app-secret".to_string();
    config.auth.peer_username = "peer".to_string();
    config.auth.peer_password = "peer-secret".to_string();
    config.store.database_url = format!("sqlite://{}/store.db", dir.path().display());
    config.queues.dir = dir.path().join("queues");
    config.backends = (0..count)
        .map(|i| BackendConfig::File {
            name: format!("file-{i}"),
            zone_dir: dir.path().join(format!("zones-{i}")),
            include_file: dir.path().join(format!("include-{i}.conf")),
            reload_command: vec![],
            enabled: true,
        })
        .collect();

    let store = Store::open(&config.store.database_url).await.unwrap();
    let queues = Queues::open(&config.queues.dir).unwrap();
    let backends = build_backends(&config.backends).await.unwrap();
    Arc::new(Context::new(config, store, queues, backends).unwrap())
}

/// Path of a zone file inside backend `i`.
pub fn zone_file(dir: &TempDir, backend: usize, zone: &str) -> std::path::PathBuf {
    dir.path().join(format!("zones-{backend}/{zone}.zone"))
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_for<F: Fn() -> bool>(predicate: F, timeout_ms: u64) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    predicate()
}
