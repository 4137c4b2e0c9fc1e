// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end pipeline tests: queue items flow through the live workers
//! into real file backends and the datastore.

mod common;

use common::{file_backed_context, wait_for, zone_file, SAMPLE_ZONE};
use std::sync::Arc;
use tempfile::TempDir;
use zonegate::context::Context;
use zonegate::queue::{DeleteItem, SaveItem};
use zonegate::workers::{join_workers, spawn_workers};

fn save_item(zone: &str) -> SaveItem {
    SaveItem {
        zone_name: zone.to_string(),
        zone_data: SAMPLE_ZONE.to_string(),
        upstream_hostname: "da1.example.net".to_string(),
        upstream_username: "alice".to_string(),
        target_backends: None,
        zone_updated_at: None,
    }
}

/// Poll the store until the domain row's presence matches `want_present`.
async fn wait_for_row(ctx: &Arc<Context>, zone: &str, want_present: bool) -> bool {
    for _ in 0..200 {
        let present = ctx
            .store
            .get_domain(zone)
            .await
            .map(|row| row.is_some())
            .unwrap_or(false);
        if present == want_present {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_push_reaches_every_backend_and_store() {
    let dir = TempDir::new().unwrap();
    let ctx = file_backed_context(&dir, 2).await;
    let handles = spawn_workers(&ctx);

    ctx.queues.save.push(&save_item("example.com")).unwrap();

    // The save drainer writes both backends, then upserts the row.
    assert!(
        wait_for(
            || zone_file(&dir, 0, "example.com").exists()
                && zone_file(&dir, 1, "example.com").exists(),
            5000,
        )
        .await,
        "zone files never appeared"
    );
    assert_eq!(
        std::fs::read_to_string(zone_file(&dir, 0, "example.com")).unwrap(),
        SAMPLE_ZONE
    );
    assert!(
        wait_for_row(&ctx, "example.com", true).await,
        "domain row never appeared"
    );

    // Healthy path leaves nothing behind to retry.
    assert_eq!(ctx.queues.retry.depth(), 0);

    ctx.trigger_shutdown();
    join_workers(handles).await;
}

#[tokio::test]
async fn test_delete_flows_through_to_backends() {
    let dir = TempDir::new().unwrap();
    let ctx = file_backed_context(&dir, 2).await;
    let handles = spawn_workers(&ctx);

    ctx.queues.save.push(&save_item("gone.example")).unwrap();
    assert!(wait_for(|| zone_file(&dir, 1, "gone.example").exists(), 5000).await);
    assert!(wait_for_row(&ctx, "gone.example", true).await);

    ctx.queues
        .delete
        .push(&DeleteItem {
            zone_name: "gone.example".to_string(),
            upstream_hostname: "da1.example.net".to_string(),
            target_backends: None,
        })
        .unwrap();

    assert!(
        wait_for(
            || !zone_file(&dir, 0, "gone.example").exists()
                && !zone_file(&dir, 1, "gone.example").exists(),
            5000,
        )
        .await,
        "zone files were not removed"
    );
    assert!(
        wait_for_row(&ctx, "gone.example", false).await,
        "domain row was not removed"
    );

    ctx.trigger_shutdown();
    join_workers(handles).await;
}

#[tokio::test]
async fn test_queued_items_survive_a_restart() {
    let dir = TempDir::new().unwrap();

    // First "process": enqueue while no workers run, then drop everything.
    {
        let ctx = file_backed_context(&dir, 1).await;
        ctx.queues.save.push(&save_item("durable.example")).unwrap();
    }

    // Second "process": the item is still on disk and drains normally.
    let ctx = file_backed_context(&dir, 1).await;
    assert_eq!(ctx.queues.save.depth(), 1);
    let handles = spawn_workers(&ctx);

    assert!(
        wait_for(|| zone_file(&dir, 0, "durable.example").exists(), 5000).await,
        "queued item did not survive the restart"
    );

    ctx.trigger_shutdown();
    join_workers(handles).await;
}
