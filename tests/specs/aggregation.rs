// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shard-result aggregation and restart recovery specs.

use super::harness::*;
use tp_core::{CaseCounts, RunStatus};
use tp_storage::{load_snapshot, save_snapshot};
use tp_wire::WireRunStatus;

/// Two shards complete passed {5,5,0,0} and failed {3,2,1,0}: the run
/// ends failed with totals {8,7,1,0} and the failing shard's error.
#[tokio::test]
async fn aggregation_across_shards() {
    let plane = plane();
    let service = plane.seed_service("payments", &[], 4);
    let run = plane.schedule(&service, 1, 2).await;

    let (mut agent, _session) = connect_agent(&plane, "agt-one", &[], 4).await;

    let offer0 = agent.recv_offer_for(0).await;
    agent.accept(&offer0).await;
    let offer1 = agent.recv_offer_for(1).await;
    agent.accept(&offer1).await;

    agent.complete(&offer0, WireRunStatus::Passed, summary(5, 5, 0, 0), None).await;
    wait_for(|| async {
        plane.stores.runs.get(run.id).await.unwrap().shards_completed == 1
    })
    .await;

    // Half-done: the run is still running with interim stats.
    let mid = plane.stores.runs.get(run.id).await.unwrap();
    assert_eq!(mid.status, RunStatus::Running);
    assert_eq!(mid.shards_failed, 0);

    agent
        .complete(&offer1, WireRunStatus::Failed, summary(3, 2, 1, 0), Some("2 cases regressed"))
        .await;
    wait_for(|| async { plane.stores.runs.get(run.id).await.unwrap().is_terminal() }).await;

    let done = plane.stores.runs.get(run.id).await.unwrap();
    assert_eq!(done.status, RunStatus::Failed);
    assert_eq!(done.counts, CaseCounts { total: 8, passed: 7, failed: 1, skipped: 0 });
    assert_eq!(done.shards_completed, 2);
    assert_eq!(done.shards_failed, 1);
    assert_eq!(done.error.as_deref(), Some("2 cases regressed"));
}

/// Out-of-order completion: the second shard's result arriving first
/// still aggregates correctly.
#[tokio::test]
async fn out_of_order_shard_completion() {
    let plane = plane();
    let service = plane.seed_service("payments", &[], 2);
    let run = plane.schedule(&service, 1, 2).await;

    let (mut agent, _session) = connect_agent(&plane, "agt-one", &[], 4).await;
    let offer0 = agent.recv_offer_for(0).await;
    agent.accept(&offer0).await;
    let offer1 = agent.recv_offer_for(1).await;
    agent.accept(&offer1).await;

    // Shard 1 reports before shard 0.
    agent.complete(&offer1, WireRunStatus::Passed, summary(1, 1, 0, 0), None).await;
    agent.complete(&offer0, WireRunStatus::Passed, summary(1, 1, 0, 0), None).await;

    wait_for(|| async { plane.stores.runs.get(run.id).await.unwrap().is_terminal() }).await;
    let done = plane.stores.runs.get(run.id).await.unwrap();
    assert_eq!(done.status, RunStatus::Passed);
    assert_eq!(done.counts.total, 2);
}

/// Pending runs survive a restart: snapshot, reload into a fresh plane,
/// rehydrate the queue, and the work item is back.
#[tokio::test]
async fn pending_run_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("state.snap");

    let before = plane();
    let service = before.seed_service("payments", &["zone-a"], 1);
    let run = before.schedule(&service, 5, 1).await;
    save_snapshot(&snapshot_path, &before.store).unwrap();

    // "Restart": fresh plane, snapshot load, then rehydration.
    let after_plane = plane();
    assert!(load_snapshot(&snapshot_path, &after_plane.store).unwrap());

    let count = after_plane
        .queue
        .load_from_store(&*after_plane.stores.runs, &*after_plane.stores.services, 100)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(after_plane.queue.contains(run.id));
    let item = after_plane.queue.peek().unwrap();
    assert_eq!(item.priority, 5);
    assert_eq!(item.zones, vec!["zone-a".to_string()]);
}

/// A pending run whose service was deleted is dropped silently during
/// rehydration.
#[tokio::test]
async fn orphaned_run_dropped_on_rehydration() {
    let plane = plane();
    let service = plane.seed_service("payments", &[], 1);
    let run = plane.schedule(&service, 1, 1).await;

    plane.store.remove_service(service.id);

    let count = plane
        .queue
        .load_from_store(&*plane.stores.runs, &*plane.stores.services, 100)
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(!plane.queue.contains(run.id));
    // The run row itself is untouched.
    assert_eq!(plane.stores.runs.get(run.id).await.unwrap().status, RunStatus::Pending);
}
