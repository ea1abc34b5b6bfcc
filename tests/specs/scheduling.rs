// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue ordering, assignment, zone constraints, and cancellation specs.

use super::harness::*;
use chrono::DateTime;
use tp_core::{RunId, RunStatus, ServiceId, ShardStatus, WorkItem};
use tp_sched::WorkQueue;
use tp_wire::{SubmitRequest, SubmitResponse};

/// Three items, priorities [5, 10, 5], identical created_at: pop yields
/// the 10, then the two 5s in insertion order.
#[test]
fn priority_ordering_under_equal_age() {
    let queue = WorkQueue::new();
    let created_at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    for (name, priority) in [("run-a", 5), ("run-b", 10), ("run-c", 5)] {
        queue
            .push(WorkItem {
                run_id: RunId::from_string(name),
                service_id: ServiceId::from_string("svc-s"),
                priority,
                zones: Vec::new(),
                created_at,
            })
            .unwrap();
    }

    assert_eq!(queue.pop().unwrap().run_id, "run-b");
    assert_eq!(queue.pop().unwrap().run_id, "run-a");
    assert_eq!(queue.pop().unwrap().run_id, "run-c");
    assert_eq!(queue.len(), 0);
}

/// One matching idle agent: within one scheduler tick the run starts,
/// shard 0 is assigned to this agent, and the agent holds an ASSIGN_WORK
/// with the full shard description.
#[tokio::test]
async fn assignment_happy_path() {
    let plane = plane();
    let service = plane.seed_service("payments", &["zone-a"], 1);
    let (mut agent, _session) = connect_agent(&plane, "agt-one", &["zone-a", "default"], 4).await;

    let run = plane.schedule(&service, 1, 1).await;
    assert_eq!(run.status, RunStatus::Pending);

    plane.sched.tick_once().await;

    let work = agent.recv_offer().await;
    assert_eq!(work.run_id, run.id);
    assert_eq!(work.shard_index, 0);
    assert_eq!(work.shard_count, 1);
    assert_eq!(work.tests.len(), 1);
    agent.accept(&work).await;

    let stored = plane.stores.runs.get(run.id).await.unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert_eq!(stored.agent_id.unwrap(), "agt-one");

    let shard = plane.stores.shards.get(work.shard_id).await.unwrap();
    assert_eq!(shard.status, ShardStatus::Running);
    assert_eq!(shard.agent_id.unwrap(), "agt-one");
    assert!(!plane.queue.contains(run.id));
}

/// Zone mismatch: after three ticks the run is still pending, the queue
/// still holds it, and the agent saw nothing.
#[tokio::test]
async fn zone_mismatch_leaves_work_queued() {
    let plane = plane();
    let service = plane.seed_service("payments", &["zone-a"], 1);
    let (mut agent, _session) = connect_agent(&plane, "agt-b", &["zone-b"], 4).await;

    let run = plane.schedule(&service, 1, 1).await;
    for _ in 0..3 {
        plane.sched.tick_once().await;
    }

    assert_eq!(plane.stores.runs.get(run.id).await.unwrap().status, RunStatus::Pending);
    assert!(plane.queue.contains(run.id));

    let silent = tokio::time::timeout(std::time::Duration::from_millis(200), agent.recv()).await;
    assert!(silent.is_err(), "agent in the wrong zone received a message");
}

/// Cancel pending: the queue entry disappears, the run is cancelled, no
/// agent is contacted, and a second cancel is a precondition failure.
#[tokio::test]
async fn cancel_pending_run() {
    let plane = plane();
    let service = plane.seed_service("payments", &[], 1);
    let run = plane.schedule(&service, 1, 1).await;

    let response = plane
        .api
        .handle(SubmitRequest::CancelRun { run_id: run.id, reason: "user".to_string() })
        .await;
    assert_eq!(response, SubmitResponse::Ok);

    assert!(!plane.queue.contains(run.id));
    let stored = plane.stores.runs.get(run.id).await.unwrap();
    assert_eq!(stored.status, RunStatus::Cancelled);

    let again = plane
        .api
        .handle(SubmitRequest::CancelRun { run_id: run.id, reason: "user".to_string() })
        .await;
    match again {
        SubmitResponse::Error { code, .. } => assert_eq!(code, "failed_precondition"),
        other => panic!("expected failed_precondition, got {other:?}"),
    }
}

/// Retry of a terminal run schedules a fresh pending run with the same
/// parameters.
#[tokio::test]
async fn retry_terminal_run() {
    let plane = plane();
    let service = plane.seed_service("payments", &[], 1);
    let run = plane.schedule(&service, 7, 2).await;

    plane
        .api
        .handle(SubmitRequest::CancelRun { run_id: run.id, reason: "user".to_string() })
        .await;

    let response = plane.api.handle(SubmitRequest::RetryRun { run_id: run.id }).await;
    let retried = match response {
        SubmitResponse::Run { run } => *run,
        other => panic!("retry failed: {other:?}"),
    };
    assert_ne!(retried.id, run.id);
    assert_eq!(retried.status, RunStatus::Pending);
    assert_eq!(retried.priority, 7);
    assert_eq!(retried.shard_count, 2);
    assert!(plane.queue.contains(retried.id));
}
