// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::ConnectedAgent;
use std::collections::HashMap;
use std::sync::Arc;
use tp_core::test_support::{capabilities, service_in_zones, test_defs};
use tp_core::{AgentId, Run, RunId, Service};
use tp_storage::{MemoryStore, RunStore, ShardStore};

fn connected(max_parallel: u32, docker: bool, last_seen_ms: u64) -> ConnectedAgent {
    let mut caps = capabilities(max_parallel, &[]);
    caps.docker_available = docker;
    ConnectedAgent::new(
        AgentId::new(),
        "runner".to_string(),
        caps,
        HashMap::new(),
        Vec::<u8>::new(),
        last_seen_ms,
    )
}

#[yare::parameterized(
    fresh_heartbeat = { 60_000, 4, true, Some(455) },
    aging_heartbeat = { 45_000, 4, true, Some(430) },
    stale_heartbeat = { 10_000, 4, true, Some(415) },
    dead_heartbeat = { 0, 4, true, Some(405) },
    no_docker = { 60_000, 4, false, Some(450) },
    single_slot = { 60_000, 1, true, Some(155) },
)]
fn scoring_tiers(last_seen_ms: u64, max_parallel: u32, docker: bool, expected: Option<i64>) {
    let agent = connected(max_parallel, docker, last_seen_ms);
    assert_eq!(score_agent(&agent, 65_000), expected);
}

#[test]
fn full_agent_is_not_a_candidate() {
    let agent = connected(1, true, 1_000);
    agent.assignment_sent();
    assert_eq!(score_agent(&agent, 1_000), None);
}

struct Fixture {
    store: Arc<MemoryStore>,
    matcher: WorkMatcher,
    service: Service,
}

async fn fixture(zones: &[&str], test_count: usize) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let service = service_in_zones("payments", zones);
    store.insert_service(service.clone());
    store.insert_tests(service.id, test_defs(service.id, test_count));
    let matcher = WorkMatcher::new(Stores::from_backend(store.clone()));
    Fixture { store, matcher, service }
}

async fn pending_run(fx: &Fixture, priority: i32, shard_count: u32) -> Run {
    let run = Run::builder()
        .id(RunId::new())
        .service_id(fx.service.id)
        .git_ref(tp_core::GitRef {
            url: fx.service.git_url.clone(),
            branch: Some(fx.service.default_branch.clone()),
            sha: None,
        })
        .priority(priority)
        .shard_count(shard_count)
        .build();
    RunStore::create(&*fx.store, &run).await.unwrap();
    run
}

#[tokio::test]
async fn find_work_builds_assignment_for_matching_zone() {
    let fx = fixture(&["zone-a"], 3).await;
    let run = pending_run(&fx, 1, 1).await;

    let caps = capabilities(4, &["zone-a", "default"]);
    let work = fx.matcher.find_work(&caps).await.unwrap().expect("expected work");

    assert_eq!(work.run_id, run.id);
    assert_eq!(work.shard_index, 0);
    assert_eq!(work.shard_count, 1);
    assert_eq!(work.tests.len(), 3);
    assert_eq!(work.priority, 1);
    assert_eq!(work.git_ref.url, fx.service.git_url);

    // Shard rows were materialized by the match.
    assert_eq!(fx.store.list_by_run(run.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn find_work_skips_zone_mismatch() {
    let fx = fixture(&["zone-a"], 1).await;
    pending_run(&fx, 1, 1).await;

    let caps = capabilities(4, &["zone-b"]);
    assert!(fx.matcher.find_work(&caps).await.unwrap().is_none());
}

#[tokio::test]
async fn find_work_skips_deleted_service() {
    let fx = fixture(&["zone-a"], 1).await;
    let run = pending_run(&fx, 1, 1).await;
    fx.store.remove_service(fx.service.id);

    let caps = capabilities(4, &["zone-a"]);
    assert!(fx.matcher.find_work(&caps).await.unwrap().is_none());
    // The run stays pending; rehydration handles the drop.
    assert_eq!(
        fx.store.get_pending(10).await.unwrap().iter().filter(|r| r.id == run.id).count(),
        1
    );
}

#[tokio::test]
async fn find_work_prefers_higher_priority_run() {
    let fx = fixture(&[], 2).await;
    let _low = pending_run(&fx, 1, 1).await;
    let high = pending_run(&fx, 8, 1).await;

    let caps = capabilities(4, &[]);
    let work = fx.matcher.find_work(&caps).await.unwrap().expect("expected work");
    assert_eq!(work.run_id, high.id);
}

#[tokio::test]
async fn exhausted_run_yields_no_work() {
    let fx = fixture(&[], 2).await;
    let run = pending_run(&fx, 1, 2).await;
    let caps = capabilities(4, &[]);

    // Claim both shards.
    for _ in 0..2 {
        let work = fx.matcher.find_work(&caps).await.unwrap().expect("expected work");
        ShardStore::start(&*fx.store, work.shard_id, AgentId::from_string("agt-x")).await.unwrap();
    }

    assert!(fx.matcher.find_work(&caps).await.unwrap().is_none());
    assert_eq!(fx.store.list_by_run(run.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn assign_for_run_returns_next_pending_shard() {
    let fx = fixture(&[], 4).await;
    let run = pending_run(&fx, 1, 2).await;

    let work = fx.matcher.assign_for_run(&run).await.unwrap().expect("expected work");
    assert_eq!(work.shard_index, 0);
    assert_eq!(work.tests.len(), 2);

    ShardStore::start(&*fx.store, work.shard_id, AgentId::from_string("agt-x")).await.unwrap();
    let next = fx.matcher.assign_for_run(&run).await.unwrap().expect("expected shard 1");
    assert_eq!(next.shard_index, 1);
}
