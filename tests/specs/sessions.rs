// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session protocol and shard hand-back specs.

use super::harness::*;
use tp_core::{RunStatus, ShardStatus};
use tp_sched::SchedulerError;
use tp_wire::{AgentMessage, WireAgentStatus};

/// A shard rejected with temporary=true goes back to the pool and a
/// second agent's assignment ticker picks it up.
#[tokio::test]
async fn shard_rejection_returns_work() {
    let plane = plane();
    let service = plane.seed_service("payments", &["zone-a"], 4);
    let run = plane.schedule(&service, 1, 2).await;

    let (mut first, _first_session) = connect_agent(&plane, "agt-one", &["zone-a"], 4).await;

    let offer0 = first.recv_offer_for(0).await;
    assert_eq!(offer0.shard_index, 0);
    first.accept(&offer0).await;

    // Wait for the ticker to offer the next shard, then hand it back.
    let offer1 = first.recv_offer_for(1).await;
    assert_eq!(offer1.shard_index, 1);
    first
        .send(&AgentMessage::WorkAccepted { run_id: offer1.run_id, shard_id: Some(offer1.shard_id) })
        .await;
    first.recv_until(|m| matches!(m, tp_wire::ServerMessage::Ack { .. })).await;
    first
        .send(&AgentMessage::WorkRejected {
            run_id: offer1.run_id,
            shard_id: Some(offer1.shard_id),
            reason: Some("at capacity".to_string()),
            temporary: true,
        })
        .await;

    // Shard 0 stays with the first agent, shard 1 returns to pending.
    wait_for(|| async {
        let shard = plane.stores.shards.get(offer1.shard_id).await.unwrap();
        shard.status == ShardStatus::Pending && shard.agent_id.is_none()
    })
    .await;
    let shard0 = plane.stores.shards.get(offer0.shard_id).await.unwrap();
    assert_eq!(shard0.status, ShardStatus::Running);
    assert_eq!(plane.stores.runs.get(run.id).await.unwrap().status, RunStatus::Running);

    // A second agent with overlapping zones is offered shard 1.
    let (mut second, _second_session) = connect_agent(&plane, "agt-two", &["zone-a"], 4).await;
    let offer = second.recv_offer().await;
    assert_eq!(offer.run_id, run.id);
    assert_eq!(offer.shard_index, 1);
}

/// A message before REGISTER terminates the stream with a precondition
/// error.
#[tokio::test]
async fn heartbeat_before_register_terminates() {
    let plane = plane();
    let (client, server) = tokio::io::duplex(16 * 1024);
    let hub = plane.hub.clone();
    let handle = tokio::spawn(async move { hub.run_session(server).await });

    let (_reader, mut writer) = tokio::io::split(client);
    tp_wire::write_frame(
        &mut writer,
        &AgentMessage::Heartbeat { status: WireAgentStatus::Idle, active_run_ids: Vec::new() },
    )
    .await
    .unwrap();

    let result = tokio::time::timeout(STEP_TIMEOUT, handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(SchedulerError::NotRegistered)));
}

/// A second REGISTER for the same agent id supersedes the prior session.
#[tokio::test]
async fn register_supersedes_prior_session() {
    let plane = plane();

    let (_first, first_session) = connect_agent(&plane, "agt-one", &[], 2).await;
    let (_second, _second_session) = connect_agent(&plane, "agt-one", &[], 2).await;

    // The first session's task winds down cleanly once its cancel handle
    // fires.
    let result = tokio::time::timeout(STEP_TIMEOUT, first_session).await.unwrap().unwrap();
    assert!(result.is_ok());
}

/// Heartbeats land in the persistent agent row.
#[tokio::test]
async fn heartbeat_updates_agent_row() {
    let plane = plane();
    let (mut agent, _session) = connect_agent(&plane, "agt-one", &[], 2).await;

    agent
        .send(&AgentMessage::Heartbeat {
            status: WireAgentStatus::Busy,
            active_run_ids: Vec::new(),
        })
        .await;

    wait_for(|| async {
        let row = plane
            .stores
            .agents
            .get_by_id(tp_core::AgentId::from_string("agt-one"))
            .await
            .unwrap();
        row.status == tp_core::AgentStatus::Busy && row.last_heartbeat.is_some()
    })
    .await;
}
