// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a full control plane on an in-memory store, with
//! agents connected over in-memory duplex streams speaking the real wire
//! protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tp_core::test_support::{capabilities, service_in_zones, test_defs};
use tp_core::{Run, Service, SystemClock};
use tp_sched::{
    Scheduler, SchedulerConfig, SchedulerError, SchedulerLoop, SessionConfig, SessionHub,
    SessionRegistry, WorkQueue,
};
use tp_storage::{MemoryStore, Stores};
use tp_wire::{
    read_frame, write_frame, AgentMessage, ResultPayload, RunSummary, ServerMessage, SubmitRequest,
    WireRunStatus,
};

pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Plane {
    pub store: Arc<MemoryStore>,
    pub stores: Stores,
    pub queue: Arc<WorkQueue>,
    pub hub: Arc<SessionHub<SystemClock>>,
    pub api: Scheduler<SystemClock>,
    pub sched: SchedulerLoop<SystemClock>,
}

pub fn plane() -> Plane {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::from_backend(store.clone());
    let queue = Arc::new(WorkQueue::new());
    let registry = Arc::new(SessionRegistry::new());
    let hub = Arc::new(SessionHub::new(
        stores.clone(),
        registry.clone(),
        queue.clone(),
        SessionConfig {
            heartbeat_timeout: Duration::from_secs(45),
            assign_interval: Duration::from_millis(50),
            register_timeout: Duration::from_secs(2),
            server_version: "spec".to_string(),
        },
        SystemClock,
    ));
    let api = Scheduler::new(stores.clone(), queue.clone(), registry.clone(), SystemClock);
    let sched = SchedulerLoop::new(
        queue.clone(),
        registry.clone(),
        stores.clone(),
        SchedulerConfig { poll_interval: Duration::from_millis(50), batch_size: 10 },
        SystemClock,
    );
    Plane { store, stores, queue, hub, api, sched }
}

impl Plane {
    /// Seed a service with `tests` test definitions.
    pub fn seed_service(&self, name: &str, zones: &[&str], tests: usize) -> Service {
        let service = service_in_zones(name, zones);
        self.store.insert_service(service.clone());
        self.store.insert_tests(service.id, test_defs(service.id, tests));
        service
    }

    /// Schedule a run through the submit surface.
    pub async fn schedule(&self, service: &Service, priority: i32, shard_count: u32) -> Run {
        let response = self
            .api
            .handle(SubmitRequest::ScheduleRun {
                service_id: service.id,
                git_ref: None,
                git_sha: None,
                trigger: tp_core::TriggerKind::Manual,
                triggered_by: Some("spec".to_string()),
                priority,
                test_ids: Vec::new(),
                tags: Vec::new(),
                shard_count: Some(shard_count),
                max_parallel: Some(4),
            })
            .await;
        match response {
            tp_wire::SubmitResponse::Run { run } => *run,
            other => panic!("schedule failed: {other:?}"),
        }
    }
}

/// One fake agent speaking the wire protocol over a duplex stream.
pub struct AgentConn {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    sequence: u64,
}

impl AgentConn {
    pub async fn send(&mut self, msg: &AgentMessage) {
        write_frame(&mut self.writer, msg).await.expect("agent send failed");
    }

    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(STEP_TIMEOUT, read_frame(&mut self.reader))
            .await
            .expect("timed out waiting for server message")
            .expect("agent read failed")
    }

    /// Next message matching the predicate; duplicate offers are skipped.
    pub async fn recv_until(
        &mut self,
        mut accept: impl FnMut(&ServerMessage) -> bool,
    ) -> ServerMessage {
        loop {
            let msg = self.recv().await;
            if accept(&msg) {
                return msg;
            }
        }
    }

    /// Next AssignWork offer.
    pub async fn recv_offer(&mut self) -> tp_wire::AssignWork {
        match self.recv_until(|m| matches!(m, ServerMessage::AssignWork(_))).await {
            ServerMessage::AssignWork(work) => work,
            _ => unreachable!(),
        }
    }

    /// Next offer for the given shard index. The ticker may re-offer a
    /// shard whose acceptance is still in flight; those are skipped.
    pub async fn recv_offer_for(&mut self, shard_index: u32) -> tp_wire::AssignWork {
        loop {
            let work = self.recv_offer().await;
            if work.shard_index == shard_index {
                return work;
            }
        }
    }

    /// Accept an offer and wait for the ack.
    pub async fn accept(&mut self, work: &tp_wire::AssignWork) {
        self.send(&AgentMessage::WorkAccepted {
            run_id: work.run_id,
            shard_id: Some(work.shard_id),
        })
        .await;
        match self.recv_until(|m| matches!(m, ServerMessage::Ack { .. })).await {
            ServerMessage::Ack { success, .. } => assert!(success, "acceptance lost the race"),
            _ => unreachable!(),
        }
    }

    /// Stream a RunComplete for one shard.
    pub async fn complete(
        &mut self,
        work: &tp_wire::AssignWork,
        status: WireRunStatus,
        summary: RunSummary,
        error: Option<&str>,
    ) {
        self.sequence += 1;
        self.send(&AgentMessage::Result {
            run_id: work.run_id,
            sequence: self.sequence,
            payload: ResultPayload::RunComplete {
                shard_id: Some(work.shard_id),
                status,
                summary,
                error: error.map(|e| e.to_string()),
            },
        })
        .await;
    }
}

/// Connect and register an agent session against the hub.
pub async fn connect_agent(
    plane: &Plane,
    agent_id: &str,
    zones: &[&str],
    max_parallel: u32,
) -> (AgentConn, JoinHandle<Result<(), SchedulerError>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let hub = plane.hub.clone();
    let handle = tokio::spawn(async move { hub.run_session(server).await });
    let (reader, writer) = tokio::io::split(client);
    let mut conn = AgentConn { reader, writer, sequence: 0 };

    conn.send(&AgentMessage::Register {
        agent_id: agent_id.to_string(),
        name: format!("runner-{agent_id}"),
        version: Some("spec".to_string()),
        capabilities: capabilities(max_parallel, zones),
        labels: HashMap::new(),
    })
    .await;
    match conn.recv().await {
        ServerMessage::RegisterResponse { success: true, .. } => {}
        other => panic!("registration failed: {other:?}"),
    }
    (conn, handle)
}

pub fn summary(total: u32, passed: u32, failed: u32, skipped: u32) -> RunSummary {
    RunSummary { total, passed, failed, skipped, duration_secs: 1.0 }
}

/// Poll the store until the condition holds or the step timeout elapses.
pub async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    loop {
        if check().await {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
