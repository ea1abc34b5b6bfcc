// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session: one bidirectional stream from REGISTER to disconnect.
//!
//! The first frame must be REGISTER; everything after runs through the
//! registered-state message handler. Each session owns two tasks: the
//! caller-driven receive loop and a spawned assignment ticker that
//! periodically offers matched work. Both stop when the session's cancel
//! handle fires (disconnect or supersession by a newer REGISTER).

use crate::error::SchedulerError;
use crate::lifecycle::LifecycleCoordinator;
use crate::matcher::WorkMatcher;
use crate::queue::WorkQueue;
use crate::registry::{ConnectedAgent, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tp_core::{AgentId, AgentRow, AgentStatus, Clock};
use tp_storage::{Stores, StoreError};
use tp_wire::{
    read_frame, read_frame_timeout, write_frame, AgentMessage, ProtocolError, ResultPayload,
    ServerMessage,
};
use tracing::{debug, info, warn};

/// Bounded deadline for the disconnect-time offline update, independent of
/// the caller's context.
const OFFLINE_UPDATE_DEADLINE: Duration = Duration::from_secs(5);

/// Session runtime tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// An agent missing heartbeats this long is considered gone. The
    /// recommended heartbeat interval sent at REGISTER is a third of it.
    pub heartbeat_timeout: Duration,
    /// Assignment ticker period.
    pub assign_interval: Duration,
    /// Deadline for the first (REGISTER) frame.
    pub register_timeout: Duration,
    /// Reported to agents in the REGISTER response.
    pub server_version: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(45),
            assign_interval: Duration::from_secs(5),
            register_timeout: Duration::from_secs(30),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Shared entry point for agent connections. One hub serves every session.
pub struct SessionHub<C: Clock> {
    stores: Stores,
    registry: Arc<SessionRegistry>,
    queue: Arc<WorkQueue>,
    matcher: WorkMatcher,
    lifecycle: LifecycleCoordinator,
    config: SessionConfig,
    clock: C,
}

impl<C: Clock> SessionHub<C> {
    pub fn new(
        stores: Stores,
        registry: Arc<SessionRegistry>,
        queue: Arc<WorkQueue>,
        config: SessionConfig,
        clock: C,
    ) -> Self {
        let matcher = WorkMatcher::new(stores.clone());
        let lifecycle = LifecycleCoordinator::new(stores.clone());
        Self { stores, registry, queue, matcher, lifecycle, config, clock }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Drive one agent connection from REGISTER to disconnect. Returns
    /// when the stream closes, the session is cancelled, or a protocol
    /// violation terminates it.
    pub async fn run_session<S>(&self, stream: S) -> Result<(), SchedulerError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        let first: AgentMessage =
            read_frame_timeout(&mut reader, self.config.register_timeout).await?;
        let AgentMessage::Register { agent_id, name, version, capabilities, labels } = first
        else {
            // awaiting-register state admits nothing else.
            return Err(SchedulerError::NotRegistered);
        };

        if agent_id.trim().is_empty() || agent_id.len() > tp_core::id::ID_MAX_LEN {
            let response = register_failure(format!("invalid agent id: {agent_id:?}"));
            let _ = write_frame(&mut writer, &response).await;
            let _ = writer.shutdown().await;
            return Err(SchedulerError::InvalidAgentId(agent_id));
        }
        let id = AgentId::from_string(&agent_id);

        if let Err(e) = self.upsert_agent_row(id, &name, &version, &capabilities).await {
            warn!(agent_id = %id, error = %e, "agent registration failed");
            let response = register_failure("registration failed".to_string());
            let _ = write_frame(&mut writer, &response).await;
            let _ = writer.shutdown().await;
            return Err(e.into());
        }

        let agent = Arc::new(ConnectedAgent::new(
            id,
            name,
            capabilities,
            labels,
            writer,
            self.clock.epoch_ms(),
        ));
        self.registry.register(agent.clone());

        let response = ServerMessage::RegisterResponse {
            success: true,
            heartbeat_interval_secs: (self.config.heartbeat_timeout.as_secs() / 3) as u32,
            server_version: self.config.server_version.clone(),
            error: None,
        };
        if let Err(e) = agent.send(&response).await {
            self.disconnect(&agent).await;
            return Err(e.into());
        }
        info!(agent_id = %id, agent = %agent.name(), "agent registered");

        self.spawn_assignment_ticker(agent.clone());

        let result = self.receive_loop(&mut reader, &agent).await;
        self.disconnect(&agent).await;
        result
    }

    /// REGISTER upsert: create the row if absent, otherwise refresh the
    /// reported capabilities and mark the agent idle.
    async fn upsert_agent_row(
        &self,
        id: AgentId,
        name: &str,
        version: &Option<String>,
        capabilities: &tp_core::AgentCapabilities,
    ) -> Result<(), StoreError> {
        match self.stores.agents.get_by_id(id).await {
            Ok(mut row) => {
                row.name = name.to_string();
                row.version = version.clone();
                row.zones = capabilities.zones.clone();
                row.max_parallel = capabilities.max_parallel;
                row.docker_available = capabilities.docker_available;
                row.status = AgentStatus::Idle;
                self.stores.agents.update(&row).await
            }
            Err(StoreError::NotFound(_)) => {
                let row = AgentRow::from_register(
                    id,
                    name.to_string(),
                    version.clone(),
                    capabilities,
                    self.clock.utc(),
                );
                self.stores.agents.create(&row).await
            }
            Err(e) => Err(e),
        }
    }

    /// The per-session assignment ticker. Every tick asks the matcher for
    /// work this agent may run and offers it on the stream. Send errors
    /// are logged and the loop continues; only the session's cancel
    /// handle stops it.
    fn spawn_assignment_ticker(&self, agent: Arc<ConnectedAgent>) {
        let matcher = self.matcher.clone();
        let period = self.config.assign_interval;
        tokio::spawn(async move {
            let token = agent.cancel_token().clone();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if agent.available_slots() <= 0 {
                            continue;
                        }
                        match matcher.find_work(agent.capabilities()).await {
                            Ok(Some(work)) => {
                                debug!(
                                    agent_id = %agent.id(),
                                    run_id = %work.run_id,
                                    shard = work.shard_index,
                                    "offering work"
                                );
                                match agent.send(&ServerMessage::AssignWork(work)).await {
                                    Ok(()) => agent.assignment_sent(),
                                    Err(e) => {
                                        warn!(agent_id = %agent.id(), error = %e, "assignment send failed");
                                    }
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(agent_id = %agent.id(), error = %e, "work matching failed");
                            }
                        }
                    }
                }
            }
            debug!(agent_id = %agent.id(), "assignment ticker stopped");
        });
    }

    async fn receive_loop(
        &self,
        reader: &mut (impl AsyncRead + Unpin),
        agent: &Arc<ConnectedAgent>,
    ) -> Result<(), SchedulerError> {
        let token = agent.cancel_token().clone();
        loop {
            let msg: AgentMessage = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                msg = read_frame(reader) => match msg {
                    Ok(msg) => msg,
                    Err(ProtocolError::ConnectionClosed) => return Ok(()),
                    Err(e) => return Err(e.into()),
                },
            };
            self.handle_message(agent, msg).await?;
        }
    }

    /// Registered-state message handling. Store errors are logged and the
    /// stream stays open; only protocol violations return Err.
    async fn handle_message(
        &self,
        agent: &Arc<ConnectedAgent>,
        msg: AgentMessage,
    ) -> Result<(), SchedulerError> {
        match msg {
            AgentMessage::Register { .. } => {
                Err(ProtocolError::Malformed("duplicate REGISTER on open session".into()).into())
            }
            AgentMessage::Heartbeat { status, active_run_ids } => {
                agent.touch(self.clock.epoch_ms());
                debug!(
                    agent_id = %agent.id(),
                    status = ?status,
                    active = active_run_ids.len(),
                    "heartbeat"
                );
                let mapped = status.into_agent_status();
                if let Err(e) = self.stores.agents.update_heartbeat(agent.id(), mapped).await {
                    warn!(agent_id = %agent.id(), error = %e, "heartbeat update failed");
                }
                Ok(())
            }
            AgentMessage::WorkAccepted { run_id, shard_id } => {
                match self.lifecycle.on_work_accepted(agent.id(), run_id, shard_id).await {
                    Ok(()) => {
                        self.queue.remove(run_id);
                        let ack = ServerMessage::Ack { run_id, success: true, message: None };
                        if let Err(e) = agent.send(&ack).await {
                            warn!(agent_id = %agent.id(), error = %e, "ack send failed");
                        }
                    }
                    Err(e) => {
                        // Usually a lost assignment race; the store kept
                        // the winner.
                        warn!(agent_id = %agent.id(), run_id = %run_id, error = %e, "work acceptance rejected");
                        agent.assignment_done();
                        let ack = ServerMessage::Ack {
                            run_id,
                            success: false,
                            message: Some(e.to_string()),
                        };
                        if let Err(e) = agent.send(&ack).await {
                            warn!(agent_id = %agent.id(), error = %e, "ack send failed");
                        }
                    }
                }
                Ok(())
            }
            AgentMessage::WorkRejected { run_id, shard_id, reason, temporary } => {
                debug!(
                    agent_id = %agent.id(),
                    run_id = %run_id,
                    reason = reason.as_deref().unwrap_or(""),
                    temporary,
                    "work rejected"
                );
                agent.assignment_done();
                if let Err(e) = self.lifecycle.on_work_rejected(run_id, shard_id, temporary).await
                {
                    warn!(run_id = %run_id, error = %e, "work rejection handling failed");
                }
                Ok(())
            }
            AgentMessage::Result { run_id, sequence, payload } => {
                self.handle_result(agent, run_id, sequence, payload).await;
                Ok(())
            }
        }
    }

    async fn handle_result(
        &self,
        agent: &Arc<ConnectedAgent>,
        run_id: tp_core::RunId,
        sequence: u64,
        payload: ResultPayload,
    ) {
        match payload {
            ResultPayload::RunComplete { shard_id, status, summary, error } => {
                agent.assignment_done();
                if let Err(e) = self
                    .lifecycle
                    .on_run_complete(run_id, shard_id, status, &summary, error.as_deref())
                    .await
                {
                    warn!(run_id = %run_id, error = %e, "run completion handling failed");
                }
            }
            // Payload persistence belongs to external collaborators; the
            // core only observes.
            ResultPayload::LogChunk { stream, data } => {
                debug!(run_id = %run_id, sequence, stream, bytes = data.len(), "log chunk");
            }
            ResultPayload::TestResult { name, passed, duration_ms, .. } => {
                debug!(run_id = %run_id, sequence, test = %name, passed, duration_ms, "test result");
            }
            ResultPayload::Artifact { name, size, .. } => {
                debug!(run_id = %run_id, sequence, artifact = %name, size, "artifact reported");
            }
            ResultPayload::Progress { phase, percent } => {
                debug!(run_id = %run_id, sequence, phase = %phase, percent, "progress");
            }
        }
    }

    /// Disconnect cleanup. Every step is best-effort; later steps run even
    /// if earlier ones fail. The offline write runs under its own bounded
    /// deadline so a slow store cannot hold the session task.
    async fn disconnect(&self, agent: &Arc<ConnectedAgent>) {
        self.registry.deregister(agent);
        agent.cancel_token().cancel();
        let update = self.stores.agents.update_status(agent.id(), AgentStatus::Offline);
        match tokio::time::timeout(OFFLINE_UPDATE_DEADLINE, update).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(agent_id = %agent.id(), error = %e, "offline status update failed"),
            Err(_) => warn!(agent_id = %agent.id(), "offline status update timed out"),
        }
        info!(agent_id = %agent.id(), "agent disconnected");
    }
}

fn register_failure(message: String) -> ServerMessage {
    ServerMessage::RegisterResponse {
        success: false,
        heartbeat_interval_secs: 0,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        error: Some(message),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
