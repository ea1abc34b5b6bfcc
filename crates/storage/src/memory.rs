// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store backing every repository port.
//!
//! One `parking_lot::RwLock` guards the row maps; it is held only across
//! in-memory mutation, never across an await point. State-machine guards
//! (terminal write-once, single-winner start) live here so racing callers
//! are serialized by the store itself. Row timestamps go through the
//! injected [`Clock`], so tests on a `FakeClock` see deterministic
//! `started_at`/`finished_at`/`last_heartbeat` values.

use crate::error::StoreError;
use crate::ports::{AgentStore, RunStore, ServiceStore, ShardStore, TestStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tp_core::{
    AgentId, AgentRow, AgentStatus, CaseCounts, Clock, Run, RunId, RunStatus, Service, ServiceId,
    Shard, ShardId, ShardStatus, SystemClock, TestDefinition,
};

/// All rows, as one serializable unit (the snapshot payload).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Rows {
    pub runs: HashMap<RunId, Run>,
    pub shards: HashMap<ShardId, Shard>,
    pub services: HashMap<ServiceId, Service>,
    pub tests: HashMap<ServiceId, Vec<TestDefinition>>,
    pub agents: HashMap<AgentId, AgentRow>,
}

/// In-memory implementation of every port.
pub struct MemoryStore<C: Clock = SystemClock> {
    rows: RwLock<Rows>,
    clock: C,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Store whose row timestamps come from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self { rows: RwLock::new(Rows::default()), clock }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Seed a service row. Not part of any port: the scheduler core never
    /// mutates services; seeding belongs to the CRUD surface and tests.
    pub fn insert_service(&self, service: Service) {
        self.rows.write().services.insert(service.id, service);
    }

    /// Seed test definitions for a service. See [`Self::insert_service`].
    pub fn insert_tests(&self, service_id: ServiceId, tests: Vec<TestDefinition>) {
        self.rows.write().tests.insert(service_id, tests);
    }

    /// Remove a service row (tests exercising the orphan policy).
    pub fn remove_service(&self, id: ServiceId) {
        self.rows.write().services.remove(&id);
    }

    pub(crate) fn export(&self) -> Rows {
        self.rows.read().clone()
    }

    pub(crate) fn import(&self, rows: Rows) {
        *self.rows.write() = rows;
    }
}

#[async_trait]
impl<C: Clock> RunStore for MemoryStore<C> {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("run {} already exists", run.id)));
        }
        rows.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get(&self, id: RunId) -> Result<Run, StoreError> {
        self.rows
            .read()
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
    }

    async fn update_status(
        &self,
        id: RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let run = rows.runs.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        if run.status.is_terminal() {
            if run.status == status {
                return Ok(());
            }
            return Err(StoreError::Conflict(format!(
                "run {id} is {}, cannot become {status}",
                run.status
            )));
        }
        run.status = status;
        if let Some(msg) = error {
            run.error = Some(msg.to_string());
        }
        if status.is_terminal() {
            run.finished_at = Some(now);
        }
        Ok(())
    }

    async fn start(&self, id: RunId, agent: AgentId) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let run = rows.runs.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        if run.status != RunStatus::Pending {
            return Err(StoreError::Conflict(format!("run {id} is {}, not pending", run.status)));
        }
        run.status = RunStatus::Running;
        run.agent_id = Some(agent);
        run.started_at = Some(now);
        Ok(())
    }

    async fn finish(
        &self,
        id: RunId,
        status: RunStatus,
        results: &CaseCounts,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let run = rows.runs.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        if run.status.is_terminal() {
            if run.status == status {
                return Ok(());
            }
            return Err(StoreError::Conflict(format!(
                "run {id} already finished as {}, cannot re-finish as {status}",
                run.status
            )));
        }
        run.status = status;
        run.counts = *results;
        if let Some(msg) = error {
            run.error = Some(msg.to_string());
        }
        run.finished_at = Some(now);
        Ok(())
    }

    async fn update_shard_stats(
        &self,
        id: RunId,
        completed: u32,
        failed: u32,
        results: &CaseCounts,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let run = rows.runs.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        run.shards_completed = completed;
        run.shards_failed = failed;
        run.counts = *results;
        Ok(())
    }

    async fn get_pending(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        let rows = self.rows.read();
        let mut pending: Vec<Run> =
            rows.runs.values().filter(|r| r.status == RunStatus::Pending).cloned().collect();
        pending.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }
}

#[async_trait]
impl<C: Clock> ShardStore for MemoryStore<C> {
    async fn create(&self, shard: &Shard) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.shards.contains_key(&shard.id) {
            return Err(StoreError::Conflict(format!("shard {} already exists", shard.id)));
        }
        rows.shards.insert(shard.id, shard.clone());
        Ok(())
    }

    async fn get(&self, id: ShardId) -> Result<Shard, StoreError> {
        self.rows
            .read()
            .shards
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("shard {id}")))
    }

    async fn list_by_run(&self, run_id: RunId) -> Result<Vec<Shard>, StoreError> {
        let rows = self.rows.read();
        let mut shards: Vec<Shard> =
            rows.shards.values().filter(|s| s.run_id == run_id).cloned().collect();
        shards.sort_by_key(|s| s.index);
        Ok(shards)
    }

    async fn update_status(&self, id: ShardId, status: ShardStatus) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let shard =
            rows.shards.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("shard {id}")))?;
        if shard.status.is_terminal() {
            if shard.status == status {
                return Ok(());
            }
            return Err(StoreError::Conflict(format!(
                "shard {id} is {}, cannot become {status}",
                shard.status
            )));
        }
        if shard.status == ShardStatus::Running && status == ShardStatus::Pending {
            // Going backwards is reset()'s job; a plain status write may not.
            return Err(StoreError::Conflict(format!("shard {id} is running, cannot re-pend")));
        }
        shard.status = status;
        if status.is_terminal() {
            shard.finished_at = Some(now);
        }
        Ok(())
    }

    async fn start(&self, id: ShardId, agent: AgentId) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let shard =
            rows.shards.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("shard {id}")))?;
        if shard.status != ShardStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "shard {id} is {}, not pending",
                shard.status
            )));
        }
        shard.status = ShardStatus::Running;
        shard.agent_id = Some(agent);
        shard.started_at = Some(now);
        Ok(())
    }

    async fn finish(
        &self,
        id: ShardId,
        status: ShardStatus,
        results: &CaseCounts,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let shard =
            rows.shards.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("shard {id}")))?;
        if shard.status.is_terminal() {
            if shard.status == status {
                return Ok(());
            }
            return Err(StoreError::Conflict(format!(
                "shard {id} already finished as {}, cannot re-finish as {status}",
                shard.status
            )));
        }
        shard.status = status;
        shard.counts = *results;
        if let Some(msg) = error {
            shard.error = Some(msg.to_string());
        }
        shard.finished_at = Some(now);
        Ok(())
    }

    async fn reset(&self, id: ShardId) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let shard =
            rows.shards.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("shard {id}")))?;
        match shard.status {
            ShardStatus::Pending => Ok(()),
            ShardStatus::Running => {
                shard.status = ShardStatus::Pending;
                shard.agent_id = None;
                shard.started_at = None;
                Ok(())
            }
            other => Err(StoreError::Conflict(format!("shard {id} is {other}, cannot reset"))),
        }
    }

    async fn delete_by_run(&self, run_id: RunId) -> Result<(), StoreError> {
        self.rows.write().shards.retain(|_, s| s.run_id != run_id);
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> ServiceStore for MemoryStore<C> {
    async fn get(&self, id: ServiceId) -> Result<Service, StoreError> {
        self.rows
            .read()
            .services
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("service {id}")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Service, StoreError> {
        self.rows
            .read()
            .services
            .values()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("service {name:?}")))
    }
}

#[async_trait]
impl<C: Clock> TestStore for MemoryStore<C> {
    async fn list_by_service(
        &self,
        id: ServiceId,
        limit: usize,
    ) -> Result<Vec<TestDefinition>, StoreError> {
        let rows = self.rows.read();
        let mut tests = rows.tests.get(&id).cloned().unwrap_or_default();
        tests.truncate(limit);
        Ok(tests)
    }
}

#[async_trait]
impl<C: Clock> AgentStore for MemoryStore<C> {
    async fn create(&self, agent: &AgentRow) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.agents.contains_key(&agent.id) {
            return Err(StoreError::Conflict(format!("agent {} already exists", agent.id)));
        }
        if rows.agents.values().any(|a| a.name == agent.name) {
            return Err(StoreError::Conflict(format!("agent name {:?} already taken", agent.name)));
        }
        rows.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn update(&self, agent: &AgentRow) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if !rows.agents.contains_key(&agent.id) {
            return Err(StoreError::NotFound(format!("agent {}", agent.id)));
        }
        rows.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: AgentId) -> Result<AgentRow, StoreError> {
        self.rows
            .read()
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("agent {id}")))
    }

    async fn update_heartbeat(&self, id: AgentId, status: AgentStatus) -> Result<(), StoreError> {
        let now = self.now();
        let mut rows = self.rows.write();
        let agent =
            rows.agents.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("agent {id}")))?;
        agent.status = status;
        agent.last_heartbeat = Some(now);
        Ok(())
    }

    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let agent =
            rows.agents.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("agent {id}")))?;
        agent.status = status;
        Ok(())
    }

    async fn delete(&self, id: AgentId) -> Result<(), StoreError> {
        self.rows.write().agents.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
