// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository ports: the narrow contracts the scheduler core depends on.
//!
//! Each port is an object-safe async trait so the core can hold
//! `Arc<dyn ...>` handles without caring which store backs them. All
//! methods observe single-writer read-your-writes semantics.

use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use tp_core::{
    AgentId, AgentRow, AgentStatus, CaseCounts, Run, RunId, RunStatus, Service, ServiceId, Shard,
    ShardId, ShardStatus, TestDefinition,
};

/// Run rows.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: &Run) -> Result<(), StoreError>;

    async fn get(&self, id: RunId) -> Result<Run, StoreError>;

    /// Set status (and optionally the error message). Terminal statuses are
    /// write-once: overwriting a terminal status with a different one is a
    /// [`StoreError::Conflict`]; re-writing the same terminal status is
    /// accepted (idempotent re-finalization).
    async fn update_status(
        &self,
        id: RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Transition pending → running, recording the winning agent. Exactly
    /// one caller wins; the rest see [`StoreError::Conflict`].
    async fn start(&self, id: RunId, agent: AgentId) -> Result<(), StoreError>;

    /// Finalize the run with a terminal status and aggregated counts.
    async fn finish(
        &self,
        id: RunId,
        status: RunStatus,
        results: &CaseCounts,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Update shard-progress aggregates without touching the run status.
    async fn update_shard_stats(
        &self,
        id: RunId,
        completed: u32,
        failed: u32,
        results: &CaseCounts,
    ) -> Result<(), StoreError>;

    /// Pending runs ordered by priority descending, then age (oldest first).
    async fn get_pending(&self, limit: usize) -> Result<Vec<Run>, StoreError>;

    fn is_terminal(&self, status: RunStatus) -> bool {
        status.is_terminal()
    }
}

/// Shard rows.
#[async_trait]
pub trait ShardStore: Send + Sync {
    async fn create(&self, shard: &Shard) -> Result<(), StoreError>;

    async fn get(&self, id: ShardId) -> Result<Shard, StoreError>;

    /// All shards of a run, ordered by index.
    async fn list_by_run(&self, run_id: RunId) -> Result<Vec<Shard>, StoreError>;

    /// Same write-once terminal semantics as [`RunStore::update_status`].
    async fn update_status(&self, id: ShardId, status: ShardStatus) -> Result<(), StoreError>;

    /// Transition pending → running, recording the winning agent. A lost
    /// race surfaces as [`StoreError::Conflict`].
    async fn start(&self, id: ShardId, agent: AgentId) -> Result<(), StoreError>;

    /// Finalize the shard with a terminal status, counts, and error message.
    async fn finish(
        &self,
        id: ShardId,
        status: ShardStatus,
        results: &CaseCounts,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Return a running shard to pending, clearing its agent. Used when an
    /// agent rejects assigned work.
    async fn reset(&self, id: ShardId) -> Result<(), StoreError>;

    /// Remove every shard row of a run (compensation for partial creation).
    async fn delete_by_run(&self, run_id: RunId) -> Result<(), StoreError>;
}

/// Service rows. Read-only from the scheduler core.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn get(&self, id: ServiceId) -> Result<Service, StoreError>;

    async fn get_by_name(&self, name: &str) -> Result<Service, StoreError>;
}

/// Test definition rows. Read-only from the scheduler core.
#[async_trait]
pub trait TestStore: Send + Sync {
    /// Test definitions for a service, bounded.
    async fn list_by_service(
        &self,
        id: ServiceId,
        limit: usize,
    ) -> Result<Vec<TestDefinition>, StoreError>;
}

/// Agent rows.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create(&self, agent: &AgentRow) -> Result<(), StoreError>;

    /// Replace an existing row (REGISTER upsert path).
    async fn update(&self, agent: &AgentRow) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: AgentId) -> Result<AgentRow, StoreError>;

    /// Touch last_heartbeat and set the reported status.
    async fn update_heartbeat(&self, id: AgentId, status: AgentStatus) -> Result<(), StoreError>;

    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), StoreError>;

    async fn delete(&self, id: AgentId) -> Result<(), StoreError>;
}

/// Bundle of port handles the scheduler components share.
#[derive(Clone)]
pub struct Stores {
    pub runs: Arc<dyn RunStore>,
    pub shards: Arc<dyn ShardStore>,
    pub services: Arc<dyn ServiceStore>,
    pub tests: Arc<dyn TestStore>,
    pub agents: Arc<dyn AgentStore>,
}

impl Stores {
    /// Point every port at one backing store.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: RunStore + ShardStore + ServiceStore + TestStore + AgentStore + 'static,
    {
        Self {
            runs: backend.clone(),
            shards: backend.clone(),
            services: backend.clone(),
            tests: backend.clone(),
            agents: backend,
        }
    }
}
