// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work matcher: pair pending runs with agent capabilities.
//!
//! Two callers share it. Each session's assignment ticker asks "is there
//! work this agent may take?" ([`WorkMatcher::find_work`]); the scheduler
//! loop asks "build the assignment for this specific run"
//! ([`WorkMatcher::assign_for_run`]) after picking the best agent by
//! [`score_agent`].

use crate::error::SchedulerError;
use crate::planner::ShardPlanner;
use crate::registry::ConnectedAgent;
use tp_core::{zones_match, AgentCapabilities, ExecutionKind, Run};
use tp_storage::{Stores, StoreError};
use tp_wire::{AssignWork, TestSpec};
use tracing::debug;

/// How many pending runs one match pass inspects.
const PENDING_RUN_SCAN: usize = 100;

/// Upper bound on test definitions fetched per run.
const TEST_LIST_CAP: usize = 1000;

/// Heartbeat recency bonus tiers (age cutoff ms, bonus).
const HEARTBEAT_BONUS: [(u64, i64); 3] = [(10_000, 50), (30_000, 25), (60_000, 10)];

/// Score an agent for assignment. `None` means the agent has no free
/// slots and is not a candidate. Higher is better; ties break by
/// first-found order at the caller.
pub fn score_agent(agent: &ConnectedAgent, now_ms: u64) -> Option<i64> {
    let available = agent.available_slots();
    if available <= 0 {
        return None;
    }
    let age_ms = now_ms.saturating_sub(agent.last_seen_ms());
    let heartbeat_bonus = HEARTBEAT_BONUS
        .iter()
        .find(|(cutoff, _)| age_ms < *cutoff)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0);
    let docker_bonus = if agent.capabilities().docker_available { 5 } else { 0 };
    Some(available * 100 + heartbeat_bonus + docker_bonus)
}

/// Matches pending runs against agent capabilities.
#[derive(Clone)]
pub struct WorkMatcher {
    stores: Stores,
    planner: ShardPlanner,
}

impl WorkMatcher {
    pub fn new(stores: Stores) -> Self {
        let planner = ShardPlanner::new(stores.shards.clone());
        Self { stores, planner }
    }

    /// Find a runnable (run, shard, tests) triple for an agent with the
    /// given capabilities. Walks pending runs in store order (priority +
    /// age); a deleted service skips the run, any other store error
    /// surfaces. `None` means nothing runnable right now.
    pub async fn find_work(
        &self,
        caps: &AgentCapabilities,
    ) -> Result<Option<AssignWork>, SchedulerError> {
        let pending = self.stores.runs.get_pending(PENDING_RUN_SCAN).await?;
        for run in &pending {
            let service = match self.stores.services.get(run.service_id).await {
                Ok(service) => service,
                Err(StoreError::NotFound(_)) => {
                    debug!(run_id = %run.id, "skipping run: service deleted");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if !zones_match(&service.zones, &caps.zones) {
                continue;
            }
            if let Some(work) = self.next_shard_assignment(run).await? {
                return Ok(Some(work));
            }
        }
        Ok(None)
    }

    /// Build the next assignment for one specific run, or `None` when the
    /// run has no pending shard (or its service is gone).
    pub async fn assign_for_run(&self, run: &Run) -> Result<Option<AssignWork>, SchedulerError> {
        match self.stores.services.get(run.service_id).await {
            Ok(_) => self.next_shard_assignment(run).await,
            Err(StoreError::NotFound(_)) => {
                debug!(run_id = %run.id, "skipping run: service deleted");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn next_shard_assignment(
        &self,
        run: &Run,
    ) -> Result<Option<AssignWork>, SchedulerError> {
        let tests = self.stores.tests.list_by_service(run.service_id, TEST_LIST_CAP).await?;
        let (shards, partitions) = self.planner.ensure_shards(run, &tests).await?;
        let Some((shard, shard_tests)) = ShardPlanner::next_pending(&shards, &partitions) else {
            return Ok(None);
        };

        // Container wins when any test in the shard needs it.
        let execution = if shard_tests.iter().any(|t| t.execution == ExecutionKind::Container) {
            ExecutionKind::Container
        } else {
            ExecutionKind::Subprocess
        };

        Ok(Some(AssignWork {
            run_id: run.id,
            shard_id: shard.id,
            shard_index: shard.index,
            shard_count: run.shard_count,
            git_ref: run.git_ref.clone(),
            tests: shard_tests.iter().map(TestSpec::from).collect(),
            execution,
            priority: run.priority,
            max_parallel_tests: run.max_parallel,
        }))
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
