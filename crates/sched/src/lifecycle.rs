// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle coordinator: fold shard transitions back into run state.
//!
//! Accept/reject/complete callbacks land here from agent sessions and the
//! scheduler loop. After every shard completion the coordinator recomputes
//! the run's aggregates from its shard rows and finalizes the run once no
//! shard is pending or running.

use crate::error::SchedulerError;
use tp_core::{AgentId, CaseCounts, RunId, RunStatus, Shard, ShardId, ShardStatus};
use tp_storage::{Stores, StoreError};
use tp_wire::{RunSummary, WireRunStatus};
use tracing::debug;

/// Run-level view computed from a run's shard rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardAggregate {
    /// Shards in a terminal status.
    pub completed: u32,
    /// Shards in a non-passing terminal status.
    pub failed: u32,
    /// Per-test-case counts summed over all shards.
    pub counts: CaseCounts,
    /// True when no shard is pending or running.
    pub finished: bool,
    /// First non-empty error message of a non-passing shard, index order.
    pub error: Option<String>,
    /// Meaningful only when `finished`.
    pub final_status: RunStatus,
}

/// Aggregate a run's shards. Status precedence when finished:
/// error > failed > cancelled > passed.
pub fn aggregate(shards: &[Shard]) -> ShardAggregate {
    let mut agg = ShardAggregate {
        completed: 0,
        failed: 0,
        counts: CaseCounts::default(),
        finished: true,
        error: None,
        final_status: RunStatus::Passed,
    };
    let mut any = [false; 3]; // error, failed, cancelled
    for shard in shards {
        agg.counts.merge(&shard.counts);
        match shard.status {
            ShardStatus::Pending | ShardStatus::Running => agg.finished = false,
            terminal => {
                agg.completed += 1;
                if terminal.is_failure() {
                    agg.failed += 1;
                    if agg.error.is_none() {
                        agg.error = shard.error.clone().filter(|e| !e.is_empty());
                    }
                }
                match terminal {
                    ShardStatus::Error => any[0] = true,
                    ShardStatus::Failed => any[1] = true,
                    ShardStatus::Cancelled => any[2] = true,
                    _ => {}
                }
            }
        }
    }
    agg.final_status = if any[0] {
        RunStatus::Error
    } else if any[1] {
        RunStatus::Failed
    } else if any[2] {
        RunStatus::Cancelled
    } else {
        RunStatus::Passed
    };
    agg
}

/// Applies run/shard completion and recomputes run aggregates.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    stores: Stores,
}

impl LifecycleCoordinator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// An agent accepted an assignment: shard (if any) and run move to
    /// running, recording this agent. A lost shard race surfaces as a
    /// store conflict; the caller acks failure and the work stays with
    /// the winner.
    pub async fn on_work_accepted(
        &self,
        agent: AgentId,
        run_id: RunId,
        shard_id: Option<ShardId>,
    ) -> Result<(), SchedulerError> {
        if let Some(shard_id) = shard_id {
            self.stores.shards.start(shard_id, agent).await?;
        }
        match self.stores.runs.start(run_id, agent).await {
            Ok(()) => Ok(()),
            // The run is already running (scheduler pre-start, or a second
            // shard of the same run); that is not a lost race.
            Err(StoreError::Conflict(_))
                if self.stores.runs.get(run_id).await?.status == RunStatus::Running =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// An agent rejected an assignment: the shard returns to the pool,
    /// the run stays pending for the next match pass.
    pub async fn on_work_rejected(
        &self,
        run_id: RunId,
        shard_id: Option<ShardId>,
        temporary: bool,
    ) -> Result<(), SchedulerError> {
        debug!(run_id = %run_id, temporary, "work rejected");
        if let Some(shard_id) = shard_id {
            self.stores.shards.reset(shard_id).await?;
        }
        Ok(())
    }

    /// Terminal result for a shard (or, without a shard id, for a whole
    /// non-sharded run). The wire status maps through one rule everywhere:
    /// unspecified is an error.
    pub async fn on_run_complete(
        &self,
        run_id: RunId,
        shard_id: Option<ShardId>,
        status: WireRunStatus,
        summary: &RunSummary,
        error: Option<&str>,
    ) -> Result<(), SchedulerError> {
        match shard_id {
            Some(shard_id) => {
                self.stores
                    .shards
                    .finish(shard_id, status.into_shard_status(), &summary.counts(), error)
                    .await?;
                self.refresh_run(run_id).await
            }
            None => {
                self.stores
                    .runs
                    .finish(run_id, status.into_run_status(), &summary.counts(), error)
                    .await?;
                Ok(())
            }
        }
    }

    /// Recompute the run's aggregates from its shard rows; finalize when
    /// every shard is terminal.
    pub async fn refresh_run(&self, run_id: RunId) -> Result<(), SchedulerError> {
        let shards = self.stores.shards.list_by_run(run_id).await?;
        let agg = aggregate(&shards);
        if agg.finished {
            self.stores
                .runs
                .finish(run_id, agg.final_status, &agg.counts, agg.error.as_deref())
                .await?;
        } else {
            self.stores
                .runs
                .update_shard_stats(run_id, agg.completed, agg.failed, &agg.counts)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
