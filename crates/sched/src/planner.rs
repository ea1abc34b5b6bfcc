// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shard planner: partition a run's tests and materialize shard rows.
//!
//! Partitioning is deterministic in test order (test i → shard i mod K),
//! so balanced counts fall out for free and a retried `ensure_shards`
//! recomputes the identical partition.

use crate::error::SchedulerError;
use std::sync::Arc;
use tp_core::{Run, Shard, ShardStatus, TestDefinition};
use tp_storage::ShardStore;
use tracing::warn;

/// Assign test i to shard (i mod K). Shard sizes differ by at most one;
/// empty shards (K > N) get empty test lists.
pub fn partition(tests: &[TestDefinition], shard_count: u32) -> Vec<Vec<TestDefinition>> {
    let k = shard_count.max(1) as usize;
    let mut partitions: Vec<Vec<TestDefinition>> = vec![Vec::new(); k];
    for (i, test) in tests.iter().enumerate() {
        partitions[i % k].push(test.clone());
    }
    partitions
}

/// Materializes and inspects a run's shard rows.
#[derive(Clone)]
pub struct ShardPlanner {
    shards: Arc<dyn ShardStore>,
}

impl ShardPlanner {
    pub fn new(shards: Arc<dyn ShardStore>) -> Self {
        Self { shards }
    }

    /// Return the run's shard rows paired with the recomputed partition,
    /// creating the rows on first call. Idempotent across retries: existing
    /// rows are returned as-is. Partial creation is undone by deleting the
    /// run's shard rows before surfacing the error.
    pub async fn ensure_shards(
        &self,
        run: &Run,
        tests: &[TestDefinition],
    ) -> Result<(Vec<Shard>, Vec<Vec<TestDefinition>>), SchedulerError> {
        let partitions = partition(tests, run.shard_count);

        let existing = self.shards.list_by_run(run.id).await?;
        if !existing.is_empty() {
            return Ok((existing, partitions));
        }

        let mut created = Vec::with_capacity(partitions.len());
        for (index, tests) in partitions.iter().enumerate() {
            let shard = Shard::new(run.id, index as u32, run.shard_count, tests.len() as u32);
            if let Err(e) = self.shards.create(&shard).await {
                warn!(run_id = %run.id, index, error = %e, "shard creation failed, rolling back");
                if let Err(del) = self.shards.delete_by_run(run.id).await {
                    warn!(run_id = %run.id, error = %del, "shard rollback failed");
                }
                return Err(e.into());
            }
            created.push(shard);
        }
        Ok((created, partitions))
    }

    /// The first pending shard with its test list; None when none pending.
    pub fn next_pending<'a>(
        shards: &'a [Shard],
        partitions: &'a [Vec<TestDefinition>],
    ) -> Option<(&'a Shard, &'a [TestDefinition])> {
        shards.iter().find(|s| s.status == ShardStatus::Pending).map(|shard| {
            let tests = partitions
                .get(shard.index as usize)
                .map(|t| t.as_slice())
                .unwrap_or(&[]);
            (shard, tests)
        })
    }

    pub fn has_pending(shards: &[Shard]) -> bool {
        shards.iter().any(|s| s.status == ShardStatus::Pending)
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
