// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shard record: one independently assignable partition of a run's tests.

use crate::id::{AgentId, RunId, ShardId};
use crate::run::CaseCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a shard. Transitions are monotonic:
/// pending → running → one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Error,
    Cancelled,
}

impl ShardStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ShardStatus::Pending | ShardStatus::Running)
    }

    /// Non-passing terminal statuses count toward the run's failed-shard
    /// aggregate.
    pub fn is_failure(&self) -> bool {
        matches!(self, ShardStatus::Failed | ShardStatus::Error | ShardStatus::Cancelled)
    }
}

crate::labels! {
    ShardStatus {
        Pending: "pending",
        Running: "running",
        Passed: "passed",
        Failed: "failed",
        Error: "error",
        Cancelled: "cancelled",
    }
}

/// One partition of a run's tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shard {
    pub id: ShardId,
    pub run_id: RunId,
    /// Dense index in 0..of.
    pub index: u32,
    /// Total shard count for the run.
    pub of: u32,
    pub status: ShardStatus,
    /// Agent the shard is (or was) assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub counts: CaseCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Shard {
    /// Create a pending shard row.
    pub fn new(run_id: RunId, index: u32, of: u32, total_tests: u32) -> Self {
        Self {
            id: ShardId::new(),
            run_id,
            index,
            of,
            status: ShardStatus::Pending,
            agent_id: None,
            counts: CaseCounts { total: total_tests, ..CaseCounts::default() },
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Test builder: a single pending shard, adjusted per test through the
/// setters below.
#[cfg(any(test, feature = "test-support"))]
pub struct ShardBuilder(Shard);

#[cfg(any(test, feature = "test-support"))]
impl Default for ShardBuilder {
    fn default() -> Self {
        Self(Shard {
            id: ShardId::from_string("shd-test-1"),
            run_id: RunId::from_string("run-test-1"),
            index: 0,
            of: 1,
            status: ShardStatus::Pending,
            agent_id: None,
            counts: CaseCounts::default(),
            started_at: None,
            finished_at: None,
            error: None,
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ShardBuilder {
    pub fn status(mut self, status: ShardStatus) -> Self {
        self.0.status = status;
        self
    }

    pub fn counts(mut self, counts: CaseCounts) -> Self {
        self.0.counts = counts;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.0.error = Some(error.into());
        self
    }

    pub fn build(self) -> Shard {
        self.0
    }
}

#[cfg(test)]
#[path = "shard_tests.rs"]
mod tests;
