// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record and state machine.
//!
//! A run is a requested execution of one service's test set at a specific
//! git reference. It is the aggregate root: shard rows hang off it, and its
//! terminal status is derived from theirs once all shards finish.

use crate::clock::Clock;
use crate::id::{AgentId, RunId, ServiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Queued, waiting for an agent
    Pending,
    /// At least one shard assigned
    Running,
    Passed,
    Failed,
    /// Infrastructure failure (agent error, store conflict)
    Error,
    Timeout,
    Cancelled,
}

impl RunStatus {
    /// Terminal statuses are write-once; no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

crate::labels! {
    RunStatus {
        Pending: "pending",
        Running: "running",
        Passed: "passed",
        Failed: "failed",
        Error: "error",
        Timeout: "timeout",
        Cancelled: "cancelled",
    }
}

/// What caused a run to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Webhook,
    Scheduled,
}

crate::labels! {
    TriggerKind {
        Manual: "manual",
        Webhook: "webhook",
        Scheduled: "scheduled",
    }
}

/// Git reference a run executes against. The url is denormalized from the
/// service row at schedule time so assignments carry everything an agent
/// needs to clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Per-test-case counts, aggregated run-wide and per shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl CaseCounts {
    /// Accumulate another set of counts into this one.
    pub fn merge(&mut self, other: &CaseCounts) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Configuration for creating a new run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub service_id: ServiceId,
    pub git_ref: GitRef,
    pub priority: i32,
    pub trigger: TriggerKind,
    pub triggered_by: Option<String>,
    pub shard_count: u32,
    pub max_parallel: u32,
}

/// A run instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub service_id: ServiceId,
    pub git_ref: GitRef,
    pub priority: i32,
    pub trigger: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub status: RunStatus,
    pub shard_count: u32,
    pub max_parallel: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Agent that most recently accepted work for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub counts: CaseCounts,
    /// Shards in a terminal status.
    #[serde(default)]
    pub shards_completed: u32,
    /// Shards in a non-passing terminal status.
    #[serde(default)]
    pub shards_failed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    /// Create a new pending run. Shard count is clamped to at least 1.
    pub fn new(config: RunConfig, clock: &impl Clock) -> Self {
        Self {
            id: RunId::new(),
            service_id: config.service_id,
            git_ref: config.git_ref,
            priority: config.priority,
            trigger: config.trigger,
            triggered_by: config.triggered_by,
            status: RunStatus::Pending,
            shard_count: config.shard_count.max(1),
            max_parallel: config.max_parallel,
            created_at: clock.utc(),
            started_at: None,
            finished_at: None,
            agent_id: None,
            counts: CaseCounts::default(),
            shards_completed: 0,
            shards_failed: 0,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Test builder: a pending run with placeholder identifiers, adjusted
/// per test through the setters below.
#[cfg(any(test, feature = "test-support"))]
pub struct RunBuilder(Run);

#[cfg(any(test, feature = "test-support"))]
impl Default for RunBuilder {
    fn default() -> Self {
        Self(Run {
            id: RunId::from_string("run-test-1"),
            service_id: ServiceId::from_string("svc-test-1"),
            git_ref: GitRef {
                url: "https://git.example.com/svc.git".to_string(),
                branch: Some("main".to_string()),
                sha: None,
            },
            priority: 0,
            trigger: TriggerKind::Manual,
            triggered_by: None,
            status: RunStatus::Pending,
            shard_count: 1,
            max_parallel: 1,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            agent_id: None,
            counts: CaseCounts::default(),
            shards_completed: 0,
            shards_failed: 0,
            error: None,
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
impl RunBuilder {
    pub fn id(mut self, id: impl Into<RunId>) -> Self {
        self.0.id = id.into();
        self
    }

    pub fn service_id(mut self, id: impl Into<ServiceId>) -> Self {
        self.0.service_id = id.into();
        self
    }

    pub fn git_ref(mut self, git_ref: GitRef) -> Self {
        self.0.git_ref = git_ref;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.0.priority = priority;
        self
    }

    pub fn shard_count(mut self, shard_count: u32) -> Self {
        self.0.shard_count = shard_count;
        self
    }

    pub fn build(self) -> Run {
        self.0
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Run {
    /// Builder with test defaults.
    pub fn builder() -> RunBuilder {
        RunBuilder::default()
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
