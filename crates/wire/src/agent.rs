// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session message set.
//!
//! One bidirectional stream per agent, bounded by REGISTER and disconnect.
//! [`AgentMessage`] flows agent → control plane, [`ServerMessage`] the
//! other way. Both are internally tagged so the session loop can match on
//! one enum per direction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tp_core::{
    AgentCapabilities, AgentStatus, CaseCounts, ExecutionKind, GitRef, RunId, RunStatus, ShardId,
    ShardStatus, TestDefinition, TestId,
};

/// Messages an agent sends over its session stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Must be the first message on every stream.
    Register {
        /// Raw id as sent on the wire; validated by the session handler.
        agent_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        capabilities: AgentCapabilities,
        #[serde(default)]
        labels: HashMap<String, String>,
    },
    Heartbeat {
        status: WireAgentStatus,
        /// Advisory; recorded but not reconciled.
        #[serde(default)]
        active_run_ids: Vec<RunId>,
    },
    WorkAccepted {
        run_id: RunId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shard_id: Option<ShardId>,
    },
    WorkRejected {
        run_id: RunId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shard_id: Option<ShardId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// True when the agent may take this work later (capacity, not
        /// capability).
        #[serde(default)]
        temporary: bool,
    },
    Result {
        run_id: RunId,
        /// Per-session monotonic sequence for ordering diagnostics.
        sequence: u64,
        payload: ResultPayload,
    },
}

/// Result stream payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultPayload {
    LogChunk {
        /// "stdout" or "stderr"
        stream: String,
        data: String,
    },
    TestResult {
        test_id: TestId,
        name: String,
        passed: bool,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Artifact {
        name: String,
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    Progress {
        phase: String,
        percent: u8,
    },
    RunComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shard_id: Option<ShardId>,
        status: WireRunStatus,
        summary: RunSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Completion summary for a shard (or a whole non-sharded run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    #[serde(default)]
    pub duration_secs: f64,
}

impl RunSummary {
    pub fn counts(&self) -> CaseCounts {
        CaseCounts {
            total: self.total,
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}

/// Run status as reported on the wire.
///
/// `Unspecified` exists so a half-initialized agent report still decodes;
/// every mapping treats it as an error, uniformly across the sharded and
/// non-sharded completion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRunStatus {
    Unspecified,
    Passed,
    Failed,
    Error,
    Timeout,
    Cancelled,
}

impl WireRunStatus {
    pub fn into_run_status(self) -> RunStatus {
        match self {
            WireRunStatus::Passed => RunStatus::Passed,
            WireRunStatus::Failed => RunStatus::Failed,
            WireRunStatus::Timeout => RunStatus::Timeout,
            WireRunStatus::Cancelled => RunStatus::Cancelled,
            WireRunStatus::Error | WireRunStatus::Unspecified => RunStatus::Error,
        }
    }

    /// Shards have no timeout status; a timed-out shard is an error shard.
    pub fn into_shard_status(self) -> ShardStatus {
        match self {
            WireRunStatus::Passed => ShardStatus::Passed,
            WireRunStatus::Failed => ShardStatus::Failed,
            WireRunStatus::Cancelled => ShardStatus::Cancelled,
            WireRunStatus::Error | WireRunStatus::Timeout | WireRunStatus::Unspecified => {
                ShardStatus::Error
            }
        }
    }
}

/// Agent status as reported in heartbeats. Unknown values decode to
/// [`WireAgentStatus::Unknown`] rather than failing the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireAgentStatus {
    Idle,
    Busy,
    Draining,
    Unknown,
}

impl<'de> Deserialize<'de> for WireAgentStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "idle" => WireAgentStatus::Idle,
            "busy" => WireAgentStatus::Busy,
            "draining" => WireAgentStatus::Draining,
            _ => WireAgentStatus::Unknown,
        })
    }
}

impl WireAgentStatus {
    /// Map to the persistent enum; unknown defaults to idle.
    pub fn into_agent_status(self) -> AgentStatus {
        match self {
            WireAgentStatus::Idle | WireAgentStatus::Unknown => AgentStatus::Idle,
            WireAgentStatus::Busy => AgentStatus::Busy,
            WireAgentStatus::Draining => AgentStatus::Draining,
        }
    }
}

/// Messages the control plane sends to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegisterResponse {
        success: bool,
        heartbeat_interval_secs: u32,
        server_version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    AssignWork(AssignWork),
    CancelWork {
        run_id: RunId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shard_id: Option<ShardId>,
        reason: String,
        grace_secs: u32,
    },
    Drain {
        deadline_secs: u32,
    },
    Ack {
        run_id: RunId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// One shard's worth of work, everything the agent needs to execute it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignWork {
    pub run_id: RunId,
    pub shard_id: ShardId,
    pub shard_index: u32,
    pub shard_count: u32,
    pub git_ref: GitRef,
    pub tests: Vec<TestSpec>,
    pub execution: ExecutionKind,
    pub priority: i32,
    pub max_parallel_tests: u32,
}

/// Wire projection of a test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub id: TestId,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_format: Option<String>,
    #[serde(default)]
    pub artifact_patterns: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl From<&TestDefinition> for TestSpec {
    fn from(def: &TestDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name.clone(),
            command: def.command.clone(),
            args: def.args.clone(),
            result_format: def.result_format.clone(),
            artifact_patterns: def.artifact_patterns.clone(),
            retry_count: def.retry_count,
            timeout_secs: def.timeout_secs,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
