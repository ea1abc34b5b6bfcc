// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent agent record and capabilities.
//!
//! `AgentRow` is the durable view of an execution agent, upserted on
//! REGISTER and touched on every heartbeat. The live, connected view is the
//! session registry's business, not this module's.

use crate::id::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a persistent agent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    /// Finishing current work, accepting no new assignments.
    Draining,
    Offline,
}

crate::labels! {
    AgentStatus {
        Idle: "idle",
        Busy: "busy",
        Draining: "draining",
        Offline: "offline",
    }
}

/// Execution capabilities an agent reports at REGISTER time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub max_parallel: u32,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub docker_available: bool,
}

/// Durable agent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: AgentId,
    /// Unique agent name.
    pub name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub zones: Vec<String>,
    pub max_parallel: u32,
    #[serde(default)]
    pub docker_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl AgentRow {
    /// Build a fresh idle row from a REGISTER's reported capabilities.
    pub fn from_register(
        id: AgentId,
        name: String,
        version: Option<String>,
        caps: &AgentCapabilities,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            status: AgentStatus::Idle,
            zones: caps.zones.clone(),
            max_parallel: caps.max_parallel,
            docker_available: caps.docker_available,
            version,
            registered_at,
            last_heartbeat: None,
        }
    }
}
