// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test definition: one runnable test belonging to a service.

use crate::id::{ServiceId, TestId};
use serde::{Deserialize, Serialize};

/// How an agent executes a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Container,
    Subprocess,
}

crate::labels! {
    ExecutionKind {
        Container: "container",
        Subprocess: "subprocess",
    }
}

/// A test definition. Read-only from the scheduler; definitions are synced
/// into the store by an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: TestId,
    pub service_id: ServiceId,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
    #[serde(default)]
    pub retry_count: u32,
    /// Glob patterns for artifacts an agent should collect.
    #[serde(default)]
    pub artifact_patterns: Vec<String>,
    pub execution: ExecutionKind,
    /// Hint for the result parser on the agent (e.g. "junit-xml").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_format: Option<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl TestDefinition {
    /// Minimal definition for tests.
    pub fn stub(service_id: ServiceId, name: &str) -> Self {
        Self {
            id: TestId::new(),
            service_id,
            name: name.to_string(),
            command: format!("run-{name}"),
            args: Vec::new(),
            tags: Vec::new(),
            timeout_secs: None,
            retry_count: 0,
            artifact_patterns: Vec::new(),
            execution: ExecutionKind::Subprocess,
            result_format: None,
        }
    }
}
