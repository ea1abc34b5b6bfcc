// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submitter request/response surface.
//!
//! One request, one response, one connection — the submitter side has no
//! long-lived session.

use serde::{Deserialize, Serialize};
use tp_core::{Run, RunId, ServiceId, TestId, TriggerKind};

/// Requests a submitter may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmitRequest {
    ScheduleRun {
        service_id: ServiceId,
        /// Branch to run against; defaults to the service's default branch.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        git_sha: Option<String>,
        trigger: TriggerKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        triggered_by: Option<String>,
        #[serde(default)]
        priority: i32,
        /// Restrict to specific tests; empty means the whole set.
        #[serde(default)]
        test_ids: Vec<TestId>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shard_count: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_parallel: Option<u32>,
    },
    CancelRun {
        run_id: RunId,
        reason: String,
    },
    RetryRun {
        run_id: RunId,
    },
}

/// Responses to submitter requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmitResponse {
    /// The scheduled (or retried) run row.
    Run { run: Box<Run> },
    Ok,
    Error { code: String, message: String },
}

impl SubmitResponse {
    pub fn error(err: &tp_core::Error) -> Self {
        SubmitResponse::Error { code: err.code().to_string(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "submit_tests.rs"]
mod tests;
