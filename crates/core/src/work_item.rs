// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work item: the in-memory, queueable projection of a pending run.

use crate::id::{RunId, ServiceId};
use crate::run::Run;
use crate::service::Service;
use chrono::{DateTime, Utc};

/// The pending slice of a run, as the priority queue sees it. Created when
/// a run becomes pending, removed when it is assigned or leaves pending,
/// rebuilt on startup from the store. Never outlives the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub run_id: RunId,
    pub service_id: ServiceId,
    pub priority: i32,
    /// Snapshot of the service's zones at enqueue time.
    pub zones: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    /// Project a pending run (and its service's zone constraints) into a
    /// queueable item.
    pub fn from_run(run: &Run, service: &Service) -> Self {
        Self {
            run_id: run.id,
            service_id: run.service_id,
            priority: run.priority,
            zones: service.zones.clone(),
            created_at: run.created_at,
        }
    }
}
