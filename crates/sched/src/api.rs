// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submitter-facing scheduling API: schedule, cancel, retry.

use crate::error::SchedulerError;
use crate::queue::WorkQueue;
use crate::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tp_core::{
    Clock, Error, GitRef, Run, RunConfig, RunId, RunStatus, ServiceId, TriggerKind, WorkItem,
};
use tp_storage::{Stores, StoreError};
use tp_wire::{ServerMessage, SubmitRequest, SubmitResponse};
use tracing::{debug, info, warn};

/// Validated inputs for scheduling one run.
#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub service_id: ServiceId,
    pub git_ref: Option<String>,
    pub git_sha: Option<String>,
    pub trigger: TriggerKind,
    pub triggered_by: Option<String>,
    pub priority: i32,
    pub shard_count: u32,
    pub max_parallel: u32,
}

/// The scheduling API surface.
pub struct Scheduler<C: Clock> {
    stores: Stores,
    queue: Arc<WorkQueue>,
    registry: Arc<SessionRegistry>,
    clock: C,
    cancel_grace: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        stores: Stores,
        queue: Arc<WorkQueue>,
        registry: Arc<SessionRegistry>,
        clock: C,
    ) -> Self {
        Self { stores, queue, registry, clock, cancel_grace: Duration::from_secs(30) }
    }

    /// Grace period agents get to wind down cancelled work.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Wire-level entry point: dispatch a submitter request.
    pub async fn handle(&self, request: SubmitRequest) -> SubmitResponse {
        match request {
            SubmitRequest::ScheduleRun {
                service_id,
                git_ref,
                git_sha,
                trigger,
                triggered_by,
                priority,
                test_ids: _,
                tags: _,
                shard_count,
                max_parallel,
            } => {
                let params = ScheduleParams {
                    service_id,
                    git_ref,
                    git_sha,
                    trigger,
                    triggered_by,
                    priority,
                    shard_count: shard_count.unwrap_or(1),
                    max_parallel: max_parallel.unwrap_or(1),
                };
                match self.schedule_run(params).await {
                    Ok(run) => SubmitResponse::Run { run: Box::new(run) },
                    Err(e) => SubmitResponse::error(&e),
                }
            }
            SubmitRequest::CancelRun { run_id, reason } => {
                match self.cancel_run(run_id, &reason).await {
                    Ok(()) => SubmitResponse::Ok,
                    Err(e) => SubmitResponse::error(&e),
                }
            }
            SubmitRequest::RetryRun { run_id } => match self.retry_run(run_id).await {
                Ok(run) => SubmitResponse::Run { run: Box::new(run) },
                Err(e) => SubmitResponse::error(&e),
            },
        }
    }

    /// Persist a new pending run and enqueue it. If the enqueue fails
    /// after the row is written, the run is marked errored so no run is
    /// left silently queued-but-not-queued.
    pub async fn schedule_run(&self, params: ScheduleParams) -> Result<Run, Error> {
        let service = match self.stores.services.get(params.service_id).await {
            Ok(service) => service,
            Err(StoreError::NotFound(_)) => {
                return Err(Error::InvalidArgument(format!(
                    "service {} not found",
                    params.service_id
                )));
            }
            Err(e) => return Err(Error::Store(e.to_string())),
        };

        let run = Run::new(
            RunConfig {
                service_id: service.id,
                git_ref: GitRef {
                    url: service.git_url.clone(),
                    branch: params.git_ref.clone().or(Some(service.default_branch.clone())),
                    sha: params.git_sha.clone(),
                },
                priority: params.priority,
                trigger: params.trigger,
                triggered_by: params.triggered_by.clone(),
                shard_count: params.shard_count,
                max_parallel: params.max_parallel,
            },
            &self.clock,
        );

        self.stores.runs.create(&run).await.map_err(|e| Error::Store(e.to_string()))?;

        if let Err(e) = self.queue.push(WorkItem::from_run(&run, &service)) {
            warn!(run_id = %run.id, error = %e, "enqueue failed after persist, compensating");
            if let Err(update) =
                self.stores.runs.update_status(run.id, RunStatus::Error, Some("enqueue failed")).await
            {
                warn!(run_id = %run.id, error = %update, "compensating update failed");
            }
            return Err(e.into());
        }

        info!(
            run_id = %run.id,
            service = %service.name,
            priority = run.priority,
            trigger = %run.trigger,
            "run scheduled"
        );
        Ok(run)
    }

    /// Cancel a run. Terminal runs are refused; pending runs leave the
    /// queue quietly; running runs get a best-effort CANCEL_WORK to their
    /// agent and are cancelled regardless of whether it arrived.
    pub async fn cancel_run(&self, run_id: RunId, reason: &str) -> Result<(), Error> {
        let run = self.get_run(run_id).await?;
        if run.is_terminal() {
            return Err(Error::FailedPrecondition(format!(
                "run {run_id} is already {}",
                run.status
            )));
        }

        if run.status == RunStatus::Pending {
            self.queue.remove(run_id);
        } else if let Some(agent_id) = run.agent_id {
            // Fire-and-forget beyond the store update.
            if let Some(agent) = self.registry.get(agent_id) {
                let cancel = ServerMessage::CancelWork {
                    run_id,
                    shard_id: None,
                    reason: reason.to_string(),
                    grace_secs: self.cancel_grace.as_secs() as u32,
                };
                if let Err(e) = agent.send(&cancel).await {
                    debug!(run_id = %run_id, agent_id = %agent_id, error = %e, "cancel notify failed");
                }
            }
        }

        self.cancel_shards(run_id).await;
        self.stores
            .runs
            .update_status(run_id, RunStatus::Cancelled, Some(reason))
            .await
            .map_err(|e| Error::from(SchedulerError::from(e)))?;
        info!(run_id = %run_id, reason, "run cancelled");
        Ok(())
    }

    /// Schedule a fresh run copying a terminal run's parameters.
    pub async fn retry_run(&self, run_id: RunId) -> Result<Run, Error> {
        let run = self.get_run(run_id).await?;
        if !run.is_terminal() {
            return Err(Error::FailedPrecondition(format!(
                "run {run_id} is still {}",
                run.status
            )));
        }

        let retried = self
            .schedule_run(ScheduleParams {
                service_id: run.service_id,
                git_ref: run.git_ref.branch.clone(),
                git_sha: run.git_ref.sha.clone(),
                trigger: run.trigger,
                triggered_by: run.triggered_by.clone(),
                priority: run.priority,
                shard_count: run.shard_count,
                max_parallel: run.max_parallel,
            })
            .await?;
        info!(run_id = %run_id, new_run_id = %retried.id, "run retried");
        Ok(retried)
    }

    async fn get_run(&self, run_id: RunId) -> Result<Run, Error> {
        match self.stores.runs.get(run_id).await {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound(_)) => Err(Error::NotFound(format!("run {run_id}"))),
            Err(e) => Err(Error::Store(e.to_string())),
        }
    }

    /// Cancel every non-terminal shard row. Best-effort: failures are
    /// logged and the run-level cancellation proceeds.
    async fn cancel_shards(&self, run_id: RunId) {
        let shards = match self.stores.shards.list_by_run(run_id).await {
            Ok(shards) => shards,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "shard listing failed during cancel");
                return;
            }
        };
        for shard in shards.iter().filter(|s| !s.is_terminal()) {
            if let Err(e) =
                self.stores.shards.update_status(shard.id, tp_core::ShardStatus::Cancelled).await
            {
                warn!(shard_id = %shard.id, error = %e, "shard cancel failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
