// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler loop: periodic queue drain, independent of agent polling.
//!
//! Each tick peeks a batch off the queue in priority order and tries to
//! place every item on the best-scoring connected agent whose zones
//! overlap. Per-item failures are logged and the tick moves on; the loop
//! itself only stops when its cancellation token fires.

use crate::error::SchedulerError;
use crate::matcher::{score_agent, WorkMatcher};
use crate::queue::WorkQueue;
use crate::registry::{ConnectedAgent, SessionRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tp_core::{Clock, RunStatus, WorkItem};
use tp_storage::{Stores, StoreError};
use tp_wire::ServerMessage;
use tracing::{debug, info, warn};

/// Scheduler loop tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(5), batch_size: 10 }
    }
}

struct LoopInner<C: Clock> {
    queue: Arc<WorkQueue>,
    registry: Arc<SessionRegistry>,
    stores: Stores,
    matcher: WorkMatcher,
    config: SchedulerConfig,
    clock: C,
}

/// Background loop that drains the queue and pushes assignments.
pub struct SchedulerLoop<C: Clock> {
    inner: Arc<LoopInner<C>>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> SchedulerLoop<C> {
    pub fn new(
        queue: Arc<WorkQueue>,
        registry: Arc<SessionRegistry>,
        stores: Stores,
        config: SchedulerConfig,
        clock: C,
    ) -> Self {
        let matcher = WorkMatcher::new(stores.clone());
        Self {
            inner: Arc::new(LoopInner { queue, registry, stores, matcher, config, clock }),
            token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Launch the tick task. Double-start is an error.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let inner = self.inner.clone();
        let token = self.token.clone();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_ms = inner.config.poll_interval.as_millis() as u64, "scheduler loop started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => inner.tick().await,
                }
            }
            info!("scheduler loop stopped");
        }));
        Ok(())
    }

    /// Cancel the loop and wait for the in-flight tick to drain. Stopping
    /// a never-started or already-stopped loop is a no-op. Callers wanting
    /// a deadline wrap this in `tokio::time::timeout`.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// One synchronous drain pass (also what the background task runs).
    pub async fn tick_once(&self) {
        self.inner.tick().await;
    }
}

impl<C: Clock> LoopInner<C> {
    async fn tick(&self) {
        let batch = self.queue.peek_batch(self.config.batch_size);
        if batch.is_empty() {
            return;
        }
        debug!(items = batch.len(), "scheduler tick");
        for item in batch {
            if let Err(e) = self.dispatch_item(&item).await {
                warn!(run_id = %item.run_id, error = %e, "dispatch failed");
            }
        }
    }

    async fn dispatch_item(&self, item: &WorkItem) -> Result<(), SchedulerError> {
        let candidates = self.registry.agents_in_zones(&item.zones);
        if candidates.is_empty() {
            // No agent can take it; the item stays queued.
            return Ok(());
        }

        let run = match self.stores.runs.get(item.run_id).await {
            Ok(run) => run,
            Err(StoreError::NotFound(_)) => {
                self.queue.remove(item.run_id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if run.status != RunStatus::Pending {
            debug!(run_id = %run.id, status = %run.status, "dropping stale queue item");
            self.queue.remove(item.run_id);
            return Ok(());
        }

        let Some(agent) = self.pick_agent(&candidates) else {
            // Every candidate is at capacity; retry next tick.
            return Ok(());
        };

        let Some(work) = self.matcher.assign_for_run(&run).await? else {
            // No pending shard (all in flight) or the service is gone.
            self.queue.remove(item.run_id);
            return Ok(());
        };
        let shard_index = work.shard_index;

        agent.send(&ServerMessage::AssignWork(work)).await?;
        agent.assignment_sent();

        if let Err(e) = self.stores.runs.start(run.id, agent.id()).await {
            // Lost to a concurrent accept on the agent path; the queue
            // entry goes either way.
            debug!(run_id = %run.id, error = %e, "run already started");
        }
        self.queue.remove(run.id);
        info!(run_id = %run.id, agent_id = %agent.id(), shard = shard_index, "run assigned");
        Ok(())
    }

    /// Best-scoring candidate; ties break by first-found order.
    fn pick_agent<'a>(
        &self,
        candidates: &'a [Arc<ConnectedAgent>],
    ) -> Option<&'a Arc<ConnectedAgent>> {
        let now_ms = self.clock.epoch_ms();
        let mut best: Option<(i64, &'a Arc<ConnectedAgent>)> = None;
        for agent in candidates {
            if let Some(score) = score_agent(agent, now_ms) {
                if best.map_or(true, |(top, _)| score > top) {
                    best = Some((score, agent));
                }
            }
        }
        best.map(|(_, agent)| agent)
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
