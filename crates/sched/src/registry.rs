// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: the live view of connected agents.
//!
//! One [`ConnectedAgent`] per agent id. A new REGISTER for an already
//! connected id supersedes the old session: the prior session's cancel
//! handle fires *before* the map entry is replaced, so the prior session's
//! own disconnect path (not the new session) moves the persistent row to
//! offline, serialized by the store's row lock.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tp_core::{zones_match, AgentCapabilities, AgentId};
use tp_wire::{write_frame, ProtocolError, ServerMessage};
use tracing::debug;

/// A connected agent session's in-memory state. Owned by the registry;
/// never outlives the process.
pub struct ConnectedAgent {
    id: AgentId,
    name: String,
    capabilities: AgentCapabilities,
    labels: HashMap<String, String>,
    /// Outbound half of the stream. The mutex is the per-session send lock:
    /// the assignment ticker and reactive ACKs write from different tasks,
    /// and frames must not interleave.
    outbound: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    last_seen_ms: AtomicU64,
    /// In-flight assignments, for available-slot scoring.
    active: AtomicU32,
    cancel: CancellationToken,
}

impl ConnectedAgent {
    pub fn new(
        id: AgentId,
        name: String,
        capabilities: AgentCapabilities,
        labels: HashMap<String, String>,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            name,
            capabilities,
            labels,
            outbound: Mutex::new(Box::new(writer)),
            last_seen_ms: AtomicU64::new(now_ms),
            active: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send one message under the session send lock.
    pub async fn send(&self, msg: &ServerMessage) -> Result<(), ProtocolError> {
        let mut writer = self.outbound.lock().await;
        write_frame(&mut *writer, msg).await
    }

    pub fn touch(&self, now_ms: u64) {
        self.last_seen_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_seen_ms(&self) -> u64 {
        self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// Capacity minus in-flight assignments. May go negative when the
    /// scheduler over-assigns during a race; scoring rejects those.
    pub fn available_slots(&self) -> i64 {
        self.capabilities.max_parallel as i64 - self.active.load(Ordering::Relaxed) as i64
    }

    pub fn assignment_sent(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn assignment_done(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn active_assignments(&self) -> u32 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Map of connected agents, keyed by agent id.
#[derive(Default)]
pub struct SessionRegistry {
    agents: RwLock<HashMap<AgentId, Arc<ConnectedAgent>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, superseding any prior session for the same id.
    /// The prior session's cancel handle fires before the entry is
    /// replaced; the superseded session is returned for logging.
    pub fn register(&self, agent: Arc<ConnectedAgent>) -> Option<Arc<ConnectedAgent>> {
        let mut agents = self.agents.write();
        let prior = agents.get(&agent.id).cloned();
        if let Some(ref prev) = prior {
            debug!(agent_id = %prev.id, "superseding existing session");
            prev.cancel.cancel();
        }
        agents.insert(agent.id, agent);
        prior
    }

    /// Remove a session, but only if the stored entry is this exact
    /// session. A superseded session's late disconnect must not evict its
    /// successor.
    pub fn deregister(&self, agent: &Arc<ConnectedAgent>) -> bool {
        let mut agents = self.agents.write();
        match agents.get(&agent.id) {
            Some(current) if Arc::ptr_eq(current, agent) => {
                agents.remove(&agent.id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<ConnectedAgent>> {
        self.agents.read().get(&id).cloned()
    }

    /// Connected agents whose zones overlap `zones` (empty matches any).
    pub fn agents_in_zones(&self, zones: &[String]) -> Vec<Arc<ConnectedAgent>> {
        self.agents
            .read()
            .values()
            .filter(|a| zones_match(zones, &a.capabilities.zones))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<ConnectedAgent>> {
        self.agents.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
