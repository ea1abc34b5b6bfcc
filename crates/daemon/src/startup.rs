// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! The order is load-bearing (and verified by the queue's dedup
//! semantics): load the snapshot, rehydrate the queue, start the
//! scheduler loop, and only then bind listeners. A `ScheduleRun` arriving
//! before rehydration would collide with its own rehydrated work item.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tp_core::SystemClock;
use tp_sched::{
    Scheduler, SchedulerConfig, SchedulerError, SchedulerLoop, SessionConfig, SessionHub,
    SessionRegistry, WorkQueue,
};
use tp_storage::{load_snapshot, save_snapshot, MemoryStore, StoreError, Stores};
use tracing::{info, warn};

use crate::env;
use crate::listener::Listener;

/// Errors from daemon lifecycle operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("cannot determine state directory (HOME unset)")]
    NoStateDir,

    #[error("another daemon holds the lock: {0}")]
    LockFailed(std::io::Error),

    #[error("failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sched(#[from] SchedulerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon path and tuning configuration.
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub seed_file: Option<PathBuf>,
    pub agent_port: u16,
    pub submit_port: Option<u16>,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
    pub snapshot_interval: Duration,
    pub rehydrate_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, DaemonError> {
        let state_dir = env::state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("tpd.sock"),
            lock_path: state_dir.join("tpd.lock"),
            snapshot_path: state_dir.join("state.snap"),
            seed_file: env::seed_file(),
            agent_port: env::agent_port(),
            submit_port: env::submit_port(),
            scheduler: SchedulerConfig {
                poll_interval: env::poll_interval(),
                batch_size: env::batch_size(),
            },
            session: SessionConfig {
                heartbeat_timeout: env::heartbeat_timeout(),
                assign_interval: env::assign_interval(),
                register_timeout: Duration::from_secs(30),
                server_version: env::SERVER_VERSION.to_string(),
            },
            snapshot_interval: env::snapshot_interval(),
            rehydrate_limit: env::rehydrate_limit(),
            state_dir,
        })
    }
}

/// A running daemon: handles needed for shutdown.
pub struct Daemon {
    store: Arc<MemoryStore>,
    snapshot_path: PathBuf,
    sched_loop: Arc<SchedulerLoop<SystemClock>>,
    token: CancellationToken,
    _lock_file: std::fs::File,
}

impl Daemon {
    /// Stop background tasks and write a final snapshot.
    pub async fn shutdown(self) {
        info!("daemon shutting down");
        self.token.cancel();
        self.sched_loop.stop().await;
        if let Err(e) = save_snapshot(&self.snapshot_path, &self.store) {
            warn!(error = %e, "final snapshot failed");
        }
    }
}

/// Start the daemon: recover state, rehydrate the queue, start the
/// scheduler loop, then open the listeners.
pub async fn startup(config: Config) -> Result<Daemon, DaemonError> {
    // 1. State directory and exclusive lock first, so two daemons cannot
    // race on the same snapshot.
    std::fs::create_dir_all(&config.state_dir)?;
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(DaemonError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 2. Recover persistent state.
    let store = Arc::new(MemoryStore::new());
    if load_snapshot(&config.snapshot_path, &store)? {
        info!(path = %config.snapshot_path.display(), "state recovered from snapshot");
    } else {
        info!("no snapshot found, starting with empty state");
    }
    let stores = Stores::from_backend(store.clone());

    if let Some(ref seed_path) = config.seed_file {
        crate::seed::load_seed_file(seed_path, &store).await?;
    }

    // 3. Rehydrate the queue before any traffic is accepted.
    let queue = Arc::new(WorkQueue::new());
    let count =
        queue.load_from_store(&*stores.runs, &*stores.services, config.rehydrate_limit).await?;
    info!(pending = count, "queue rehydrated");

    // 4. Core components.
    let registry = Arc::new(SessionRegistry::new());
    let hub = Arc::new(SessionHub::new(
        stores.clone(),
        registry.clone(),
        queue.clone(),
        config.session.clone(),
        SystemClock,
    ));
    let scheduler =
        Arc::new(Scheduler::new(stores.clone(), queue.clone(), registry.clone(), SystemClock));
    let sched_loop = Arc::new(SchedulerLoop::new(
        queue.clone(),
        registry.clone(),
        stores.clone(),
        config.scheduler.clone(),
        SystemClock,
    ));
    sched_loop.start()?;

    let token = CancellationToken::new();

    // 5. Snapshot writer.
    spawn_snapshot_task(
        store.clone(),
        config.snapshot_path.clone(),
        config.snapshot_interval,
        token.clone(),
    );

    // 6. Bind listeners LAST, after rehydration and loop start.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let submit_unix = UnixListener::bind(&config.socket_path)
        .map_err(|e| DaemonError::BindFailed(config.socket_path.display().to_string(), e))?;
    let agent_addr = format!("0.0.0.0:{}", config.agent_port);
    let agent_tcp = TcpListener::bind(&agent_addr)
        .await
        .map_err(|e| DaemonError::BindFailed(agent_addr.clone(), e))?;
    let submit_tcp = match config.submit_port {
        Some(port) => {
            let addr = format!("0.0.0.0:{port}");
            Some(
                TcpListener::bind(&addr)
                    .await
                    .map_err(|e| DaemonError::BindFailed(addr, e))?,
            )
        }
        None => None,
    };

    let listener = Listener::new(submit_unix, submit_tcp, agent_tcp, scheduler, hub, token.clone());
    tokio::spawn(listener.run());

    info!(
        socket = %config.socket_path.display(),
        agent_port = config.agent_port,
        "daemon ready"
    );

    Ok(Daemon {
        store,
        snapshot_path: config.snapshot_path,
        sched_loop,
        token,
        _lock_file: lock_file,
    })
}

fn spawn_snapshot_task(
    store: Arc<MemoryStore>,
    path: PathBuf,
    period: Duration,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = save_snapshot(&path, &store) {
                        warn!(error = %e, "periodic snapshot failed");
                    }
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
