// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::startup::DaemonError;

/// Server version reported to agents (from Cargo.toml)
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve state directory: TP_STATE_DIR > XDG_STATE_HOME/testplane >
/// ~/.local/state/testplane
pub fn state_dir() -> Result<PathBuf, DaemonError> {
    if let Ok(dir) = std::env::var("TP_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("testplane"));
    }
    let home = std::env::var("HOME").map_err(|_| DaemonError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/testplane"))
}

fn duration_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Deadline for one submitter request/response exchange.
pub fn ipc_timeout() -> Duration {
    duration_ms("TP_IPC_TIMEOUT_MS", Duration::from_secs(5))
}

/// TCP port for agent session streams.
pub fn agent_port() -> u16 {
    std::env::var("TP_AGENT_PORT").ok().and_then(|s| s.parse::<u16>().ok()).unwrap_or(7463)
}

/// Optional TCP port for remote submitters. When unset, submitters use
/// the Unix socket only.
pub fn submit_port() -> Option<u16> {
    std::env::var("TP_SUBMIT_PORT").ok().and_then(|s| s.parse::<u16>().ok())
}

/// Scheduler loop tick period.
pub fn poll_interval() -> Duration {
    duration_ms("TP_POLL_INTERVAL_MS", Duration::from_secs(5))
}

/// Items drained per scheduler tick.
pub fn batch_size() -> usize {
    std::env::var("TP_BATCH_SIZE").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(10)
}

/// Heartbeat timeout; agents are told to beat at a third of this.
pub fn heartbeat_timeout() -> Duration {
    duration_ms("TP_HEARTBEAT_TIMEOUT_MS", Duration::from_secs(45))
}

/// Per-session assignment ticker period.
pub fn assign_interval() -> Duration {
    duration_ms("TP_ASSIGN_INTERVAL_MS", Duration::from_secs(5))
}

/// Snapshot writer period.
pub fn snapshot_interval() -> Duration {
    duration_ms("TP_SNAPSHOT_INTERVAL_MS", Duration::from_secs(30))
}

/// Optional service catalog loaded at boot (JSON seed file).
pub fn seed_file() -> Option<PathBuf> {
    std::env::var("TP_SEED_FILE").ok().map(PathBuf::from)
}

/// Pending-run scan bound for startup queue rehydration.
pub fn rehydrate_limit() -> usize {
    std::env::var("TP_REHYDRATE_LIMIT").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(1000)
}
