// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! A snapshot is the complete row set at a point in time, serialized as
//! zstd-compressed JSON. The daemon writes one on a timer and loads the
//! latest at boot, before any traffic is accepted. Outgoing snapshots
//! are kept in a numbered backup chain (`<name>.1` newest, `<name>.3`
//! oldest) so a bad write never strands the operator without history.

use crate::error::StoreError;
use crate::memory::{MemoryStore, Rows};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tp_core::Clock;

/// Schema version written into every snapshot; loads reject mismatches.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// How many superseded snapshots to keep in the backup chain.
const KEEP_BACKUPS: u32 = 3;

/// A snapshot of all rows at a point in time.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    version: u32,
    /// Write time, taken from the store's clock.
    created_at: DateTime<Utc>,
    rows: Rows,
}

/// Path of backup slot `n` for a snapshot: the numeric suffix is
/// appended, so `state.snap` backs up to `state.snap.1` and so on.
fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Free slot 1 of the backup chain by shifting every existing backup one
/// slot down. Renaming onto slot KEEP_BACKUPS+1 never happens, so the
/// oldest backup simply gets overwritten by its successor.
fn shift_backups(path: &Path) {
    for n in (1..KEEP_BACKUPS).rev() {
        let occupant = backup_path(path, n);
        if occupant.exists() {
            let _ = fs::rename(&occupant, backup_path(path, n + 1));
        }
    }
}

/// Write the store's rows to `path`, moving any previous snapshot into
/// the backup chain. The write goes through a `.tmp` sibling and a rename
/// so a crash mid-write never clobbers the last good snapshot.
pub fn save_snapshot<C: Clock>(path: &Path, store: &MemoryStore<C>) -> Result<(), StoreError> {
    let snapshot =
        Snapshot { version: CURRENT_SNAPSHOT_VERSION, created_at: store.now(), rows: store.export() };
    let json = serde_json::to_vec(&snapshot)?;
    let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &compressed)?;
    if path.exists() {
        shift_backups(path);
        let _ = fs::rename(path, backup_path(path, 1));
    }
    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), bytes = compressed.len(), "snapshot written");
    Ok(())
}

/// Load the snapshot at `path` into `store`, replacing its rows. Returns
/// false when no snapshot exists (fresh start).
pub fn load_snapshot<C: Clock>(path: &Path, store: &MemoryStore<C>) -> Result<bool, StoreError> {
    let compressed = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let json = zstd::decode_all(compressed.as_slice())?;
    let snapshot: Snapshot = serde_json::from_slice(&json)?;
    if snapshot.version != CURRENT_SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "snapshot version {} (expected {})",
            snapshot.version, CURRENT_SNAPSHOT_VERSION
        )));
    }
    store.import(snapshot.rows);
    tracing::info!(path = %path.display(), "snapshot loaded");
    Ok(true)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
