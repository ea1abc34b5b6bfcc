// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ports::{RunStore, ServiceStore};
use tp_core::test_support::service_in_zones;
use tp_core::{Run, RunStatus};

#[tokio::test]
async fn snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snap");

    let store = MemoryStore::new();
    let service = service_in_zones("payments", &["zone-a"]);
    store.insert_service(service.clone());
    let run = Run::builder().service_id(service.id).priority(7).build();
    store.create(&run).await.unwrap();

    save_snapshot(&path, &store).unwrap();

    let recovered = MemoryStore::new();
    assert!(load_snapshot(&path, &recovered).unwrap());

    let got = RunStore::get(&recovered, run.id).await.unwrap();
    assert_eq!(got.priority, 7);
    assert_eq!(got.status, RunStatus::Pending);
    assert_eq!(ServiceStore::get(&recovered, service.id).await.unwrap().name, "payments");
}

#[test]
fn missing_snapshot_is_fresh_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    assert!(!load_snapshot(&dir.path().join("none.snap"), &store).unwrap());
}

#[test]
fn corrupt_snapshot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snap");
    std::fs::write(&path, b"not a snapshot").unwrap();
    let store = MemoryStore::new();
    assert!(load_snapshot(&path, &store).is_err());
}

#[test]
fn repeated_saves_keep_a_capped_backup_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snap");
    let store = MemoryStore::new();

    for _ in 0..5 {
        save_snapshot(&path, &store).unwrap();
    }

    assert!(path.exists());
    assert!(dir.path().join("state.snap.1").exists());
    assert!(dir.path().join("state.snap.2").exists());
    assert!(dir.path().join("state.snap.3").exists());
    // The chain is capped; older snapshots are overwritten, not kept.
    assert!(!dir.path().join("state.snap.4").exists());
}
