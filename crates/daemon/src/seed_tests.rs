// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tp_core::test_support::{service_in_zones, test_defs};
use tp_storage::TestStore;

fn write_seed(dir: &std::path::Path, entries: &[(tp_core::Service, Vec<TestDefinition>)]) -> std::path::PathBuf {
    let path = dir.join("seed.json");
    let json: Vec<serde_json::Value> = entries
        .iter()
        .map(|(service, tests)| {
            serde_json::json!({ "service": service, "tests": tests })
        })
        .collect();
    std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn seed_file_populates_services_and_tests() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let service = service_in_zones("payments", &["zone-a"]);
    let tests = test_defs(service.id, 3);
    let path = write_seed(dir.path(), &[(service.clone(), tests)]);

    let added = load_seed_file(&path, &store).await.unwrap();
    assert_eq!(added, 1);
    assert_eq!(store.get_by_name("payments").await.unwrap().id, service.id);
    assert_eq!(store.list_by_service(service.id, 100).await.unwrap().len(), 3);
}

#[tokio::test]
async fn seed_skips_services_already_present() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let existing = service_in_zones("payments", &["zone-a"]);
    store.insert_service(existing.clone());

    // Same name, different id: the recovered row wins.
    let duplicate = service_in_zones("payments", &["zone-b"]);
    let path = write_seed(dir.path(), &[(duplicate, Vec::new())]);

    let added = load_seed_file(&path, &store).await.unwrap();
    assert_eq!(added, 0);
    assert_eq!(store.get_by_name("payments").await.unwrap().id, existing.id);
}

#[tokio::test]
async fn malformed_seed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.json");
    std::fs::write(&path, b"not json").unwrap();
    let store = MemoryStore::new();
    assert!(load_seed_file(&path, &store).await.is_err());
}
