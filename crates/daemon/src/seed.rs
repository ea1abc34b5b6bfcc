// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seed file loading.
//!
//! Service and test-definition CRUD is an external collaborator; until it
//! runs, `TP_SEED_FILE` gives operators a way to load a service catalog
//! at boot. Services already present (matched by name) are left alone so
//! a seed file can sit alongside a recovered snapshot.

use std::path::Path;

use serde::Deserialize;
use tp_core::{Clock, Service, TestDefinition};
use tp_storage::{MemoryStore, ServiceStore, StoreError};
use tracing::{debug, info};

use crate::startup::DaemonError;

/// One seeded service with its test definitions.
#[derive(Debug, Deserialize)]
struct SeedService {
    service: Service,
    #[serde(default)]
    tests: Vec<TestDefinition>,
}

/// Load a seed file into the store. Returns the number of services added.
pub async fn load_seed_file<C: Clock>(
    path: &Path,
    store: &MemoryStore<C>,
) -> Result<usize, DaemonError> {
    let bytes = std::fs::read(path)?;
    let entries: Vec<SeedService> =
        serde_json::from_slice(&bytes).map_err(|e| DaemonError::Store(StoreError::from(e)))?;

    let mut added = 0;
    for entry in entries {
        match store.get_by_name(&entry.service.name).await {
            Ok(existing) => {
                debug!(service = %existing.name, "seed entry already present, skipping");
            }
            Err(StoreError::NotFound(_)) => {
                let service_id = entry.service.id;
                store.insert_service(entry.service);
                store.insert_tests(service_id, entry.tests);
                added += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(path = %path.display(), added, "seed file loaded");
    Ok(added)
}

#[cfg(test)]
#[path = "seed_tests.rs"]
mod tests;
