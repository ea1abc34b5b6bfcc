// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for other crates' tests. Gated behind the `test-support`
//! feature so production builds never see them.

use crate::agent::AgentCapabilities;
use crate::id::ServiceId;
use crate::service::Service;
use crate::test_def::TestDefinition;

/// A service with the given zones.
pub fn service_in_zones(name: &str, zones: &[&str]) -> Service {
    Service {
        id: ServiceId::new(),
        name: name.to_string(),
        git_url: format!("https://git.example.com/{name}.git"),
        default_branch: "main".to_string(),
        zones: zones.iter().map(|z| z.to_string()).collect(),
        contact: None,
        owner: None,
    }
}

/// Capabilities with the given parallelism and zones, docker enabled.
pub fn capabilities(max_parallel: u32, zones: &[&str]) -> AgentCapabilities {
    AgentCapabilities {
        max_parallel,
        zones: zones.iter().map(|z| z.to_string()).collect(),
        docker_available: true,
    }
}

/// N stub test definitions for one service, named test-0..test-N.
pub fn test_defs(service_id: ServiceId, n: usize) -> Vec<TestDefinition> {
    (0..n).map(|i| TestDefinition::stub(service_id, &format!("test-{i}"))).collect()
}
