// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service record and network-zone matching.

use crate::id::ServiceId;
use serde::{Deserialize, Serialize};

/// A service whose tests the control plane schedules. Read-only from the
/// scheduler's point of view; ownership lives with the CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    /// Unique human-readable name.
    pub name: String,
    pub git_url: String,
    pub default_branch: String,
    /// Network zones whose agents may execute this service's runs.
    /// Empty means "any zone".
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Zone-constraint match: an empty set on either side means "any"; otherwise
/// the sets must intersect. Symmetric in its arguments.
pub fn zones_match(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter().any(|zone| b.contains(zone))
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
