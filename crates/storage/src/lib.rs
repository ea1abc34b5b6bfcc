// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tp-storage: repository ports and their backing stores.
//!
//! The scheduler core depends only on the narrow port traits in [`ports`];
//! any durable store with single-writer read-your-writes semantics can sit
//! behind them. [`MemoryStore`] is the canonical implementation, durable
//! across restarts via [`snapshot`].

mod error;
mod memory;
pub mod ports;
pub mod snapshot;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use ports::{AgentStore, RunStore, ServiceStore, ShardStore, Stores, TestStore};
pub use snapshot::{load_snapshot, save_snapshot, Snapshot, CURRENT_SNAPSHOT_VERSION};
