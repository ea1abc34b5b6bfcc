// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_shard_is_pending_with_test_total() {
    let shard = Shard::new(RunId::from_string("run-x"), 2, 4, 7);
    assert_eq!(shard.status, ShardStatus::Pending);
    assert_eq!(shard.index, 2);
    assert_eq!(shard.of, 4);
    assert_eq!(shard.counts.total, 7);
    assert!(shard.agent_id.is_none());
}

#[yare::parameterized(
    pending = { ShardStatus::Pending, false, false },
    running = { ShardStatus::Running, false, false },
    passed = { ShardStatus::Passed, true, false },
    failed = { ShardStatus::Failed, true, true },
    error = { ShardStatus::Error, true, true },
    cancelled = { ShardStatus::Cancelled, true, true },
)]
fn terminal_and_failure_flags(status: ShardStatus, terminal: bool, failure: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.is_failure(), failure);
}
