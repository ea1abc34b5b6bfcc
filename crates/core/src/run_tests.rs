// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;

fn config() -> RunConfig {
    RunConfig {
        service_id: ServiceId::from_string("svc-a"),
        git_ref: GitRef { url: "https://git.example.com/a.git".into(), branch: None, sha: None },
        priority: 5,
        trigger: TriggerKind::Webhook,
        triggered_by: Some("push".into()),
        shard_count: 4,
        max_parallel: 2,
    }
}

#[test]
fn new_run_is_pending() {
    let clock = FakeClock::new();
    let run = Run::new(config(), &clock);
    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.started_at.is_none());
    assert_eq!(run.created_at, clock.utc());
    assert_eq!(run.shard_count, 4);
}

#[test]
fn zero_shard_count_clamps_to_one() {
    let clock = FakeClock::new();
    let mut cfg = config();
    cfg.shard_count = 0;
    let run = Run::new(cfg, &clock);
    assert_eq!(run.shard_count, 1);
}

#[yare::parameterized(
    pending = { RunStatus::Pending, false },
    running = { RunStatus::Running, false },
    passed = { RunStatus::Passed, true },
    failed = { RunStatus::Failed, true },
    error = { RunStatus::Error, true },
    timeout = { RunStatus::Timeout, true },
    cancelled = { RunStatus::Cancelled, true },
)]
fn terminal_statuses(status: RunStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn counts_merge_accumulates() {
    let mut a = CaseCounts { total: 5, passed: 5, failed: 0, skipped: 0 };
    let b = CaseCounts { total: 3, passed: 2, failed: 1, skipped: 0 };
    a.merge(&b);
    assert_eq!(a, CaseCounts { total: 8, passed: 7, failed: 1, skipped: 0 });
}

#[test]
fn status_labels_match_the_serde_form() {
    let json = serde_json::to_string(&RunStatus::Cancelled).unwrap();
    assert_eq!(json, "\"cancelled\"");
    assert_eq!(RunStatus::Cancelled.label(), "cancelled");
    assert_eq!(RunStatus::Running.to_string(), "running");
    assert_eq!(TriggerKind::Webhook.label(), "webhook");
}
