// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler error type.

use thiserror::Error;
use tp_core::RunId;
use tp_storage::StoreError;
use tp_wire::ProtocolError;

/// Errors from the scheduler core and session runtime.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Dedup violation: the run already has a queued work item.
    #[error("run {0} is already queued")]
    AlreadyQueued(RunId),

    /// The run has no queued work item.
    #[error("run {0} is not queued")]
    NotQueued(RunId),

    /// Double start of the background loop.
    #[error("scheduler loop already running")]
    AlreadyRunning,

    /// A message arrived before REGISTER.
    #[error("agent not registered")]
    NotRegistered,

    #[error("invalid agent id: {0:?}")]
    InvalidAgentId(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SchedulerError> for tp_core::Error {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::AlreadyQueued(id) => {
                tp_core::Error::AlreadyExists(format!("run {id} is already queued"))
            }
            SchedulerError::NotQueued(id) => tp_core::Error::NotFound(format!("run {id}")),
            SchedulerError::AlreadyRunning => {
                tp_core::Error::FailedPrecondition("scheduler loop already running".into())
            }
            SchedulerError::NotRegistered => {
                tp_core::Error::FailedPrecondition("agent not registered".into())
            }
            SchedulerError::InvalidAgentId(id) => {
                tp_core::Error::InvalidArgument(format!("invalid agent id: {id:?}"))
            }
            SchedulerError::Protocol(err) => tp_core::Error::Protocol(err.to_string()),
            SchedulerError::Store(StoreError::NotFound(what)) => tp_core::Error::NotFound(what),
            SchedulerError::Store(StoreError::Conflict(what)) => {
                tp_core::Error::FailedPrecondition(what)
            }
            SchedulerError::Store(err) => tp_core::Error::Store(err.to_string()),
        }
    }
}
