// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error type.

use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write lost a state-machine race: terminal status is write-once,
    /// and pending→running admits exactly one winner.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persisted bytes failed to decode.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}
