// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane error taxonomy.
//!
//! Every error surfaced to a submitter or logged at a session boundary maps
//! to one of these kinds. Store and protocol layers keep their own richer
//! error enums and convert at the API edge.

use thiserror::Error;

/// Errors surfaced by the scheduling API and session handlers.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed id, out-of-range priority, missing referenced service.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced run/service/agent does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// State-machine violation (cancel terminal, retry non-terminal,
    /// message before REGISTER).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Dedup violation (duplicate enqueue, duplicate row).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Underlying persistence failure; retryable from the caller's view.
    #[error("store error: {0}")]
    Store(String),

    /// Stream-level violation; terminates the session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Caller or context cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Stable wire code for the submitter response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NotFound(_) => "not_found",
            Error::FailedPrecondition(_) => "failed_precondition",
            Error::AlreadyExists(_) => "already_exists",
            Error::Store(_) => "internal",
            Error::Protocol(_) => "protocol_error",
            Error::Cancelled => "cancelled",
        }
    }
}
