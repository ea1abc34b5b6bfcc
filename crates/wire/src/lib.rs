// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the control plane.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Two
//! message sets share the framing: the submitter request/response surface
//! and the long-lived agent session stream.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent;
mod framing;
mod submit;

pub use agent::{
    AgentMessage, AssignWork, ResultPayload, RunSummary, ServerMessage, TestSpec, WireAgentStatus,
    WireRunStatus,
};
pub use framing::{
    decode, encode, read_frame, read_frame_timeout, read_message, write_frame, write_message,
    ProtocolError, MAX_FRAME_LEN,
};
pub use submit::{SubmitRequest, SubmitResponse};
