// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener tasks for the two endpoints.
//!
//! Submitter connections are one request/response exchange each. Agent
//! connections upgrade into long-lived sessions driven by the session
//! hub. Accept loops run until the daemon's cancellation token fires.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tp_core::SystemClock;
use tp_sched::{Scheduler, SchedulerError, SessionHub};
use tp_wire::{read_frame_timeout, write_frame, ProtocolError, SubmitRequest};
use tracing::{debug, error, info, warn};

use crate::env;

/// Accept loops for submitter and agent endpoints.
pub struct Listener {
    submit_unix: UnixListener,
    submit_tcp: Option<TcpListener>,
    agent_tcp: TcpListener,
    scheduler: Arc<Scheduler<SystemClock>>,
    hub: Arc<SessionHub<SystemClock>>,
    token: CancellationToken,
}

impl Listener {
    pub fn new(
        submit_unix: UnixListener,
        submit_tcp: Option<TcpListener>,
        agent_tcp: TcpListener,
        scheduler: Arc<Scheduler<SystemClock>>,
        hub: Arc<SessionHub<SystemClock>>,
        token: CancellationToken,
    ) -> Self {
        Self { submit_unix, submit_tcp, agent_tcp, scheduler, hub, token }
    }

    /// Run all accept loops until cancellation.
    pub async fn run(self) {
        let Listener { submit_unix, submit_tcp, agent_tcp, scheduler, hub, token } = self;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                result = submit_unix.accept() => match result {
                    Ok((stream, _)) => spawn_submit(stream, scheduler.clone()),
                    Err(e) => error!(error = %e, "unix accept error"),
                },
                result = accept_optional(&submit_tcp) => match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "submitter connection");
                        spawn_submit(stream, scheduler.clone());
                    }
                    Err(e) => error!(error = %e, "submit tcp accept error"),
                },
                result = agent_tcp.accept() => match result {
                    Ok((stream, addr)) => {
                        info!(%addr, "agent connection");
                        let hub = hub.clone();
                        tokio::spawn(async move {
                            if let Err(e) = hub.run_session(stream).await {
                                log_session_error(e);
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "agent accept error"),
                },
            }
        }
        info!("listener stopped");
    }
}

/// Accept on an optional listener; pends forever when absent so the
/// select arm never fires.
async fn accept_optional(
    listener: &Option<TcpListener>,
) -> std::io::Result<(tokio::net::TcpStream, std::net::SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

fn spawn_submit<S>(stream: S, scheduler: Arc<Scheduler<SystemClock>>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = handle_submit(stream, scheduler).await {
            match e {
                ProtocolError::ConnectionClosed => debug!("submitter disconnected"),
                ProtocolError::Timeout => warn!("submitter request timed out"),
                other => error!(error = %other, "submitter connection error"),
            }
        }
    });
}

/// One request, one response, then the connection closes.
async fn handle_submit<S>(
    mut stream: S,
    scheduler: Arc<Scheduler<SystemClock>>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let request: SubmitRequest = read_frame_timeout(&mut stream, env::ipc_timeout()).await?;
    debug!(request = ?request, "submit request");
    let response = scheduler.handle(request).await;
    write_frame(&mut stream, &response).await
}

fn log_session_error(e: SchedulerError) {
    match e {
        SchedulerError::Protocol(ProtocolError::ConnectionClosed) => debug!("agent disconnected"),
        SchedulerError::Protocol(ProtocolError::Timeout) => {
            warn!("agent register timed out")
        }
        SchedulerError::NotRegistered => warn!("agent spoke before REGISTER"),
        other => error!(error = %other, "agent session error"),
    }
}
