// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tpd` — the Test Plane control-plane daemon.

use tracing::{error, info};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use tp_daemon::{startup, Config};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tpd: {e}");
            std::process::exit(1);
        }
    };

    let log_dir = config.state_dir.join("logs");
    let appender = tracing_appender::rolling::daily(&log_dir, "tpd.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TP_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(std::io::stderr))
        .with_ansi(false)
        .init();

    let daemon = match startup(config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received"),
        Err(e) => error!(error = %e, "signal handler failed"),
    }
    daemon.shutdown().await;
}
