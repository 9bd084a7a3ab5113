//! PF Status Relay Daemon
//!
//! Main entry point for the pf-status-relay daemon.

use anyhow::Context;
use pf_status_relay::{
    LinkSubscription, NetlinkHandle, Registry, Relay, RelayConfig, RelayError, SystemdNotifier,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("pf-status-relay: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("pf-status-relay: Starting");

    match run().await {
        Ok(()) => {
            info!("pf-status-relay: Exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "pf-status-relay: Exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Initialize structured logging; `RUST_LOG` overrides the default `info` level.
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set logger")
}

async fn run() -> anyhow::Result<()> {
    let config = RelayConfig::load().context("failed to load configuration")?;
    info!(
        interfaces = ?config.interfaces,
        polling_interval_ms = config.polling_interval_ms,
        "configuration loaded"
    );

    // Install handlers before any task starts so an early signal is not lost.
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    let registry = match Registry::build(&config.interfaces, Arc::new(NetlinkHandle::new())).await {
        Ok(registry) => Arc::new(registry),
        Err(e @ RelayError::NoInterfaces) => {
            error!(interfaces = ?config.interfaces, "no interfaces found in node");
            return Err(e.into());
        }
        Err(e) => return Err(e).context("failed to build interface registry"),
    };

    let events = match LinkSubscription::new() {
        Ok(subscription) => Some(subscription.into_stream()),
        Err(e) => {
            warn!(error = %e, "failed to subscribe to link changes");
            None
        }
    };

    let status = format!("relaying {} interfaces", registry.len());
    let token = CancellationToken::new();
    let relay = Relay::start(registry, config.polling_interval(), events, token).await;

    let notifier = SystemdNotifier::new();
    if let Err(e) = notifier
        .notify_ready()
        .and_then(|()| notifier.notify_status(&status))
    {
        warn!(error = %e, "failed to notify systemd");
    }

    tokio::select! {
        _ = sigterm.recv() => info!("pf-status-relay: Received SIGTERM"),
        _ = sigint.recv() => info!("pf-status-relay: Received SIGINT"),
        _ = relay.wait() => warn!("pf-status-relay: All relay tasks exited"),
    }

    if let Err(e) = notifier.notify_stopping() {
        warn!(error = %e, "failed to notify systemd");
    }

    relay.shutdown().await;
    Ok(())
}
