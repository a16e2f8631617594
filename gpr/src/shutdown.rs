//! Operator interrupt handling.
//!
//! A signal is turned into one message on a broadcast channel. The command
//! runner races the running command against that message and closes the
//! cluster view either way.

use tokio::sync::broadcast;
use tracing::{debug, info};
#[cfg(windows)]
use tracing::warn;

fn request_shutdown(shutdown_tx: &broadcast::Sender<()>) {
    if shutdown_tx.send(()).is_err() {
        debug!(target: "gpr::shutdown", "No command running");
    }
}

#[cfg(unix)]
pub fn install_signal_handlers(
    shutdown_tx: broadcast::Sender<()>,
) -> std::io::Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!(target: "gpr::shutdown", "SIGTERM received, abandoning run");
            }
            _ = sigint.recv() => {
                info!(target: "gpr::shutdown", "SIGINT received, abandoning run");
            }
        }
        request_shutdown(&shutdown_tx);
    })
}

#[cfg(windows)]
pub fn install_signal_handlers(
    shutdown_tx: broadcast::Sender<()>,
) -> std::io::Result<impl std::future::Future<Output = ()>> {
    Ok(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "gpr::shutdown", error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!(target: "gpr::shutdown", "Ctrl+C received, abandoning run");
        request_shutdown(&shutdown_tx);
    })
}
