//! OS termination signals.
//!
//! SIGINT and SIGTERM both request a graceful shutdown of the orchestrator.

use tokio::signal::unix::{signal, SignalKind};

/// Resolve once the process receives SIGINT or SIGTERM.
///
/// Returns the name of the signal that arrived. Fails only if the signal
/// handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    Ok(name)
}
