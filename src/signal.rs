//! Signal handling for graceful shutdown.
//!
//! The plugin server runs until SIGTERM or SIGINT arrives, then stops
//! accepting connections and removes its socket.
use tracing::info;

/// Waits until a shutdown signal is received.
///
/// Fails only if the signal handlers cannot be installed.
pub async fn recv_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received ctrl-c");
    }

    Ok(())
}
