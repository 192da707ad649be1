//! Shutdown signal handling.
//!
//! Shutdown is a [`CancellationToken`]: cancelling it stops the accept loop,
//! asks open connections to finish their in-flight request, and closes
//! stream sessions with a normal close frame.

use tokio_util::sync::CancellationToken;

/// Returns a token cancelled on SIGTERM or SIGINT (Ctrl+C elsewhere).
///
/// Must be called from within a Tokio runtime.
///
/// ```rust,ignore
/// let shutdown = dyne_server::shutdown_on_signal();
/// server.run_with_shutdown(shutdown).await?;
/// ```
#[must_use]
pub fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_os_signal().await;
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(err), _) | (_, Err(err)) => {
            tracing::warn!(error = %err, "could not install signal handlers; shutdown must be triggered explicitly");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for Ctrl+C; shutdown must be triggered explicitly");
        return std::future::pending().await;
    }
    tracing::info!("received Ctrl+C, shutting down");
}
