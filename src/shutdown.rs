//! Graceful shutdown on SIGTERM and SIGINT.

use tokio_util::sync::CancellationToken;

/// Install signal handlers and return a token that trips when a shutdown
/// signal arrives. Subsystems clone the token; the settlement watcher uses
/// the same mechanism for teardown.
pub fn shutdown_token() -> Result<CancellationToken, std::io::Error> {
    let token = CancellationToken::new();
    let trip = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => trip.cancel(),
                _ = sigint.recv() => trip.cancel(),
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trip.cancel();
            }
        });
    }

    Ok(token)
}
