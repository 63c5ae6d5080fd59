//! BitTrickle host: tokio sockets, tasks and configuration around `trickle-core`.

pub mod config;
pub mod peer;
pub mod shell;
pub mod tracker;
pub mod transfer;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber: `RUST_LOG` if set, `info` otherwise. Logs go to stderr so
/// the interactive console on stdout stays readable.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parse the single positional port argument shared by both binaries. `Ok(None)` means
/// `--version` was requested.
pub fn parse_port_arg(
    args: impl IntoIterator<Item = String>,
    usage: &str,
) -> anyhow::Result<Option<u16>> {
    let mut port = None;
    for arg in args {
        if arg == "--version" || arg == "-V" {
            return Ok(None);
        }
        if port.is_some() {
            anyhow::bail!("usage: {usage}");
        }
        port = Some(
            arg.parse::<u16>()
                .map_err(|_| anyhow::anyhow!("invalid port {arg:?}; usage: {usage}"))?,
        );
    }
    match port {
        Some(p) => Ok(Some(p)),
        None => anyhow::bail!("usage: {usage}"),
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
