// BitTrickle tracker: `trickle-tracker <port>`.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::UdpSocket;
use tracing::info;
use trickle_core::{CredentialStore, Tracker};
use trickle_linux::{config, tracker};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let Some(port) = trickle_linux::parse_port_arg(std::env::args().skip(1), "trickle-tracker <port>")?
    else {
        println!("trickle-tracker {}", VERSION);
        return Ok(());
    };
    trickle_linux::init_tracing();
    let cfg = config::load();

    let path = &cfg.credentials_path;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading credentials from {}", path.display()))?;
    let credentials = CredentialStore::parse(&text)
        .with_context(|| format!("parsing credentials in {}", path.display()))?;
    info!(users = credentials.len(), "credentials loaded");

    let mut core = Tracker::new(credentials);
    core.set_eviction(cfg.max_silent_ticks());
    let core = Arc::new(tokio::sync::Mutex::new(core));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let socket = UdpSocket::bind((cfg.tracker_host.as_str(), port))
            .await
            .with_context(|| format!("binding {}:{}", cfg.tracker_host, port))?;
        tokio::select! {
            r = tracker::run_tracker(socket, core, cfg.heartbeat_interval()) => r?,
            r = trickle_linux::shutdown_signal() => {
                r?;
                info!("shutting down");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
