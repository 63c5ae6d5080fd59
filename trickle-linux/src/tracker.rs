//! Tracker host: UDP receive loop and liveness sweep around the shared registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use trickle_core::command::MAX_DATAGRAM_LEN;
use trickle_core::Tracker;

/// Serve the control plane on `socket` until an I/O error. Every request and every sweep
/// takes the tracker lock, so registry mutations never interleave.
pub async fn run_tracker(
    socket: UdpSocket,
    tracker: Arc<Mutex<Tracker>>,
    sweep_interval: Duration,
) -> std::io::Result<()> {
    let socket = Arc::new(socket);
    info!(addr = %socket.local_addr()?, "tracker listening");

    let sweep_tracker = tracker.clone();
    let mut sweep_task =
        tokio::spawn(async move { sweep_loop(sweep_tracker, sweep_interval).await });
    let mut recv_task = tokio::spawn(async move { recv_loop(socket, tracker).await });

    let result = tokio::select! {
        r = &mut recv_task => r.map_err(std::io::Error::other),
        r = &mut sweep_task => r.map_err(std::io::Error::other),
    };
    recv_task.abort();
    sweep_task.abort();
    result?
}

async fn recv_loop(socket: Arc<UdpSocket>, tracker: Arc<Mutex<Tracker>>) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let reply = handle_datagram(&tracker, from, &buf[..n]).await;
        if let Some(reply) = reply {
            if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
                warn!(%from, error = %e, "failed to send reply");
            }
        }
    }
}

async fn handle_datagram(
    tracker: &Mutex<Tracker>,
    from: SocketAddr,
    bytes: &[u8],
) -> Option<String> {
    let mut t = tracker.lock().await;
    match t.on_datagram(from, bytes) {
        Ok(handled) => {
            debug_assert_eq!(handled.reply.is_some(), handled.request.expects_reply());
            debug!(%from, verb = handled.request.verb(), replied = handled.reply.is_some(), "handled request");
            match &handled.request {
                trickle_core::Request::Authenticate { username, .. } => {
                    info!(%from, %username, outcome = handled.reply.as_deref().unwrap_or(""), "authentication attempt");
                }
                trickle_core::Request::Disconnect { username } => {
                    info!(%from, %username, "peer disconnected");
                }
                _ => {}
            }
            handled.reply
        }
        Err(e) => {
            warn!(%from, error = %e, "dropping malformed request");
            None
        }
    }
}

async fn sweep_loop(tracker: Arc<Mutex<Tracker>>, interval: Duration) -> std::io::Result<()> {
    loop {
        tokio::time::sleep(interval).await;
        let evicted = tracker.lock().await.tick();
        for username in evicted {
            info!(%username, "evicted peer after missed heartbeats");
        }
    }
}
