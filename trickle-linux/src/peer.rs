//! Peer host: drives a [`PeerAgent`] over a UDP socket to the tracker, runs the heartbeat
//! task and the transfer listener while the session is active.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trickle_core::command::{self, Location, MAX_DATAGRAM_LEN};
use trickle_core::{encode_request, AgentError, PeerAgent, ReplyError, Request};

use crate::config::Config;
use crate::transfer::{self, TransferError};

/// Runtime knobs for one peer, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    pub share_dir: PathBuf,
    pub download_dir: PathBuf,
}

impl From<&Config> for PeerSettings {
    fn from(c: &Config) -> Self {
        Self {
            heartbeat_interval: c.heartbeat_interval(),
            request_timeout: c.request_timeout(),
            share_dir: c.share_dir.clone(),
            download_dir: c.download_dir.clone(),
        }
    }
}

/// A connected peer. Dropping it stops the background tasks without notifying the tracker;
/// call [`PeerClient::disconnect`] for a clean exit.
pub struct PeerClient {
    agent: PeerAgent,
    socket: Arc<UdpSocket>,
    settings: PeerSettings,
    transfer_port: u16,
    listener: Option<TcpListener>,
    tasks: Vec<JoinHandle<()>>,
}

impl PeerClient {
    /// Bind the control socket and the transfer listener. Nothing is sent yet.
    pub async fn connect(tracker: SocketAddr, settings: PeerSettings) -> Result<Self, PeerError> {
        let unspecified = if tracker.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(unspecified).await?;
        socket.connect(tracker).await?;
        let listener = TcpListener::bind(unspecified).await?;
        let transfer_port = listener.local_addr()?.port();
        debug!(%tracker, transfer_port, "peer sockets bound");
        Ok(Self {
            agent: PeerAgent::new(transfer_port),
            socket: Arc::new(socket),
            settings,
            transfer_port,
            listener: Some(listener),
            tasks: Vec::new(),
        })
    }

    pub fn agent(&self) -> &PeerAgent {
        &self.agent
    }

    pub fn transfer_port(&self) -> u16 {
        self.transfer_port
    }

    /// Authenticate with the tracker. On success reports the transfer port and starts the
    /// heartbeat and transfer listener. Returns the tracker's reply text either way.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<String, PeerError> {
        let request = self.agent.authenticate(username, password)?;
        let reply = self.request(&request).await?;
        let report = match self.agent.on_authenticate_reply(username, &reply) {
            Ok(report) => report,
            Err(AgentError::Rejected(_)) => return Ok(reply),
            Err(e) => return Err(e.into()),
        };
        self.send(&report).await?;
        info!(%username, "authenticated with tracker");
        self.start_background()?;
        Ok(reply)
    }

    fn start_background(&mut self) -> Result<(), PeerError> {
        let heartbeat = encode_request(&self.agent.heartbeat()?);
        let socket = self.socket.clone();
        let interval = self.settings.heartbeat_interval;
        self.tasks.push(tokio::spawn(async move {
            loop {
                if let Err(e) = socket.send(&heartbeat).await {
                    warn!(error = %e, "heartbeat send failed");
                }
                tokio::time::sleep(interval).await;
            }
        }));

        if let Some(listener) = self.listener.take() {
            let share_dir = self.settings.share_dir.clone();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = transfer::run_listener(listener, share_dir).await {
                    warn!(error = %e, "transfer listener stopped");
                }
            }));
        }
        Ok(())
    }

    /// Publish a file. Already-published names are rejected locally.
    pub async fn publish(&mut self, filename: &str) -> Result<(), PeerError> {
        let request = self.agent.begin_publish(filename)?;
        let reply = self.request(&request).await?;
        Ok(self.agent.on_publish_reply(filename, &reply)?)
    }

    pub async fn unpublish(&mut self, filename: &str) -> Result<(), PeerError> {
        let request = self.agent.begin_unpublish(filename)?;
        let reply = self.request(&request).await?;
        Ok(self.agent.on_unpublish_reply(filename, &reply)?)
    }

    /// Ask the tracker where `filename` can be fetched from.
    pub async fn locate(&self, filename: &str) -> Result<Location, PeerError> {
        let request = self.agent.query(Request::Get {
            filename: filename.to_string(),
        })?;
        let reply = self.request(&request).await?;
        Ok(command::parse_location(filename, &reply)?)
    }

    /// Locate and download `filename` into the download directory. Returns bytes received.
    pub async fn download(&self, filename: &str) -> Result<u64, PeerError> {
        let addr = match self.locate(filename).await? {
            Location::Available(addr) => addr,
            Location::NotFound => return Err(PeerError::NotFound(filename.to_string())),
        };
        self.fetch(addr, filename).await
    }

    /// Download `filename` straight from the publisher at `addr`.
    pub async fn fetch(&self, addr: SocketAddr, filename: &str) -> Result<u64, PeerError> {
        let dest = transfer::shared_path(&self.settings.download_dir, filename)
            .ok_or_else(|| PeerError::InvalidName(filename.to_string()))?;
        info!(%addr, %filename, "downloading");
        Ok(transfer::download(addr, filename, &dest).await?)
    }

    pub async fn search(&self, substring: &str) -> Result<Vec<String>, PeerError> {
        let request = self.agent.query(Request::Search {
            substring: substring.to_string(),
        })?;
        let reply = self.request(&request).await?;
        Ok(command::parse_search(&reply))
    }

    /// Other active peers; own username is left out.
    pub async fn list_active_peers(&self) -> Result<Vec<String>, PeerError> {
        let request = self.agent.query(Request::ListActivePeers)?;
        let reply = self.request(&request).await?;
        Ok(self.agent.without_self(command::parse_active_peers(&reply)))
    }

    /// Tracker's `lpf` listing, as text.
    pub async fn list_published_files(&self) -> Result<String, PeerError> {
        let request = self.agent.query(Request::ListPublishedFiles)?;
        self.request(&request).await
    }

    /// Tell the tracker we are leaving and close the sockets. Stopping the listener task also
    /// cuts off any upload still in flight.
    pub async fn disconnect(mut self) -> Result<(), PeerError> {
        let request = self.agent.disconnect()?;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.send(&request).await?;
        info!("disconnected from tracker");
        Ok(())
    }

    async fn send(&self, request: &Request) -> Result<(), PeerError> {
        self.socket.send(&encode_request(request)).await?;
        Ok(())
    }

    /// One request, one reply. The wait is bounded; nothing is retried. Replies to earlier
    /// requests that timed out are dropped, whether already queued or arriving while we wait.
    async fn request(&self, request: &Request) -> Result<String, PeerError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        self.discard_queued(&mut buf);
        self.send(request).await?;
        let deadline = tokio::time::Instant::now() + self.settings.request_timeout;
        loop {
            let n = tokio::time::timeout_at(deadline, self.socket.recv(&mut buf))
                .await
                .map_err(|_| PeerError::Timeout(request.verb()))??;
            let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
            if request.accepts_reply(&reply) {
                return Ok(reply);
            }
            debug!(verb = request.verb(), %reply, "dropping reply to an earlier request");
        }
    }

    fn discard_queued(&self, buf: &mut [u8]) {
        loop {
            match self.socket.try_recv(buf) {
                Ok(n) => debug!(bytes = n, "dropping stale reply"),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "stale socket error");
                    break;
                }
            }
        }
    }
}

impl Drop for PeerClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no reply from tracker to {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Reply(#[from] ReplyError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("{0} not found.")]
    NotFound(String),
    #[error("invalid file name {0:?}")]
    InvalidName(String),
}
