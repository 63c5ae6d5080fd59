//! Host-driven tracker: host passes each inbound datagram, tracker returns the reply to send back.

use std::net::SocketAddr;

use crate::command::{self, decode_request, ProtocolError, Request};
use crate::credentials::CredentialStore;
use crate::session::{AuthError, SessionManager, UnpublishError, DEFAULT_MAX_SILENT_TICKS};

/// Result of one handled datagram: the decoded request and the reply for its sender, if any.
#[derive(Debug)]
pub struct Handled {
    pub request: Request,
    pub reply: Option<String>,
}

/// Control-plane dispatcher over a [`SessionManager`].
pub struct Tracker {
    sessions: SessionManager,
    /// `None` disables liveness eviction.
    max_silent_ticks: Option<u64>,
}

impl Tracker {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            sessions: SessionManager::new(credentials),
            max_silent_ticks: Some(DEFAULT_MAX_SILENT_TICKS),
        }
    }

    /// Set how many sweep ticks a session may stay silent; `None` keeps sessions until disconnect.
    pub fn set_eviction(&mut self, max_silent_ticks: Option<u64>) {
        self.max_silent_ticks = max_silent_ticks;
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Decode and apply one datagram from `from`. Malformed input is returned as an error
    /// and must be dropped without a reply.
    pub fn on_datagram(&mut self, from: SocketAddr, bytes: &[u8]) -> Result<Handled, ProtocolError> {
        let request = decode_request(bytes)?;
        let reply = self.apply(&request, from);
        Ok(Handled { request, reply })
    }

    /// Periodic sweep: advance the liveness clock and evict silent sessions when enabled.
    /// Returns the evicted usernames.
    pub fn tick(&mut self) -> Vec<String> {
        self.sessions.tick();
        match self.max_silent_ticks {
            Some(max) => self.sessions.evict_stale(max),
            None => Vec::new(),
        }
    }

    fn apply(&mut self, request: &Request, from: SocketAddr) -> Option<String> {
        match request {
            Request::Authenticate { username, password } => {
                let reply = match self.sessions.admit(username, password, from) {
                    Ok(()) => command::AUTH_OK,
                    Err(AuthError::UnknownUser) => command::AUTH_UNKNOWN_USER,
                    Err(AuthError::BadPassword) => command::AUTH_BAD_PASSWORD,
                    Err(AuthError::AlreadyActive) => command::AUTH_ALREADY_ACTIVE,
                };
                Some(reply.to_string())
            }
            Request::Heartbeat { username } => {
                self.sessions.record_heartbeat(username, from);
                None
            }
            Request::TcpPort { username, port } => {
                self.sessions.set_transfer_port(username, from, *port);
                None
            }
            Request::Publish { filename } => {
                let result = match self.caller(from) {
                    Some(username) => self.sessions.publish(&username, from, filename).is_ok(),
                    None => false,
                };
                Some(if result {
                    command::publish_ok(filename)
                } else {
                    command::PUBLISH_UNKNOWN_PEER.to_string()
                })
            }
            Request::Unpublish { filename } => {
                let result = match self.caller(from) {
                    Some(username) => self.sessions.unpublish(&username, from, filename),
                    None => Err(UnpublishError::UnknownPeer),
                };
                Some(match result {
                    Ok(()) => command::unpublish_ok(filename),
                    Err(UnpublishError::FileNotPublished) => command::unpublish_not_found(filename),
                    Err(UnpublishError::UnknownPeer) => command::UNPUBLISH_UNKNOWN_PEER.to_string(),
                })
            }
            Request::Get { filename } => Some(match self.sessions.resolve(filename, from) {
                Some(at) => command::located(filename, at),
                None => command::not_found(filename),
            }),
            Request::Search { substring } => {
                let matches = self.sessions.search(substring, from);
                Some(if matches.is_empty() {
                    command::NO_MATCHES.to_string()
                } else {
                    matches.join("\n")
                })
            }
            Request::ListActivePeers => {
                let peers = self.sessions.list_active_peers();
                Some(if peers.is_empty() {
                    command::NO_ACTIVE_PEERS.to_string()
                } else {
                    peers.join("\n")
                })
            }
            Request::ListPublishedFiles => {
                let (total, files) = self.sessions.list_published_files();
                Some(command::published_listing(total, &files))
            }
            Request::Disconnect { username } => {
                self.sessions.remove(username);
                None
            }
        }
    }

    fn caller(&self, from: SocketAddr) -> Option<String> {
        self.sessions.username_at(from).map(str::to_string)
    }
}
