//! Session manager: the authoritative registry of admitted peers and their catalogs.
//!
//! Sessions are keyed by username and bound to the control endpoint they were admitted
//! from. Every mutation other than `remove` must arrive from that endpoint; a request
//! from anywhere else is treated as coming from an unknown party. This is trust on first
//! use, not authentication.
//!
//! Liveness is measured in ticks. The host advances the clock with [`SessionManager::tick`]
//! on a fixed timer; admission and heartbeats stamp the current tick.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;

use crate::credentials::CredentialStore;

/// Default number of silent ticks after which a session is considered gone.
pub const DEFAULT_MAX_SILENT_TICKS: u64 = 3;

/// Tracker-side record of one admitted peer.
#[derive(Debug, Clone)]
pub struct PeerSession {
    username: String,
    control_endpoint: SocketAddr,
    transfer_port: Option<u16>,
    last_heartbeat_tick: u64,
    published_files: BTreeSet<String>,
}

impl PeerSession {
    fn new(username: String, control_endpoint: SocketAddr, tick: u64) -> Self {
        Self {
            username,
            control_endpoint,
            transfer_port: None,
            last_heartbeat_tick: tick,
            published_files: BTreeSet::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn control_endpoint(&self) -> SocketAddr {
        self.control_endpoint
    }

    pub fn transfer_port(&self) -> Option<u16> {
        self.transfer_port
    }

    pub fn last_heartbeat_tick(&self) -> u64 {
        self.last_heartbeat_tick
    }

    pub fn published_files(&self) -> &BTreeSet<String> {
        &self.published_files
    }

    /// Where other peers should connect to fetch from this session, once it reported a port.
    pub fn transfer_endpoint(&self) -> Option<SocketAddr> {
        self.transfer_port
            .map(|port| SocketAddr::new(self.control_endpoint.ip(), port))
    }
}

/// Registry of active sessions. Iteration follows admission order, which makes
/// `resolve` pick the earliest-admitted publisher.
pub struct SessionManager {
    credentials: CredentialStore,
    sessions: HashMap<String, PeerSession>,
    admission_order: Vec<String>,
    tick_count: u64,
}

impl SessionManager {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            sessions: HashMap::new(),
            admission_order: Vec::new(),
            tick_count: 0,
        }
    }

    /// Admit `username` from `endpoint`. Failures leave the registry untouched.
    pub fn admit(
        &mut self,
        username: &str,
        password: &str,
        endpoint: SocketAddr,
    ) -> Result<(), AuthError> {
        match self.credentials.password_of(username) {
            None => return Err(AuthError::UnknownUser),
            Some(expected) if expected != password => return Err(AuthError::BadPassword),
            Some(_) => {}
        }
        if self.sessions.contains_key(username) {
            return Err(AuthError::AlreadyActive);
        }
        self.sessions.insert(
            username.to_string(),
            PeerSession::new(username.to_string(), endpoint, self.tick_count),
        );
        self.admission_order.push(username.to_string());
        Ok(())
    }

    /// Refresh liveness. Silently ignored unless the session exists at exactly `endpoint`.
    pub fn record_heartbeat(&mut self, username: &str, endpoint: SocketAddr) {
        let tick = self.tick_count;
        if let Some(session) = self.session_mut(username, endpoint) {
            session.last_heartbeat_tick = tick;
        }
    }

    /// Record the peer's transfer listener port. Same endpoint discipline as heartbeats.
    pub fn set_transfer_port(&mut self, username: &str, endpoint: SocketAddr, port: u16) {
        if let Some(session) = self.session_mut(username, endpoint) {
            session.transfer_port = Some(port);
        }
    }

    /// Add `filename` to the caller's catalog. Re-publishing is a successful no-op.
    pub fn publish(
        &mut self,
        username: &str,
        endpoint: SocketAddr,
        filename: &str,
    ) -> Result<(), PublishError> {
        let session = self
            .session_mut(username, endpoint)
            .ok_or(PublishError::UnknownPeer)?;
        session.published_files.insert(filename.to_string());
        Ok(())
    }

    pub fn unpublish(
        &mut self,
        username: &str,
        endpoint: SocketAddr,
        filename: &str,
    ) -> Result<(), UnpublishError> {
        let session = self
            .session_mut(username, endpoint)
            .ok_or(UnpublishError::UnknownPeer)?;
        if session.published_files.remove(filename) {
            Ok(())
        } else {
            Err(UnpublishError::FileNotPublished)
        }
    }

    /// Find a publisher of `filename` other than the requester.
    ///
    /// The earliest-admitted candidate is chosen. If it has not reported a transfer port
    /// yet the answer is `None`; later candidates are not consulted.
    pub fn resolve(&self, filename: &str, requester: SocketAddr) -> Option<SocketAddr> {
        self.iter()
            .find(|s| s.control_endpoint != requester && s.published_files.contains(filename))
            .and_then(PeerSession::transfer_endpoint)
    }

    /// Every filename of every other peer containing `substring` (case-sensitive, literal).
    /// Names published by several peers are listed once per peer.
    pub fn search(&self, substring: &str, requester: SocketAddr) -> Vec<String> {
        self.iter()
            .filter(|s| s.control_endpoint != requester)
            .flat_map(|s| s.published_files.iter())
            .filter(|name| name.contains(substring))
            .cloned()
            .collect()
    }

    /// All admitted usernames, requester included.
    pub fn list_active_peers(&self) -> Vec<String> {
        self.admission_order.clone()
    }

    /// Total number of catalog entries and the flattened listing.
    pub fn list_published_files(&self) -> (usize, Vec<String>) {
        let files: Vec<String> = self
            .iter()
            .flat_map(|s| s.published_files.iter().cloned())
            .collect();
        (files.len(), files)
    }

    /// Drop the session if present.
    pub fn remove(&mut self, username: &str) {
        if self.sessions.remove(username).is_some() {
            self.admission_order.retain(|u| u != username);
        }
    }

    /// Username of the session admitted from `endpoint`, if any.
    pub fn username_at(&self, endpoint: SocketAddr) -> Option<&str> {
        self.iter()
            .find(|s| s.control_endpoint == endpoint)
            .map(PeerSession::username)
    }

    pub fn get(&self, username: &str) -> Option<&PeerSession> {
        self.sessions.get(username)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Advance the liveness clock by one tick.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.saturating_add(1);
    }

    /// Remove sessions silent for more than `max_silent_ticks`. Returns the evicted usernames.
    pub fn evict_stale(&mut self, max_silent_ticks: u64) -> Vec<String> {
        let now = self.tick_count;
        let stale: Vec<String> = self
            .iter()
            .filter(|s| now.saturating_sub(s.last_heartbeat_tick) > max_silent_ticks)
            .map(|s| s.username.clone())
            .collect();
        for username in &stale {
            self.remove(username);
        }
        stale
    }

    fn iter(&self) -> impl Iterator<Item = &PeerSession> {
        self.admission_order
            .iter()
            .filter_map(|u| self.sessions.get(u))
    }

    fn session_mut(&mut self, username: &str, endpoint: SocketAddr) -> Option<&mut PeerSession> {
        self.sessions
            .get_mut(username)
            .filter(|s| s.control_endpoint == endpoint)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("unknown username")]
    UnknownUser,
    #[error("bad password")]
    BadPassword,
    #[error("user is already active")]
    AlreadyActive,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("unknown peer")]
    UnknownPeer,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnpublishError {
    #[error("unknown peer")]
    UnknownPeer,
    #[error("file not published")]
    FileNotPublished,
}
