//! Peer agent state machine: Unauthenticated → Active → Disconnected.
//! Produces control requests and consumes tracker replies; the host does the I/O.

use std::collections::BTreeSet;

use crate::command::{self, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Unauthenticated,
    Active { username: String },
    /// Terminal: no re-authentication within the same agent.
    Disconnected,
}

/// Client-side session: identity, transfer port and the local mirror of published names.
#[derive(Debug)]
pub struct PeerAgent {
    state: AgentState,
    transfer_port: u16,
    published: BTreeSet<String>,
}

impl PeerAgent {
    pub fn new(transfer_port: u16) -> Self {
        Self {
            state: AgentState::Unauthenticated,
            transfer_port,
            published: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn username(&self) -> Option<&str> {
        match &self.state {
            AgentState::Active { username } => Some(username.as_str()),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, AgentState::Active { .. })
    }

    pub fn published(&self) -> &BTreeSet<String> {
        &self.published
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<Request, AgentError> {
        match self.state {
            AgentState::Unauthenticated => Ok(Request::Authenticate {
                username: username.to_string(),
                password: password.to_string(),
            }),
            AgentState::Active { .. } => Err(AgentError::AlreadyActive),
            AgentState::Disconnected => Err(AgentError::NotActive),
        }
    }

    /// Apply the tracker's answer to `authenticate`. On success the agent becomes active and
    /// returns the transfer-port report to send next.
    pub fn on_authenticate_reply(
        &mut self,
        username: &str,
        reply: &str,
    ) -> Result<Request, AgentError> {
        if self.state != AgentState::Unauthenticated {
            return Err(AgentError::NotActive);
        }
        if reply.trim_end() != command::AUTH_OK {
            return Err(AgentError::Rejected(reply.to_string()));
        }
        self.state = AgentState::Active {
            username: username.to_string(),
        };
        Ok(Request::TcpPort {
            username: username.to_string(),
            port: self.transfer_port,
        })
    }

    pub fn heartbeat(&self) -> Result<Request, AgentError> {
        Ok(Request::Heartbeat {
            username: self.active_username()?.to_string(),
        })
    }

    /// Publish request, or `AlreadyPublished` without any network traffic.
    pub fn begin_publish(&self, filename: &str) -> Result<Request, AgentError> {
        self.active_username()?;
        if self.published.contains(filename) {
            return Err(AgentError::AlreadyPublished(filename.to_string()));
        }
        Ok(Request::Publish {
            filename: filename.to_string(),
        })
    }

    /// The mirror only changes on an affirmative reply.
    pub fn on_publish_reply(&mut self, filename: &str, reply: &str) -> Result<(), AgentError> {
        if reply.trim_end() == command::publish_ok(filename) {
            self.published.insert(filename.to_string());
            Ok(())
        } else {
            Err(AgentError::Rejected(reply.to_string()))
        }
    }

    pub fn begin_unpublish(&self, filename: &str) -> Result<Request, AgentError> {
        self.active_username()?;
        if !self.published.contains(filename) {
            return Err(AgentError::NotPublished(filename.to_string()));
        }
        Ok(Request::Unpublish {
            filename: filename.to_string(),
        })
    }

    pub fn on_unpublish_reply(&mut self, filename: &str, reply: &str) -> Result<(), AgentError> {
        if reply.trim_end() == command::unpublish_ok(filename) {
            self.published.remove(filename);
            Ok(())
        } else {
            Err(AgentError::Rejected(reply.to_string()))
        }
    }

    /// Requests that only need an active session (`get`, `sch`, `laps`, `lpf`).
    pub fn query(&self, request: Request) -> Result<Request, AgentError> {
        self.active_username()?;
        Ok(request)
    }

    /// Drop own username from a `laps` listing.
    pub fn without_self(&self, mut peers: Vec<String>) -> Vec<String> {
        if let Some(me) = self.username() {
            peers.retain(|p| p != me);
        }
        peers
    }

    /// Leave the active state for good, returning the disconnect notice for the tracker.
    pub fn disconnect(&mut self) -> Result<Request, AgentError> {
        let username = self.active_username()?.to_string();
        self.state = AgentState::Disconnected;
        Ok(Request::Disconnect { username })
    }

    fn active_username(&self) -> Result<&str, AgentError> {
        self.username().ok_or(AgentError::NotActive)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("not connected to the tracker")]
    NotActive,
    #[error("already authenticated")]
    AlreadyActive,
    #[error("{0} is already published.")]
    AlreadyPublished(String),
    #[error("You have not published a file named {0}.")]
    NotPublished(String),
    #[error("{0}")]
    Rejected(String),
}
