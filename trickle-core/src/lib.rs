//! BitTrickle tracker and peer-agent logic.
//! Host-driven: no I/O; the host feeds datagrams and replies in and sends what comes back out.

pub mod agent;
pub mod command;
pub mod credentials;
pub mod session;
pub mod tracker;

pub use agent::{AgentError, AgentState, PeerAgent};
pub use command::{decode_request, encode_request, Location, ProtocolError, ReplyError, Request};
pub use credentials::{CredentialError, CredentialStore};
pub use session::{AuthError, PeerSession, PublishError, SessionManager, UnpublishError};
pub use tracker::{Handled, Tracker};
