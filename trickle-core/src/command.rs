//! Control-plane commands: one UTF-8 datagram per request, one per reply.
//! Requests are a verb followed by space-separated arguments; replies are plain text.

use std::fmt;
use std::net::SocketAddr;

/// Largest UDP payload; both sides receive into buffers of this size.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

pub const AUTH_OK: &str = "Authentication successful.";
pub const AUTH_UNKNOWN_USER: &str = "Authentication failed: Unknown username.";
pub const AUTH_BAD_PASSWORD: &str = "Authentication failed. Please try again.";
pub const AUTH_ALREADY_ACTIVE: &str = "Authentication failed: User is already active.";
pub const PUBLISH_UNKNOWN_PEER: &str = "Failed to publish file: Unknown peer.";
pub const UNPUBLISH_UNKNOWN_PEER: &str = "Failed to unpublish file: Unknown peer.";
pub const NO_MATCHES: &str = "No files found matching.";
pub const NO_ACTIVE_PEERS: &str = "No active peers.";
pub const NO_PUBLISHED_FILES: &str = "No published files.";

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Authenticate { username: String, password: String },
    Heartbeat { username: String },
    TcpPort { username: String, port: u16 },
    Publish { filename: String },
    Unpublish { filename: String },
    Get { filename: String },
    Search { substring: String },
    ListActivePeers,
    ListPublishedFiles,
    Disconnect { username: String },
}

impl Request {
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Authenticate { .. } => "authenticate",
            Request::Heartbeat { .. } => "heartbeat",
            Request::TcpPort { .. } => "tcp_port",
            Request::Publish { .. } => "pub",
            Request::Unpublish { .. } => "unp",
            Request::Get { .. } => "get",
            Request::Search { .. } => "sch",
            Request::ListActivePeers => "laps",
            Request::ListPublishedFiles => "lpf",
            Request::Disconnect { .. } => "disconnect",
        }
    }

    /// Whether the tracker answers this request with a datagram.
    pub fn expects_reply(&self) -> bool {
        !matches!(
            self,
            Request::Heartbeat { .. } | Request::TcpPort { .. } | Request::Disconnect { .. }
        )
    }

    /// Whether `reply` has the shape of an answer to this request. Replies carry no request id,
    /// so a late answer to an earlier request is told apart by its text. Filenames and usernames
    /// never contain whitespace, which leaves `sch` and `laps` listings as the only overlap.
    pub fn accepts_reply(&self, reply: &str) -> bool {
        match self {
            Request::Authenticate { .. } => [
                AUTH_OK,
                AUTH_UNKNOWN_USER,
                AUTH_BAD_PASSWORD,
                AUTH_ALREADY_ACTIVE,
            ]
            .contains(&reply),
            Request::Publish { filename } => {
                reply == publish_ok(filename) || reply == PUBLISH_UNKNOWN_PEER
            }
            Request::Unpublish { filename } => {
                reply == unpublish_ok(filename)
                    || reply == unpublish_not_found(filename)
                    || reply == UNPUBLISH_UNKNOWN_PEER
            }
            Request::Get { filename } => {
                !matches!(parse_location(filename, reply), Err(ReplyError::Unexpected(_)))
            }
            Request::Search { .. } => reply == NO_MATCHES || is_token_list(reply),
            Request::ListActivePeers => reply == NO_ACTIVE_PEERS || is_token_list(reply),
            Request::ListPublishedFiles => reply
                .split_once(" published files:\n")
                .is_some_and(|(count, _)| count.parse::<usize>().is_ok()),
            Request::Heartbeat { .. } | Request::TcpPort { .. } | Request::Disconnect { .. } => {
                false
            }
        }
    }
}

fn is_token_list(reply: &str) -> bool {
    !reply.is_empty() && reply.lines().all(|l| !l.is_empty() && !l.contains(char::is_whitespace))
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Authenticate { username, password } => {
                write!(f, "{} {} {}", self.verb(), username, password)
            }
            Request::TcpPort { username, port } => write!(f, "{} {} {}", self.verb(), username, port),
            Request::Heartbeat { username } | Request::Disconnect { username } => {
                write!(f, "{} {}", self.verb(), username)
            }
            Request::Publish { filename }
            | Request::Unpublish { filename }
            | Request::Get { filename } => write!(f, "{} {}", self.verb(), filename),
            Request::Search { substring } => write!(f, "{} {}", self.verb(), substring),
            Request::ListActivePeers | Request::ListPublishedFiles => f.write_str(self.verb()),
        }
    }
}

/// Encode a request into datagram bytes.
pub fn encode_request(request: &Request) -> Vec<u8> {
    request.to_string().into_bytes()
}

/// Decode one datagram. Argument counts are exact; extra or missing arguments are rejected.
pub fn decode_request(bytes: &[u8]) -> Result<Request, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    let parts: Vec<&str> = text.split_whitespace().collect();
    let Some((&verb, args)) = parts.split_first() else {
        return Err(ProtocolError::Empty);
    };
    let arity = |expected: usize| -> Result<(), ProtocolError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ProtocolError::WrongArity {
                verb: verb.to_string(),
                expected,
                got: args.len(),
            })
        }
    };
    let request = match verb {
        "authenticate" => {
            arity(2)?;
            Request::Authenticate {
                username: args[0].to_string(),
                password: args[1].to_string(),
            }
        }
        "heartbeat" => {
            arity(1)?;
            Request::Heartbeat {
                username: args[0].to_string(),
            }
        }
        "tcp_port" => {
            arity(2)?;
            let port = args[1]
                .parse::<u16>()
                .map_err(|_| ProtocolError::InvalidPort(args[1].to_string()))?;
            Request::TcpPort {
                username: args[0].to_string(),
                port,
            }
        }
        "pub" => {
            arity(1)?;
            Request::Publish {
                filename: args[0].to_string(),
            }
        }
        "unp" => {
            arity(1)?;
            Request::Unpublish {
                filename: args[0].to_string(),
            }
        }
        "get" => {
            arity(1)?;
            Request::Get {
                filename: args[0].to_string(),
            }
        }
        "sch" => {
            arity(1)?;
            Request::Search {
                substring: args[0].to_string(),
            }
        }
        "laps" => {
            arity(0)?;
            Request::ListActivePeers
        }
        "lpf" => {
            arity(0)?;
            Request::ListPublishedFiles
        }
        "disconnect" => {
            arity(1)?;
            Request::Disconnect {
                username: args[0].to_string(),
            }
        }
        other => return Err(ProtocolError::UnknownVerb(other.to_string())),
    };
    Ok(request)
}

/// Malformed control datagram. The tracker drops these without replying.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty datagram")]
    Empty,
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    #[error("{verb} takes {expected} argument(s), got {got}")]
    WrongArity {
        verb: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

pub fn publish_ok(filename: &str) -> String {
    format!("File {filename} published successfully.")
}

pub fn unpublish_ok(filename: &str) -> String {
    format!("File {filename} unpublished successfully.")
}

pub fn unpublish_not_found(filename: &str) -> String {
    format!("Failed to unpublish {filename}: File not found.")
}

pub fn located(filename: &str, at: SocketAddr) -> String {
    format!("{filename} is available at {at}")
}

pub fn not_found(filename: &str) -> String {
    format!("{filename} not found.")
}

/// `lpf` reply: count header, then one filename per line, newline-terminated.
pub fn published_listing(total: usize, files: &[String]) -> String {
    let mut out = format!("{total} published files:\n");
    if files.is_empty() {
        out.push_str(NO_PUBLISHED_FILES);
        out.push('\n');
    }
    for name in files {
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Answer to a `get`, as seen by the requesting peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Available(SocketAddr),
    NotFound,
}

/// Parse a `get` reply for `filename`.
pub fn parse_location(filename: &str, reply: &str) -> Result<Location, ReplyError> {
    let reply = reply.trim_end();
    if reply == not_found(filename) {
        return Ok(Location::NotFound);
    }
    let addr = reply
        .strip_prefix(filename)
        .and_then(|rest| rest.strip_prefix(" is available at "))
        .ok_or_else(|| ReplyError::Unexpected(reply.to_string()))?;
    addr.parse::<SocketAddr>()
        .map(Location::Available)
        .map_err(|_| ReplyError::BadAddress(addr.to_string()))
}

/// Parse an `sch` reply into the list of matches (empty when nothing matched).
pub fn parse_search(reply: &str) -> Vec<String> {
    parse_lines(reply, NO_MATCHES)
}

/// Parse a `laps` reply into usernames (empty when no one is online).
pub fn parse_active_peers(reply: &str) -> Vec<String> {
    parse_lines(reply, NO_ACTIVE_PEERS)
}

fn parse_lines(reply: &str, empty_marker: &str) -> Vec<String> {
    if reply.trim() == empty_marker {
        return Vec::new();
    }
    reply
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reply text that does not match the expected shape.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("unexpected reply from tracker: {0:?}")]
    Unexpected(String),
    #[error("could not parse peer address {0:?}")]
    BadAddress(String),
}
