//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Tracker and peer configuration. File: ~/.config/bittrickle/config.toml or /etc/bittrickle/config.toml.
/// Env overrides: BITTRICKLE_TRACKER_HOST, BITTRICKLE_HEARTBEAT_INTERVAL, BITTRICKLE_EVICTION,
/// BITTRICKLE_CREDENTIALS, BITTRICKLE_SHARE_DIR, BITTRICKLE_DOWNLOAD_DIR, BITTRICKLE_REQUEST_TIMEOUT.
/// Ports stay on the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the tracker binds and peers send to (default 127.0.0.1).
    #[serde(default = "default_tracker_host")]
    pub tracker_host: String,
    /// Seconds between peer heartbeats; also the tracker's sweep period (default 2).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Evict sessions that stop heartbeating (default true).
    #[serde(default = "default_eviction_enabled")]
    pub eviction_enabled: bool,
    /// Missed sweeps tolerated before eviction (default 3).
    #[serde(default = "default_eviction_missed_heartbeats")]
    pub eviction_missed_heartbeats: u64,
    /// Tracker credential file (default credentials.txt).
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// Directory served to other peers (default current directory).
    #[serde(default = "default_dir")]
    pub share_dir: PathBuf,
    /// Directory downloads are written into (default current directory).
    #[serde(default = "default_dir")]
    pub download_dir: PathBuf,
    /// Seconds to wait for a tracker reply (default 5).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_tracker_host() -> String {
    "127.0.0.1".to_string()
}
fn default_heartbeat_interval_secs() -> u64 {
    2
}
fn default_eviction_enabled() -> bool {
    true
}
fn default_eviction_missed_heartbeats() -> u64 {
    trickle_core::session::DEFAULT_MAX_SILENT_TICKS
}
fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.txt")
}
fn default_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_request_timeout_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_host: default_tracker_host(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            eviction_enabled: default_eviction_enabled(),
            eviction_missed_heartbeats: default_eviction_missed_heartbeats(),
            credentials_path: default_credentials_path(),
            share_dir: default_dir(),
            download_dir: default_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Eviction threshold in sweep ticks, or `None` when eviction is off.
    pub fn max_silent_ticks(&self) -> Option<u64> {
        self.eviction_enabled
            .then_some(self.eviction_missed_heartbeats)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("BITTRICKLE_TRACKER_HOST") {
        c.tracker_host = s;
    }
    if let Some(n) = var("BITTRICKLE_HEARTBEAT_INTERVAL").and_then(|s| s.parse::<u64>().ok()) {
        c.heartbeat_interval_secs = n;
    }
    if let Some(b) = var("BITTRICKLE_EVICTION").and_then(|s| s.parse::<bool>().ok()) {
        c.eviction_enabled = b;
    }
    if let Some(s) = var("BITTRICKLE_CREDENTIALS") {
        c.credentials_path = PathBuf::from(s);
    }
    if let Some(s) = var("BITTRICKLE_SHARE_DIR") {
        c.share_dir = PathBuf::from(s);
    }
    if let Some(s) = var("BITTRICKLE_DOWNLOAD_DIR") {
        c.download_dir = PathBuf::from(s);
    }
    if let Some(n) = var("BITTRICKLE_REQUEST_TIMEOUT").and_then(|s| s.parse::<u64>().ok()) {
        c.request_timeout_secs = n;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/bittrickle/config.toml"));
    }
    out.push(PathBuf::from("/etc/bittrickle/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => tracing::warn!(path = %p.display(), error = %e, "ignoring invalid config file"),
                },
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "could not read config file"),
            }
            break;
        }
    }
    None
}
