//! Transfer plane: direct peer-to-peer TCP. One connection carries one filename request and
//! the raw file bytes back; the publisher closes when done. There is no framing, so an absent
//! file and an empty file look the same to the requester.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Bytes per read/write on both sides.
pub const CHUNK_SIZE: usize = 1024;
/// Longest filename request the publisher reads.
pub const MAX_REQUEST_LEN: usize = 1024;

/// Accept transfer connections until the listener fails. Each connection runs on its own task,
/// so a stalled downloader never holds up the others. Connection tasks belong to this future:
/// dropping or aborting it cancels every upload in flight.
pub async fn run_listener(listener: TcpListener, share_dir: PathBuf) -> std::io::Result<()> {
    let share_dir = Arc::new(share_dir);
    info!(addr = %listener.local_addr()?, dir = %share_dir.display(), "transfer listener ready");
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, from) = accepted?;
                let share_dir = share_dir.clone();
                connections.spawn(async move {
                    match serve_connection(stream, &share_dir).await {
                        Ok(Served::Sent { filename, bytes }) => {
                            info!(%from, %filename, bytes, "file sent");
                        }
                        Ok(Served::Missing { filename }) => {
                            warn!(%from, %filename, "requested file not found");
                        }
                        Err(e) => warn!(%from, error = %e, "transfer connection failed"),
                    }
                });
            }
            Some(done) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = done {
                    warn!(error = %e, "transfer task ended abnormally");
                }
            }
        }
    }
}

/// Outcome of serving one connection.
#[derive(Debug)]
pub enum Served {
    Sent { filename: String, bytes: u64 },
    Missing { filename: String },
}

/// Serve a single request: read the filename, stream the file, close.
pub async fn serve_connection(
    mut stream: TcpStream,
    share_dir: &Path,
) -> Result<Served, TransferError> {
    let mut buf = vec![0u8; MAX_REQUEST_LEN];
    let n = stream.read(&mut buf).await?;
    let filename = String::from_utf8_lossy(&buf[..n]).trim().to_string();
    debug!(%filename, "transfer request");

    let file = match shared_path(share_dir, &filename) {
        Some(path) => File::open(path).await.ok(),
        None => None,
    };
    let Some(mut file) = file else {
        stream.shutdown().await?;
        return Ok(Served::Missing { filename });
    };

    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&chunk[..n]).await?;
        sent += n as u64;
    }
    stream.shutdown().await?;
    Ok(Served::Sent {
        filename,
        bytes: sent,
    })
}

/// Fetch `filename` from the publisher at `addr` into `dest`, created or truncated first.
///
/// A transfer that yields zero bytes is reported as [`TransferError::FileNotFound`]; the empty
/// destination file is left in place.
pub async fn download(addr: SocketAddr, filename: &str, dest: &Path) -> Result<u64, TransferError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransferError::Connect { addr, source })?;
    stream.write_all(filename.as_bytes()).await?;

    let mut out = File::create(dest).await?;
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n]).await?;
        received += n as u64;
    }
    out.flush().await?;

    if received == 0 {
        return Err(TransferError::FileNotFound(filename.to_string()));
    }
    debug!(%addr, %filename, bytes = received, "download complete");
    Ok(received)
}

/// Resolve a requested name to a file directly inside `dir`. Names with separators,
/// `.` or `..` are refused.
pub fn shared_path(dir: &Path, filename: &str) -> Option<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !filename.contains(['/', '\\']) => {
            Some(dir.join(name))
        }
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("could not connect to peer {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not available from the peer")]
    FileNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
