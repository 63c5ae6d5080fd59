//! Interactive front end for `trickle-peer`: login prompt, then one command per line.
//! Prompts and results go to `out`; the binary passes stdout.

use std::io::Write;
use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, Lines};
use trickle_core::command::Location;
use trickle_core::AgentError;

use crate::peer::{PeerClient, PeerError};
use crate::transfer::TransferError;

const COMMANDS: &str = "Available commands are: get, lap, lpf, pub, sch, unp, xit";

/// Prompt for credentials until the tracker admits us. Returns `false` if input ends first.
pub async fn login<R, W>(
    client: &mut PeerClient,
    input: &mut Lines<R>,
    out: &mut W,
) -> Result<bool, PeerError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        let Some(username) = prompt(input, out, "Enter your username: ").await? else {
            return Ok(false);
        };
        let Some(password) = prompt(input, out, "Enter your password: ").await? else {
            return Ok(false);
        };
        if username.is_empty() || username.contains(' ') || password.contains(' ') {
            writeln!(out, "Usernames and passwords cannot be empty or contain spaces.")?;
            continue;
        }
        match client.authenticate(&username, &password).await {
            Ok(reply) => {
                writeln!(out, "{reply}")?;
                if client.agent().is_active() {
                    writeln!(out, "Welcome to BitTrickle!")?;
                    writeln!(out, "{COMMANDS}")?;
                    return Ok(true);
                }
            }
            Err(PeerError::Timeout(_)) => {
                writeln!(out, "No response from the tracker. Please try again.")?
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run the command loop until `xit` or end of input, then disconnect.
pub async fn run<R, W>(
    mut client: PeerClient,
    input: &mut Lines<R>,
    out: &mut W,
) -> Result<(), PeerError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    while let Some(line) = prompt(input, out, "Enter command: ").await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => continue,
            ["xit"] => break,
            ["get", filename] => get(&client, filename, out).await?,
            ["get", ..] => writeln!(out, "Invalid command format. Use: get <filename>")?,
            ["lap"] => match client.list_active_peers().await {
                Ok(peers) if peers.is_empty() => writeln!(out, "No active peers.")?,
                Ok(peers) => {
                    writeln!(out, "{} active peer{}:", peers.len(), plural(peers.len()))?;
                    for p in peers {
                        writeln!(out, "{p}")?;
                    }
                }
                Err(e) => report(out, e)?,
            },
            ["lpf"] => match client.list_published_files().await {
                Ok(listing) => write!(out, "{listing}")?,
                Err(e) => report(out, e)?,
            },
            ["pub", filename] => match client.publish(filename).await {
                Ok(()) => writeln!(out, "File published successfully.")?,
                Err(PeerError::Agent(e @ AgentError::AlreadyPublished(_))) => writeln!(out, "{e}")?,
                Err(e) => writeln!(out, "Failed to publish {filename}: {e}")?,
            },
            ["pub", ..] => writeln!(out, "Invalid command format. Use: pub <filename>")?,
            ["sch", substring] => match client.search(substring).await {
                Ok(files) if files.is_empty() => writeln!(out, "No files found.")?,
                Ok(files) => {
                    writeln!(out, "{} file{} found:", files.len(), plural(files.len()))?;
                    for f in files {
                        writeln!(out, "{f}")?;
                    }
                }
                Err(e) => report(out, e)?,
            },
            ["sch", ..] => writeln!(out, "Invalid command format. Use: sch <substring>")?,
            ["unp", filename] => match client.unpublish(filename).await {
                Ok(()) => writeln!(out, "Unpublished {filename} successfully.")?,
                Err(PeerError::Agent(e @ AgentError::NotPublished(_))) => writeln!(out, "{e}")?,
                Err(e) => writeln!(out, "Failed to unpublish {filename}: {e}")?,
            },
            ["unp", ..] => writeln!(out, "Invalid command format. Use: unp <filename>")?,
            _ => writeln!(out, "Unknown command.")?,
        }
    }
    client.disconnect().await?;
    writeln!(out, "Goodbye!")?;
    Ok(())
}

async fn get<W: Write>(client: &PeerClient, filename: &str, out: &mut W) -> Result<(), PeerError> {
    let addr: SocketAddr = match client.locate(filename).await {
        Ok(Location::Available(addr)) => addr,
        Ok(Location::NotFound) => {
            writeln!(out, "{filename} not found.")?;
            return Ok(());
        }
        Err(e) => {
            report(out, e)?;
            return Ok(());
        }
    };
    writeln!(out, "Connecting to {addr} to download {filename}...")?;
    match client.fetch(addr, filename).await {
        Ok(bytes) => writeln!(out, "{filename} downloaded successfully ({bytes} bytes).")?,
        Err(PeerError::Transfer(TransferError::FileNotFound(_))) => {
            writeln!(out, "Download failed: the peer sent no data for {filename}.")?
        }
        Err(e) => report(out, e)?,
    }
    Ok(())
}

async fn prompt<R, W>(
    input: &mut Lines<R>,
    out: &mut W,
    text: &str,
) -> Result<Option<String>, PeerError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{text}")?;
    out.flush()?;
    Ok(input.next_line().await?.map(|l| l.trim().to_string()))
}

fn report<W: Write>(out: &mut W, e: PeerError) -> std::io::Result<()> {
    writeln!(out, "Error: {e}")
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
