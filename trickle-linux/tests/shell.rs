use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, Lines};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use trickle_core::{command, CredentialStore, Tracker};
use trickle_linux::peer::{PeerClient, PeerSettings};
use trickle_linux::shell;
use trickle_linux::tracker::run_tracker;

async fn start_tracker() -> SocketAddr {
    let credentials = CredentialStore::parse("alice pa\nbob pb\n").unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(run_tracker(
        socket,
        Arc::new(Mutex::new(Tracker::new(credentials))),
        Duration::from_secs(60),
    ));
    addr
}

async fn client(tracker: SocketAddr, dir: &Path) -> PeerClient {
    let settings = PeerSettings {
        heartbeat_interval: Duration::from_secs(60),
        request_timeout: Duration::from_secs(2),
        share_dir: dir.to_path_buf(),
        download_dir: dir.to_path_buf(),
    };
    PeerClient::connect(tracker, settings).await.unwrap()
}

fn input(lines: &[&str]) -> Lines<Cursor<Vec<u8>>> {
    let mut text = lines.join("\n");
    text.push('\n');
    Cursor::new(text.into_bytes()).lines()
}

#[tokio::test]
async fn login_retries_until_admitted() {
    let tracker = start_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let mut alice = client(tracker, dir.path()).await;
    let mut lines = input(&["alice", "wrong", "", "x", "alice", "pa"]);
    let mut out = Vec::new();

    assert!(shell::login(&mut alice, &mut lines, &mut out).await.unwrap());
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains(command::AUTH_BAD_PASSWORD));
    assert!(out.contains("Usernames and passwords cannot be empty or contain spaces."));
    assert!(out.contains(command::AUTH_OK));
    assert!(out.contains("Welcome to BitTrickle!"));
    assert!(alice.agent().is_active());
}

#[tokio::test]
async fn login_stops_at_end_of_input() {
    let tracker = start_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let mut alice = client(tracker, dir.path()).await;
    let mut lines = input(&["alice"]);
    let mut out = Vec::new();

    assert!(!shell::login(&mut alice, &mut lines, &mut out).await.unwrap());
    assert!(!alice.agent().is_active());
}

#[tokio::test]
async fn commands_print_results_and_usage() {
    let tracker = start_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let mut bob = client(tracker, dir.path()).await;
    assert_eq!(bob.authenticate("bob", "pb").await.unwrap(), command::AUTH_OK);

    let mut alice = client(tracker, dir.path()).await;
    let mut lines = input(&[
        "alice", "pa", "lap", "get", "pub a b", "sch", "unp", "frobnicate", "pub a.txt",
        "pub a.txt", "sch a", "unp b.txt", "xit",
    ]);
    let mut out = Vec::new();
    assert!(shell::login(&mut alice, &mut lines, &mut out).await.unwrap());
    shell::run(alice, &mut lines, &mut out).await.unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("1 active peer:\nbob\n"));
    assert!(out.contains("Invalid command format. Use: get <filename>"));
    assert!(out.contains("Invalid command format. Use: pub <filename>"));
    assert!(out.contains("Invalid command format. Use: sch <substring>"));
    assert!(out.contains("Invalid command format. Use: unp <filename>"));
    assert!(out.contains("Unknown command."));
    assert!(out.contains("File published successfully."));
    assert!(out.contains("a.txt is already published."));
    assert!(out.contains("No files found."));
    assert!(out.contains("You have not published a file named b.txt."));
    assert!(out.ends_with("Goodbye!\n"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob.list_active_peers().await.unwrap().is_empty());
}
