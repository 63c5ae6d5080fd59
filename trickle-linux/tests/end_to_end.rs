use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use trickle_core::command::{self, Location};
use trickle_core::{decode_request, AgentError, CredentialStore, Request, Tracker};
use trickle_linux::peer::{PeerClient, PeerError, PeerSettings};
use trickle_linux::tracker::run_tracker;
use trickle_linux::transfer::TransferError;

async fn start_tracker(sweep: Duration, max_silent_ticks: Option<u64>) -> SocketAddr {
    let credentials = CredentialStore::parse("alice pa\nbob pb\ncarol pc\n").unwrap();
    let mut tracker = Tracker::new(credentials);
    tracker.set_eviction(max_silent_ticks);
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(run_tracker(socket, Arc::new(Mutex::new(tracker)), sweep));
    addr
}

fn settings(share: &Path, downloads: &Path, heartbeat: Duration) -> PeerSettings {
    PeerSettings {
        heartbeat_interval: heartbeat,
        request_timeout: Duration::from_secs(2),
        share_dir: share.to_path_buf(),
        download_dir: downloads.to_path_buf(),
    }
}

async fn peer(tracker: SocketAddr, dir: &Path, username: &str, password: &str) -> PeerClient {
    let mut client = PeerClient::connect(tracker, settings(dir, dir, Duration::from_millis(200)))
        .await
        .unwrap();
    let reply = client.authenticate(username, password).await.unwrap();
    assert_eq!(reply, command::AUTH_OK);
    client
}

#[tokio::test]
async fn publish_locate_and_download() {
    let tracker = start_tracker(Duration::from_secs(60), None).await;
    let alice_dir = tempfile::tempdir().unwrap();
    let bob_dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(alice_dir.path().join("a.bin"), &data).unwrap();

    let mut alice = peer(tracker, alice_dir.path(), "alice", "pa").await;
    alice.publish("a.bin").await.unwrap();
    let bob = peer(tracker, bob_dir.path(), "bob", "pb").await;

    let expected: SocketAddr = ([127, 0, 0, 1], alice.transfer_port()).into();
    assert_eq!(
        bob.locate("a.bin").await.unwrap(),
        Location::Available(expected)
    );
    assert_eq!(alice.locate("a.bin").await.unwrap(), Location::NotFound);

    let n = bob.download("a.bin").await.unwrap();
    assert_eq!(n, 10_000);
    assert_eq!(std::fs::read(bob_dir.path().join("a.bin")).unwrap(), data);
}

#[tokio::test]
async fn catalog_commands_round_trip() {
    let tracker = start_tracker(Duration::from_secs(60), None).await;
    let alice_dir = tempfile::tempdir().unwrap();
    let bob_dir = tempfile::tempdir().unwrap();
    let mut alice = peer(tracker, alice_dir.path(), "alice", "pa").await;
    let bob = peer(tracker, bob_dir.path(), "bob", "pb").await;

    alice.publish("report_final.txt").await.unwrap();
    assert!(matches!(
        alice.publish("report_final.txt").await,
        Err(PeerError::Agent(AgentError::AlreadyPublished(_)))
    ));
    assert_eq!(bob.search("final").await.unwrap(), vec!["report_final.txt"]);
    assert!(bob.search("Final").await.unwrap().is_empty());
    assert!(alice.search("final").await.unwrap().is_empty());

    assert_eq!(bob.list_active_peers().await.unwrap(), vec!["alice"]);
    assert_eq!(
        bob.list_published_files().await.unwrap(),
        "1 published files:\nreport_final.txt\n"
    );

    assert!(matches!(
        alice.unpublish("other.txt").await,
        Err(PeerError::Agent(AgentError::NotPublished(_)))
    ));
    alice.unpublish("report_final.txt").await.unwrap();
    assert!(bob.search("final").await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_published_file_downloads_as_empty() {
    let tracker = start_tracker(Duration::from_secs(60), None).await;
    let alice_dir = tempfile::tempdir().unwrap();
    let bob_dir = tempfile::tempdir().unwrap();
    let mut alice = peer(tracker, alice_dir.path(), "alice", "pa").await;
    alice.publish("ghost.bin").await.unwrap();
    let bob = peer(tracker, bob_dir.path(), "bob", "pb").await;

    let err = bob.download("ghost.bin").await.unwrap_err();
    assert!(matches!(
        err,
        PeerError::Transfer(TransferError::FileNotFound(_))
    ));
    assert_eq!(
        std::fs::metadata(bob_dir.path().join("ghost.bin")).unwrap().len(),
        0
    );
    assert!(matches!(
        bob.download("never-published").await,
        Err(PeerError::NotFound(_))
    ));
}

#[tokio::test]
async fn second_login_is_rejected() {
    let tracker = start_tracker(Duration::from_secs(60), None).await;
    let dir = tempfile::tempdir().unwrap();
    let _alice = peer(tracker, dir.path(), "alice", "pa").await;

    let mut imposter = PeerClient::connect(
        tracker,
        settings(dir.path(), dir.path(), Duration::from_millis(200)),
    )
    .await
    .unwrap();
    let reply = imposter.authenticate("alice", "pa").await.unwrap();
    assert_eq!(reply, command::AUTH_ALREADY_ACTIVE);
    assert!(!imposter.agent().is_active());
    assert!(matches!(
        imposter.publish("x").await,
        Err(PeerError::Agent(AgentError::NotActive))
    ));

    let reply = imposter.authenticate("carol", "wrong").await.unwrap();
    assert_eq!(reply, command::AUTH_BAD_PASSWORD);
    let reply = imposter.authenticate("dave", "pd").await.unwrap();
    assert_eq!(reply, command::AUTH_UNKNOWN_USER);
}

#[tokio::test]
async fn disconnect_removes_peer() {
    let tracker = start_tracker(Duration::from_secs(60), None).await;
    let dir = tempfile::tempdir().unwrap();
    let mut alice = peer(tracker, dir.path(), "alice", "pa").await;
    alice.publish("a.bin").await.unwrap();
    let bob = peer(tracker, dir.path(), "bob", "pb").await;

    alice.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(bob.list_active_peers().await.unwrap().is_empty());
    assert_eq!(bob.locate("a.bin").await.unwrap(), Location::NotFound);
}

#[tokio::test]
async fn silent_peer_is_evicted() {
    let tracker = start_tracker(Duration::from_millis(100), Some(3)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut alice = PeerClient::connect(
        tracker,
        settings(dir.path(), dir.path(), Duration::from_millis(50)),
    )
    .await
    .unwrap();
    alice.authenticate("alice", "pa").await.unwrap();
    let carol = peer(tracker, dir.path(), "carol", "pc").await;

    // Dropping stops the heartbeat without a disconnect notice, like a crash.
    drop(carol);
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert!(alice.list_active_peers().await.unwrap().is_empty());
    alice.disconnect().await.unwrap();
}

/// Tracker stand-in that answers `lpf` only after `delay`, blocking its loop meanwhile.
async fn slow_listing_tracker(delay: Duration) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; command::MAX_DATAGRAM_LEN];
        loop {
            let (n, from) = socket.recv_from(&mut buf).await.unwrap();
            let reply = match decode_request(&buf[..n]).unwrap() {
                Request::Authenticate { .. } => command::AUTH_OK.to_string(),
                Request::ListPublishedFiles => {
                    tokio::time::sleep(delay).await;
                    command::published_listing(1, &["secret.txt".to_string()])
                }
                Request::Search { .. } => command::NO_MATCHES.to_string(),
                _ => continue,
            };
            socket.send_to(reply.as_bytes(), from).await.unwrap();
        }
    });
    addr
}

#[tokio::test]
async fn late_reply_is_not_taken_for_the_next_answer() {
    let tracker = slow_listing_tracker(Duration::from_millis(1500)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings(dir.path(), dir.path(), Duration::from_secs(60));
    settings.request_timeout = Duration::from_secs(1);
    let mut client = PeerClient::connect(tracker, settings).await.unwrap();
    assert_eq!(
        client.authenticate("alice", "pa").await.unwrap(),
        command::AUTH_OK
    );

    // The late listing arrives while the search is waiting.
    assert!(matches!(
        client.list_published_files().await,
        Err(PeerError::Timeout("lpf"))
    ));
    assert!(client.search("zzz").await.unwrap().is_empty());

    // The late listing is already queued when the search is sent.
    assert!(matches!(
        client.list_published_files().await,
        Err(PeerError::Timeout("lpf"))
    ));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(client.search("zzz").await.unwrap().is_empty());
}

#[tokio::test]
async fn disconnect_cuts_off_upload_in_flight() {
    const SIZE: usize = 32 * 1024 * 1024;
    let tracker = start_tracker(Duration::from_secs(60), None).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("huge.bin"), vec![7u8; SIZE]).unwrap();
    let alice = peer(tracker, dir.path(), "alice", "pa").await;

    let mut stream = TcpStream::connect(("127.0.0.1", alice.transfer_port()))
        .await
        .unwrap();
    stream.write_all(b"huge.bin").await.unwrap();
    let mut buf = vec![0u8; 1024];
    let mut received = 0;
    while received < 1024 {
        received += stream.read(&mut buf).await.unwrap();
    }

    alice.disconnect().await.unwrap();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => received += n,
        }
    }
    assert!(received < SIZE, "upload finished after disconnect");
}
