//! Telemetry snapshot integration tests.
//!
//! Snapshots are taken against a fake swarm whose state the test mutates
//! between calls, the same way the engine mutates the real one between
//! render ticks.

mod common;

use std::sync::Arc;

use common::{wire, FakeEngine, FakeSwarm};
use swarmplay::config::Config;
use swarmplay::session::{Session, SessionController};
use swarmplay::swarm::{PieceStat, SwarmStats, WireStat};
use swarmplay::telemetry::{humanize_duration, snapshot, PeerProgress};

async fn session_over(swarm: Arc<FakeSwarm>) -> Arc<Session> {
    let (engine, _events) = FakeEngine::new(swarm);
    let mut config = Config::new("deadbeef");
    config.quiet = true;
    SessionController::start(config, engine.as_ref())
        .await
        .unwrap()
        .session()
}

#[tokio::test]
async fn test_snapshot_reads_current_swarm_state() {
    let swarm = FakeSwarm::new("deadbeef");
    swarm.set(|s| {
        s.name = "ubuntu.iso".to_string();
        s.total_length = 1_000;
        s.piece_count = 4;
        s.stats = SwarmStats {
            downloaded: 400,
            uploaded: 50,
            download_speed: 100,
            upload_speed: 10,
            queued_peers: 3,
            blocked_peers: 2,
        };
        s.wires = vec![
            wire("10.0.0.1:6881", false, 200),
            wire("10.0.0.2:6881", true, 0),
        ];
    });
    let session = session_over(swarm).await;

    let snap = snapshot(&session);
    assert_eq!(snap.name, "ubuntu.iso");
    assert_eq!(snap.downloaded, 400);
    assert_eq!(snap.eta_seconds, 6.0);
    assert_eq!(snap.active_peers, 1);
    assert_eq!(snap.peers.len(), 2);
    assert_eq!(snap.queued_peers, 3);
    assert_eq!(snap.blocked_peers, 2);
    assert_eq!(snap.peers[1].tags, vec!["choked"]);
}

#[tokio::test]
async fn test_stalled_swarm_reports_negative_eta() {
    let swarm = FakeSwarm::new("deadbeef");
    swarm.set(|s| {
        s.total_length = 1_000;
        s.stats.downloaded = 400;
        s.stats.download_speed = 0;
    });
    let session = session_over(swarm).await;

    let snap = snapshot(&session);
    assert_eq!(snap.eta_seconds, -600.0);
    // The humanizer reads the magnitude.
    assert_eq!(snap.eta_human, humanize_duration(600.0));
}

#[tokio::test]
async fn test_piece_bar_round_trip() {
    let swarm = FakeSwarm::new("deadbeef");
    swarm.set(|s| {
        s.pieces = vec![
            PieceStat {
                index: 0,
                verified: false,
                blocks: vec![false; 4],
                blocks_written: 0,
            },
            PieceStat {
                index: 1,
                verified: false,
                blocks: vec![true, true, false, false],
                blocks_written: 2,
            },
        ];
    });
    let session = session_over(swarm.clone()).await;

    let snap = snapshot(&session);
    assert_eq!(snap.pieces.len(), 1);
    assert_eq!(snap.pieces[0].index, 1);

    // Finish and verify the piece: it leaves the bar on the next snapshot.
    swarm.set(|s| {
        s.pieces[1] = PieceStat {
            index: 1,
            verified: true,
            blocks: vec![true; 4],
            blocks_written: 4,
        };
    });
    let snap = snapshot(&session);
    assert!(snap.pieces.is_empty());
}

#[tokio::test]
async fn test_seed_peer_renders_sentinel() {
    let swarm = FakeSwarm::new("deadbeef");
    swarm.set(|s| {
        s.piece_count = 3;
        s.wires = vec![WireStat {
            remote_address: "10.0.0.9:6881".to_string(),
            peer_pieces: vec![true, true, true],
            ..Default::default()
        }];
    });
    let session = session_over(swarm).await;

    let snap = snapshot(&session);
    assert_eq!(snap.peers[0].progress, PeerProgress::Seed);
}

#[tokio::test]
async fn test_snapshot_has_no_side_effects() {
    let swarm = FakeSwarm::new("deadbeef");
    swarm.set(|s| {
        s.total_length = 500;
        s.stats.download_speed = 25;
        s.wires = vec![wire("10.0.0.1:6881", false, 10)];
    });
    let session = session_over(swarm.clone()).await;

    let first = snapshot(&session);
    let second = snapshot(&session);
    assert_eq!(first.peers, second.peers);
    assert_eq!(first.pieces, second.pieces);
    assert_eq!(first.eta_seconds, second.eta_seconds);
    // Reading telemetry must not touch engine-side state.
    assert!(swarm.selected().is_empty());
    assert_eq!(swarm.destroyed(), 0);
}
