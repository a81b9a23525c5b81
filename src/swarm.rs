//! Swarm-engine collaborator contract.
//!
//! The engine owns the wire protocol, piece selection/verification and peer
//! discovery; the session core consumes it through these traits. Telemetry
//! reads hand out owned values because the engine's collections are not
//! stable across yield points: callers re-fetch every tick instead of
//! caching references.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::error::Error;

/// Lifecycle events emitted by the engine for one session, in monotonic
/// order (metadata before verification before done).
#[derive(Debug, Clone, PartialEq)]
pub enum SwarmEvent {
    /// Torrent metadata is available; files and piece layout are known.
    MetadataReady,
    /// Local-data verification progress. Transient; may repeat.
    Verifying {
        percent_done: f64,
        percent_verified: f64,
    },
    /// A stalled piece request was reassigned to a faster peer.
    HotSwap,
    /// All selected data downloaded and verified.
    Done,
    /// Unrecoverable engine failure.
    Error(String),
}

/// Aggregate transfer counters for the swarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmStats {
    pub downloaded: u64,
    pub uploaded: u64,
    /// Instantaneous download speed, bytes per second.
    pub download_speed: u64,
    pub upload_speed: u64,
    /// Peers known but not yet connected.
    pub queued_peers: u32,
    /// Peers rejected by the blocklist.
    pub blocked_peers: u32,
}

/// Point-in-time view of one peer connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireStat {
    pub remote_address: String,
    /// Whether the peer is choking us.
    pub peer_choking: bool,
    pub downloaded: u64,
    pub uploaded: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    /// Outstanding piece requests, oldest first.
    pub requests: Vec<u32>,
    /// Which pieces the peer claims to have.
    pub peer_pieces: Vec<bool>,
}

/// Point-in-time view of one piece's block progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PieceStat {
    pub index: u32,
    pub verified: bool,
    /// Per-block written flags, fixed length for the piece.
    pub blocks: Vec<bool>,
    pub blocks_written: u32,
}

/// One file in the torrent, in metadata enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub length: u64,
}

/// Options forwarded to the engine when opening a session.
#[derive(Debug, Clone, Default)]
pub struct SwarmOptions {
    /// Download destination; the engine picks its scratch dir when unset.
    pub download_dir: Option<PathBuf>,
    /// Peer blocklist file path or URL.
    pub blocklist: Option<String>,
}

/// Live handle to one torrent swarm.
#[async_trait]
pub trait SwarmHandle: Send + Sync {
    /// Session identifier, in info-hash or path/URL form.
    fn id(&self) -> String;

    /// Torrent display name. Meaningful once metadata is ready.
    fn name(&self) -> String;

    fn total_length(&self) -> u64;

    fn piece_count(&self) -> u32;

    fn files(&self) -> Vec<FileEntry>;

    fn stats(&self) -> SwarmStats;

    fn wires(&self) -> Vec<WireStat>;

    fn pieces(&self) -> Vec<PieceStat>;

    /// Prioritize one file for sequential download.
    fn select_file(&self, index: usize);

    /// Sequential byte stream of one file, for stdout piping.
    fn file_stream(&self, index: usize) -> Box<dyn AsyncRead + Send + Unpin>;

    /// Tear down trackers, peers and storage. May take a while.
    async fn destroy(&self) -> std::io::Result<()>;
}

/// Factory half of the contract: resolves a torrent reference into a live
/// swarm plus its lifecycle event stream.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Fails with [`Error::InvalidIdentifier`] when the reference cannot be
    /// resolved.
    async fn open(
        &self,
        torrent_id: &str,
        options: SwarmOptions,
    ) -> Result<(Arc<dyn SwarmHandle>, mpsc::Receiver<SwarmEvent>), Error>;
}
