//! Shared fake collaborators for integration tests.
//!
//! The session core is generic over the swarm engine, the content server
//! and the player locator; these fakes give tests full control over event
//! timing without any network or subprocess machinery.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use swarmplay::content::{ContentServer, ServerEvent, ServerHandle};
use swarmplay::error::Error;
use swarmplay::player::{PlayerKind, PlayerLocator};
use swarmplay::swarm::{
    FileEntry, PieceStat, SwarmEngine, SwarmEvent, SwarmHandle, SwarmOptions, SwarmStats, WireStat,
};

// =============================================================================
// Fake swarm
// =============================================================================

/// Mutable backing state for a fake swarm; tests mutate it between ticks.
#[derive(Default)]
pub struct SwarmState {
    pub name: String,
    pub total_length: u64,
    pub piece_count: u32,
    pub files: Vec<FileEntry>,
    pub stats: SwarmStats,
    pub wires: Vec<WireStat>,
    pub pieces: Vec<PieceStat>,
    pub selected: Vec<usize>,
    pub destroyed: usize,
    pub file_bytes: Vec<u8>,
}

pub struct FakeSwarm {
    id: String,
    state: Mutex<SwarmState>,
}

impl FakeSwarm {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: Mutex::new(SwarmState::default()),
        })
    }

    pub fn set(&self, mutate: impl FnOnce(&mut SwarmState)) {
        mutate(&mut self.state.lock().unwrap());
    }

    pub fn selected(&self) -> Vec<usize> {
        self.state.lock().unwrap().selected.clone()
    }

    pub fn destroyed(&self) -> usize {
        self.state.lock().unwrap().destroyed
    }
}

#[async_trait]
impl SwarmHandle for FakeSwarm {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    fn total_length(&self) -> u64 {
        self.state.lock().unwrap().total_length
    }

    fn piece_count(&self) -> u32 {
        self.state.lock().unwrap().piece_count
    }

    fn files(&self) -> Vec<FileEntry> {
        self.state.lock().unwrap().files.clone()
    }

    fn stats(&self) -> SwarmStats {
        self.state.lock().unwrap().stats
    }

    fn wires(&self) -> Vec<WireStat> {
        self.state.lock().unwrap().wires.clone()
    }

    fn pieces(&self) -> Vec<PieceStat> {
        self.state.lock().unwrap().pieces.clone()
    }

    fn select_file(&self, index: usize) {
        self.state.lock().unwrap().selected.push(index);
    }

    fn file_stream(&self, _index: usize) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(Cursor::new(self.state.lock().unwrap().file_bytes.clone()))
    }

    async fn destroy(&self) -> std::io::Result<()> {
        self.state.lock().unwrap().destroyed += 1;
        Ok(())
    }
}

// =============================================================================
// Fake engine
// =============================================================================

pub struct FakeEngine {
    prepared: Mutex<Option<(Arc<FakeSwarm>, mpsc::Receiver<SwarmEvent>)>>,
}

impl FakeEngine {
    /// Engine that resolves the first open() to `swarm`; the returned
    /// sender drives its lifecycle events.
    pub fn new(swarm: Arc<FakeSwarm>) -> (Arc<Self>, mpsc::Sender<SwarmEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Arc::new(Self {
                prepared: Mutex::new(Some((swarm, rx))),
            }),
            tx,
        )
    }

    /// Engine that rejects every torrent reference.
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            prepared: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SwarmEngine for FakeEngine {
    async fn open(
        &self,
        torrent_id: &str,
        _options: SwarmOptions,
    ) -> Result<(Arc<dyn SwarmHandle>, mpsc::Receiver<SwarmEvent>), Error> {
        match self.prepared.lock().unwrap().take() {
            Some((swarm, rx)) => {
                let swarm: Arc<dyn SwarmHandle> = swarm;
                Ok((swarm, rx))
            }
            None => Err(Error::InvalidIdentifier(torrent_id.to_string())),
        }
    }
}

// =============================================================================
// Fake content server
// =============================================================================

pub struct FakeServerHandle {
    port: u16,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl ServerHandle for FakeServerHandle {
    fn port(&self) -> u16 {
        self.port
    }

    async fn close(&self) -> std::io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeServer {
    connections: Mutex<Option<mpsc::Receiver<ServerEvent>>>,
    bind_delay: Duration,
    pub binds: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl FakeServer {
    /// Server that binds immediately; the returned sender simulates
    /// accepted connections.
    pub fn new() -> (Arc<Self>, mpsc::Sender<ServerEvent>) {
        Self::with_delay(Duration::ZERO)
    }

    /// Server whose bind resolves after `delay`, to exercise the
    /// metadata/listening race from the slow side.
    pub fn with_delay(delay: Duration) -> (Arc<Self>, mpsc::Sender<ServerEvent>) {
        let (tx, rx) = mpsc::channel(4);
        (
            Arc::new(Self {
                connections: Mutex::new(Some(rx)),
                bind_delay: delay,
                binds: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
            }),
            tx,
        )
    }

    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentServer for FakeServer {
    async fn bind(
        &self,
        port: u16,
        _swarm: Arc<dyn SwarmHandle>,
    ) -> Result<(Box<dyn ServerHandle>, mpsc::Receiver<ServerEvent>), Error> {
        if !self.bind_delay.is_zero() {
            tokio::time::sleep(self.bind_delay).await;
        }
        self.binds.fetch_add(1, Ordering::SeqCst);
        let connections = self
            .connections
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Server("already bound".to_string()))?;
        Ok((
            Box::new(FakeServerHandle {
                port,
                closed: self.closed.clone(),
            }),
            connections,
        ))
    }
}

// =============================================================================
// Fake player locator
// =============================================================================

/// Locator that answers every lookup with a fixed path (or nothing).
pub struct FakeLocator(pub Option<PathBuf>);

impl PlayerLocator for FakeLocator {
    fn locate(&self, _player: &PlayerKind) -> Option<PathBuf> {
        self.0.clone()
    }
}

// =============================================================================
// Fixture helpers
// =============================================================================

/// A three-file torrent with the middle file largest.
pub fn three_files() -> Vec<FileEntry> {
    vec![
        FileEntry {
            name: "sample.txt".to_string(),
            length: 10,
        },
        FileEntry {
            name: "movie.mkv".to_string(),
            length: 50,
        },
        FileEntry {
            name: "extras.mkv".to_string(),
            length: 30,
        },
    ]
}

pub fn wire(address: &str, choking: bool, downloaded: u64) -> WireStat {
    WireStat {
        remote_address: address.to_string(),
        peer_choking: choking,
        downloaded,
        ..Default::default()
    }
}
