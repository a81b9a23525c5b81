//! Point-in-time telemetry snapshots for rendering.
//!
//! Building a snapshot reads the swarm exactly once and mutates nothing, so
//! it is safe to call any number of times per tick. All values are copied
//! out; nothing borrows engine-owned state.

use std::fmt;

use crate::session::Session;
use crate::swarm::{PieceStat, WireStat};

/// Peer progress cell: floor percentage, or the seed sentinel when the peer
/// has every piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerProgress {
    /// Piece layout not yet known.
    Unknown,
    Percent(u8),
    Seed,
}

impl fmt::Display for PeerProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerProgress::Unknown => write!(f, "?"),
            PeerProgress::Percent(p) => write!(f, "{}%", p),
            PeerProgress::Seed => write!(f, "S"),
        }
    }
}

/// One row of the peer table.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRow {
    pub address: String,
    pub progress: PeerProgress,
    pub downloaded: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub tags: Vec<&'static str>,
    /// Outstanding piece request indices, oldest first.
    pub requests: Vec<u32>,
}

/// One row of the piece bar: an unfinished piece with block progress.
#[derive(Debug, Clone, PartialEq)]
pub struct PieceRow {
    pub index: u32,
    pub blocks: Vec<bool>,
}

/// Verification progress as last reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyProgress {
    pub percent_done: f64,
    pub percent_verified: f64,
}

/// Immutable view of the swarm for one render tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub name: String,
    pub download_speed: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub total_length: u64,
    /// Negative when the swarm is stalled; see [`eta_seconds`].
    pub eta_seconds: f64,
    pub eta_human: String,
    pub elapsed_seconds: u64,
    pub active_peers: usize,
    pub queued_peers: u32,
    pub blocked_peers: u32,
    pub hotswaps: u64,
    pub verify: Option<VerifyProgress>,
    pub pieces: Vec<PieceRow>,
    /// Peer rows in engine arrival order, as handed over.
    pub peers: Vec<PeerRow>,
}

/// Build a snapshot from the session's current swarm state.
pub fn snapshot(session: &Session) -> TelemetrySnapshot {
    let swarm = session.swarm();
    let stats = swarm.stats();
    let wires = swarm.wires();
    let piece_count = swarm.piece_count();
    let total_length = swarm.total_length();

    let eta = eta_seconds(total_length, stats.downloaded, stats.download_speed);

    TelemetrySnapshot {
        name: swarm.name(),
        download_speed: stats.download_speed,
        downloaded: stats.downloaded,
        uploaded: stats.uploaded,
        total_length,
        eta_seconds: eta,
        eta_human: humanize_duration(eta),
        elapsed_seconds: session.elapsed_seconds(),
        active_peers: wires.iter().filter(|w| is_active(w)).count(),
        queued_peers: stats.queued_peers,
        blocked_peers: stats.blocked_peers,
        hotswaps: session.hotswaps(),
        verify: session.verify_progress(),
        pieces: swarm
            .pieces()
            .into_iter()
            .filter(piece_in_progress)
            .map(|p| PieceRow {
                index: p.index,
                blocks: p.blocks,
            })
            .collect(),
        peers: wires.iter().map(|w| peer_row(w, piece_count)).collect(),
    }
}

/// `max(0, remaining) / speed`, dividing by -1 when the swarm is stalled.
/// The negative result is intentional and must not be clamped: the
/// humanizer ignores sign, so a stalled estimate reads as its magnitude.
pub fn eta_seconds(total_length: u64, downloaded: u64, speed: u64) -> f64 {
    let remaining = (total_length as f64 - downloaded as f64).max(0.0);
    let divisor = if speed > 0 { speed as f64 } else { -1.0 };
    remaining / divisor
}

/// A wire is active iff the peer is not choking us.
pub fn is_active(wire: &WireStat) -> bool {
    !wire.peer_choking
}

/// Floor percentage of pieces the peer has; the all-set case renders the
/// seed sentinel instead of `100%`.
pub fn peer_progress(wire: &WireStat, piece_count: u32) -> PeerProgress {
    if piece_count == 0 {
        return PeerProgress::Unknown;
    }
    let bits = wire
        .peer_pieces
        .iter()
        .take(piece_count as usize)
        .filter(|have| **have)
        .count() as u64;
    if bits == u64::from(piece_count) {
        PeerProgress::Seed
    } else {
        PeerProgress::Percent((100 * bits / u64::from(piece_count)) as u8)
    }
}

/// A piece shows in the bar iff it has written blocks and is unverified.
pub fn piece_in_progress(piece: &PieceStat) -> bool {
    piece.blocks_written > 0 && !piece.verified
}

fn peer_row(wire: &WireStat, piece_count: u32) -> PeerRow {
    let mut tags = Vec::new();
    if wire.peer_choking {
        tags.push("choked");
    }
    PeerRow {
        address: wire.remote_address.clone(),
        progress: peer_progress(wire, piece_count),
        downloaded: wire.downloaded,
        download_speed: wire.download_speed,
        upload_speed: wire.upload_speed,
        tags,
        requests: wire.requests.clone(),
    }
}

// =============================================================================
// Humanizers
// =============================================================================

/// Decimal-unit byte formatter ("1.4 MB", "890 B").
pub fn humanize_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Coarse human phrasing of a duration ("a few seconds", "2 hours").
/// Sign is ignored: a stalled transfer's negative estimate reads as its
/// magnitude, which is exactly what the status line wants.
pub fn humanize_duration(seconds: f64) -> String {
    let secs = seconds.abs();
    if secs < 45.0 {
        return "a few seconds".to_string();
    }
    if secs < 90.0 {
        return "a minute".to_string();
    }
    let minutes = (secs / 60.0).round() as u64;
    if minutes < 45 {
        return format!("{} minutes", minutes);
    }
    if minutes < 90 {
        return "an hour".to_string();
    }
    let hours = (secs / 3600.0).round() as u64;
    if hours < 22 {
        return format!("{} hours", hours);
    }
    if hours < 36 {
        return "a day".to_string();
    }
    let days = (secs / 86_400.0).round() as u64;
    if days < 26 {
        return format!("{} days", days);
    }
    if days < 46 {
        return "a month".to_string();
    }
    if days < 320 {
        return format!("{} months", (days as f64 / 30.0).round() as u64);
    }
    if days < 548 {
        return "a year".to_string();
    }
    format!("{} years", (days as f64 / 365.0).round() as u64)
}
