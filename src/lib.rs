//! swarmplay - session orchestrator for streaming torrents to media players
//!
//! Turns an in-progress torrent download into a live operator console:
//! drives the session lifecycle, renders swarm telemetry at a fixed
//! interval, launches and supervises a media player (or pipes raw bytes to
//! stdout), and tears everything down in order on a signal.
//!
//! The BitTorrent engine and the HTTP content server are collaborators
//! behind the trait contracts in [`swarm`] and [`content`]; a CLI front-end
//! builds a [`Config`] and calls [`session::run`].
//!
//! # Modules
//!
//! - `config` - immutable per-run settings
//! - `session` - lifecycle state machine and the event dispatcher
//! - `telemetry` - pure swarm snapshots for rendering
//! - `render` - fixed-interval console status view
//! - `player` - local players, cast targets, stdout piping
//! - `shutdown` - signal-driven teardown sequencing
//! - `swarm` / `content` - collaborator contracts
//! - `error` - taxonomy and the fatal-reporting funnel

pub mod config;
pub mod content;
pub mod error;
pub mod player;
pub mod render;
pub mod session;
pub mod shutdown;
pub mod swarm;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ExitCode};
pub use player::{
    PlaybackTarget, PlayerFlags, PlayerKind, PlayerLocator, PlayerOrchestrator, PlayerProcess,
};
pub use session::{run, Session, SessionController, SessionState};
pub use shutdown::{ShutdownSequencer, ShutdownTrigger};
pub use swarm::{
    FileEntry, PieceStat, SwarmEngine, SwarmEvent, SwarmHandle, SwarmOptions, SwarmStats, WireStat,
};
pub use telemetry::{snapshot, TelemetrySnapshot};
