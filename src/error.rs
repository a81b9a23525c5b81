//! Error taxonomy and the single fatal-reporting funnel.
//!
//! Every fatal path ends up in [`report_fatal`] so the operator always sees
//! one consistent `ERROR:` line and the front-end exits nonzero. Device
//! discovery failures are the one non-fatal variant: they are logged and the
//! download keeps going.

use crossterm::style::Stylize;
use thiserror::Error;

/// Errors surfaced by the session core.
#[derive(Debug, Error)]
pub enum Error {
    /// The swarm engine could not resolve the torrent reference
    /// (magnet URI, info hash, path or URL).
    #[error("invalid torrent identifier: {0}")]
    InvalidIdentifier(String),

    /// No executable could be resolved for the requested local player.
    #[error("player not found: {0}. Install it first.")]
    PlayerNotFound(String),

    /// The player subprocess could not be spawned, or died abnormally.
    #[error("failed to launch player: {0}")]
    PlaybackLaunch(String),

    /// A cast target could not be discovered or commanded. Never fatal.
    #[error("device discovery failed: {0}")]
    DeviceDiscovery(String),

    /// Unrecoverable failure reported by the swarm engine.
    #[error("swarm engine error: {0}")]
    Swarm(String),

    /// The content server could not bind or serve.
    #[error("content server error: {0}")]
    Server(String),
}

impl Error {
    /// Everything except device discovery terminates the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::DeviceDiscovery(_))
    }
}

/// Process exit codes for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean completion without ever serving a connection, or graceful
    /// signal-driven shutdown.
    Clean = 0,
    /// Any fatal error.
    Fatal = 1,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

/// Print the operator-visible line for a fatal failure and hand back the
/// exit code the front-end must terminate with.
pub fn report_fatal(err: &Error) -> i32 {
    eprintln!("{} {}", "ERROR:".red(), err);
    ExitCode::Fatal.into()
}
