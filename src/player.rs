//! Player orchestration: playback targets, local subprocess players,
//! device-cast targets, and raw stdout piping.
//!
//! Local players are spawned and supervised to completion; their exit feeds
//! the session's exit decision. Device-cast targets are driven through each
//! protocol's controller command, which performs its own asynchronous
//! discovery; failures there are reported and never end the download.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error as CoreError;
use crate::swarm::FileEntry;

/// Default OMXPlayer audio output.
const OMX_DEFAULT_OUTPUT: &str = "hdmi";

// =============================================================================
// Player selection
// =============================================================================

/// The single selected playback target for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerKind {
    /// Apple TV cast target.
    Airplay,
    /// Chromecast cast target.
    Chromecast,
    /// Kodi/XBMC home-theater bridge.
    Xbmc,
    Vlc,
    Mplayer,
    Mpv,
    /// OMXPlayer with an audio output mode.
    Omx(String),
}

impl PlayerKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerKind::Airplay => "Airplay",
            PlayerKind::Chromecast => "Chromecast",
            PlayerKind::Xbmc => "XBMC",
            PlayerKind::Vlc => "VLC",
            PlayerKind::Mplayer => "MPlayer",
            PlayerKind::Mpv => "mpv",
            PlayerKind::Omx(_) => "OMXPlayer",
        }
    }

    /// Cast targets discover a device on the network; everything else is a
    /// local subprocess.
    pub fn is_cast(&self) -> bool {
        matches!(
            self,
            PlayerKind::Airplay | PlayerKind::Chromecast | PlayerKind::Xbmc
        )
    }

    /// Executable name for local players.
    fn executable(&self) -> &'static str {
        match self {
            PlayerKind::Vlc => "vlc",
            PlayerKind::Mplayer => "mplayer",
            PlayerKind::Mpv => "mpv",
            PlayerKind::Omx(_) => "omxplayer",
            _ => "",
        }
    }
}

impl std::fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The front-end's mutually exclusive player flags, prior to resolution.
#[derive(Debug, Clone, Default)]
pub struct PlayerFlags {
    pub airplay: bool,
    pub chromecast: bool,
    pub xbmc: bool,
    pub vlc: bool,
    pub mplayer: bool,
    pub mpv: bool,
    /// `Some(mode)` when OMXPlayer is selected; an empty mode selects the
    /// default output (hdmi).
    pub omx: Option<String>,
}

/// Selecting more than one player is a configuration error, rejected before
/// a session ever starts.
#[derive(Debug, Error)]
#[error("more than one player selected: {0}")]
pub struct MultiplePlayersError(pub String);

impl PlayerFlags {
    /// Resolve the flag set into at most one player kind.
    pub fn resolve(self) -> Result<Option<PlayerKind>, MultiplePlayersError> {
        let mut picked = Vec::new();
        if self.airplay {
            picked.push(PlayerKind::Airplay);
        }
        if self.chromecast {
            picked.push(PlayerKind::Chromecast);
        }
        if self.xbmc {
            picked.push(PlayerKind::Xbmc);
        }
        if self.vlc {
            picked.push(PlayerKind::Vlc);
        }
        if self.mplayer {
            picked.push(PlayerKind::Mplayer);
        }
        if self.mpv {
            picked.push(PlayerKind::Mpv);
        }
        if let Some(mode) = self.omx {
            let mode = if mode.is_empty() {
                OMX_DEFAULT_OUTPUT.to_string()
            } else {
                mode
            };
            picked.push(PlayerKind::Omx(mode));
        }
        if picked.len() > 1 {
            let names: Vec<_> = picked.iter().map(|p| p.display_name()).collect();
            return Err(MultiplePlayersError(names.join(", ")));
        }
        Ok(picked.into_iter().next())
    }
}

// =============================================================================
// Playback targets
// =============================================================================

/// The two URL forms for a served file: one reachable from the LAN (cast
/// devices), one over loopback (local players).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackTarget {
    pub lan: String,
    pub local: String,
}

impl PlaybackTarget {
    pub fn new(lan_host: &str, port: u16, index: usize) -> Self {
        let host = if lan_host.contains(':') {
            format!("[{}]", lan_host)
        } else {
            lan_host.to_string()
        };
        Self {
            lan: format!("http://{}:{}/{}", host, port, index),
            local: format!("http://localhost:{}/{}", port, index),
        }
    }
}

/// Build both URL forms using the machine's network-visible address,
/// falling back to loopback when no interface can be resolved.
pub fn resolve_target(port: u16, index: usize) -> PlaybackTarget {
    let lan_host = match local_ip_address::local_ip() {
        Ok(ip) => ip.to_string(),
        Err(err) => {
            warn!(error = %err, "no LAN address; cast URLs fall back to loopback");
            "127.0.0.1".to_string()
        }
    };
    PlaybackTarget::new(&lan_host, port, index)
}

/// Index of the largest file by byte length; the first such file wins ties.
pub fn default_file_index(files: &[FileEntry]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, file) in files.iter().enumerate() {
        match best {
            Some(b) if files[b].length >= file.length => {}
            _ => best = Some(i),
        }
    }
    best
}

// =============================================================================
// Executable location
// =============================================================================

/// Resolves a local player's executable when it is not on the search path.
/// Kept behind a trait so tests inject a fake instead of probing the host.
pub trait PlayerLocator: Send + Sync {
    fn locate(&self, player: &PlayerKind) -> Option<PathBuf>;
}

/// PATH lookup first, then known per-platform install locations.
pub struct SystemLocator;

impl PlayerLocator for SystemLocator {
    fn locate(&self, player: &PlayerKind) -> Option<PathBuf> {
        let name = player.executable();
        if name.is_empty() {
            return None;
        }
        if let Some(path) = find_in_path(name) {
            return Some(path);
        }
        install_candidates(player).into_iter().find(|p| p.is_file())
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
}

/// Known install locations, most likely first.
fn install_candidates(player: &PlayerKind) -> Vec<PathBuf> {
    match player {
        PlayerKind::Vlc if cfg!(target_os = "macos") => {
            let mut candidates = vec![PathBuf::from("/Applications/VLC.app/Contents/MacOS/VLC")];
            if let Some(home) = std::env::var_os("HOME") {
                candidates
                    .push(PathBuf::from(home).join("Applications/VLC.app/Contents/MacOS/VLC"));
            }
            candidates
        }
        PlayerKind::Vlc if cfg!(windows) => ["ProgramFiles", "ProgramFiles(x86)"]
            .iter()
            .filter_map(std::env::var_os)
            .map(|dir| PathBuf::from(dir).join("VideoLAN").join("VLC").join("vlc.exe"))
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Command construction
// =============================================================================

/// Arguments for a local player: the player template, the loopback URL and
/// the optional subtitle argument, in the shape each player expects.
pub fn local_args(
    kind: &PlayerKind,
    target: &PlaybackTarget,
    subtitles: Option<&Path>,
    debug: bool,
) -> Vec<String> {
    let mut args = Vec::new();
    match kind {
        PlayerKind::Vlc => {
            args.push(target.local.clone());
            if debug {
                args.extend(["-q", "--play-and-exit"].map(String::from));
            } else {
                args.extend(
                    [
                        "--play-and-exit",
                        "--extraintf=http:logger",
                        "--verbose=2",
                        "--file-logging",
                        "--logfile=vlc-log.txt",
                    ]
                    .map(String::from),
                );
            }
            if let Some(sub) = subtitles {
                args.push(format!("--sub-file={}", sub.display()));
            }
        }
        PlayerKind::Mplayer => {
            args.extend(["-ontop", "-really-quiet", "-noidx", "-loop", "0"].map(String::from));
            if let Some(sub) = subtitles {
                args.push("-sub".to_string());
                args.push(sub.display().to_string());
            }
            args.push(target.local.clone());
        }
        PlayerKind::Mpv => {
            args.extend(["--ontop", "--really-quiet", "--loop=no"].map(String::from));
            if let Some(sub) = subtitles {
                args.push(format!("--sub-file={}", sub.display()));
            }
            args.push(target.local.clone());
        }
        PlayerKind::Omx(mode) => {
            args.extend(["-r", "-o"].map(String::from));
            args.push(mode.clone());
            if let Some(sub) = subtitles {
                args.push("--subtitles".to_string());
                args.push(sub.display().to_string());
            }
            args.push(target.local.clone());
        }
        PlayerKind::Airplay | PlayerKind::Chromecast | PlayerKind::Xbmc => {}
    }
    args
}

/// Controller command for a cast target. Each controller performs its own
/// device discovery and plays the LAN-visible URL.
pub fn cast_command(kind: &PlayerKind, lan_url: &str) -> (&'static str, Vec<String>) {
    match kind {
        PlayerKind::Chromecast => ("catt", vec!["cast".to_string(), lan_url.to_string()]),
        PlayerKind::Airplay => ("atvremote", vec![format!("play_url={}", lan_url)]),
        PlayerKind::Xbmc => (
            "kodi-send",
            vec![format!("--action=PlayMedia({})", lan_url)],
        ),
        _ => ("", Vec::new()),
    }
}

// =============================================================================
// Launch and supervision
// =============================================================================

/// Completion notifications routed into the session dispatcher.
#[derive(Debug)]
pub enum PlayerEvent {
    /// Local subprocess finished; `Ok` for exit status zero.
    Exited(Result<(), String>),
}

/// The one player instance of a session.
pub struct PlayerProcess {
    pub kind: PlayerKind,
    /// OS process id for local players.
    pub pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
}

impl PlayerProcess {
    /// Ask the supervisor to kill the subprocess. Shutdown path only;
    /// normal completion never goes through here.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill.take() {
            let _ = tx.send(());
        }
    }
}

/// Launches the configured player and supervises it.
pub struct PlayerOrchestrator {
    locator: Box<dyn PlayerLocator>,
}

impl PlayerOrchestrator {
    pub fn new() -> Self {
        Self {
            locator: Box::new(SystemLocator),
        }
    }

    pub fn with_locator(locator: Box<dyn PlayerLocator>) -> Self {
        Self { locator }
    }

    /// Launch `kind` against `target`. Local players spawn and are
    /// supervised to completion; spawn failures are fatal. Cast targets run
    /// through their controller command, and failures there are logged, not
    /// returned.
    pub fn launch(
        &self,
        kind: &PlayerKind,
        target: &PlaybackTarget,
        config: &Config,
    ) -> Result<(PlayerProcess, mpsc::Receiver<PlayerEvent>), CoreError> {
        let (events_tx, events_rx) = mpsc::channel(4);
        if kind.is_cast() {
            launch_cast(kind.clone(), target.lan.clone());
            // Cast controllers have no completion to supervise; the sender
            // drops here and the channel just closes.
            drop(events_tx);
            return Ok((
                PlayerProcess {
                    kind: kind.clone(),
                    pid: None,
                    kill: None,
                },
                events_rx,
            ));
        }

        let exe = self
            .locator
            .locate(kind)
            .ok_or_else(|| CoreError::PlayerNotFound(kind.display_name().to_string()))?;
        let args = local_args(kind, target, config.subtitles.as_deref(), config.debug);
        let mut child = Command::new(&exe)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| CoreError::PlaybackLaunch(format!("{}: {}", exe.display(), err)))?;

        let pid = child.id();
        let name = kind.display_name();
        let (kill_tx, mut kill_rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let result = match status {
                        Ok(status) if status.success() => Ok(()),
                        Ok(status) => Err(format!("{} exited with {}", name, status)),
                        Err(err) => Err(format!("{} wait failed: {}", name, err)),
                    };
                    let _ = events_tx.send(PlayerEvent::Exited(result)).await;
                }
                _ = &mut kill_rx => {
                    let _ = child.kill().await;
                }
            }
        });

        debug!(player = name, pid, "player launched");
        Ok((
            PlayerProcess {
                kind: kind.clone(),
                pid,
                kill: Some(kill_tx),
            },
            events_rx,
        ))
    }
}

impl Default for PlayerOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the cast controller to completion in the background. Discovery and
/// connection failures are reported but never fatal to the session.
fn launch_cast(kind: PlayerKind, lan_url: String) {
    let (controller, args) = cast_command(&kind, &lan_url);
    tokio::spawn(async move {
        let outcome = Command::new(controller)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match outcome {
            Ok(status) if status.success() => {
                debug!(target = kind.display_name(), url = %lan_url, "cast started");
            }
            Ok(status) => {
                let err = CoreError::DeviceDiscovery(format!(
                    "{} controller exited with {}",
                    kind.display_name(),
                    status
                ));
                warn!("{}", err);
            }
            Err(spawn_err) => {
                let err = CoreError::DeviceDiscovery(format!(
                    "{} controller ({}): {}",
                    kind.display_name(),
                    controller,
                    spawn_err
                ));
                warn!("{}", err);
            }
        }
    });
}

/// Pipe one file's byte stream to process standard output.
pub fn pipe_to_stdout(
    mut stream: Box<dyn AsyncRead + Send + Unpin>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        if let Err(err) = tokio::io::copy(&mut stream, &mut out).await {
            warn!(error = %err, "stdout pipe ended early");
        }
    })
}
