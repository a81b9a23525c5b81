//! Fixed-interval console status view.
//!
//! One render task per session: every tick clears the screen, takes a fresh
//! telemetry snapshot, and lays out a bounded number of rows against the
//! terminal height measured that tick. Layout is pure string building and
//! cannot fail; write errors to the console are ignored.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::QueueableCommand;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::session::{Session, SessionState};
use crate::swarm::FileEntry;
use crate::telemetry::{
    self, humanize_bytes, PeerRow, PieceRow, TelemetrySnapshot, VerifyProgress,
};

const RENDER_INTERVAL: Duration = Duration::from_millis(500);

/// Rows kept free below the peer table.
const PEER_TABLE_MARGIN: usize = 4;

const FALLBACK_TERMINAL_HEIGHT: usize = 24;

/// Owns the render loop for one session.
pub struct StatusRenderer {
    config: Arc<Config>,
    task: Option<JoinHandle<()>>,
}

impl StatusRenderer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, task: None }
    }

    /// Begin the fixed-interval render loop. No-op when quiet or already
    /// running. Skipped ticks are dropped, never replayed in a burst.
    pub fn start(&mut self, session: Arc<Session>) {
        if self.config.quiet || self.task.is_some() {
            return;
        }
        let config = self.config.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(RENDER_INTERVAL);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                draw(&session, &config);
            }
        }));
    }

    /// Cancel the render loop. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for StatusRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn draw(session: &Session, config: &Config) {
    let height = terminal::size()
        .map(|(_, h)| h as usize)
        .unwrap_or(FALLBACK_TERMINAL_HEIGHT);
    let lines = match session.state() {
        SessionState::Created | SessionState::AwaitingMetadata => {
            vec![metadata_line(session.swarm().wires().len())]
        }
        SessionState::Verifying => match session.verify_progress() {
            Some(progress) => vec![verify_line(&progress)],
            None => vec![metadata_line(session.swarm().wires().len())],
        },
        _ => {
            let snapshot = telemetry::snapshot(session);
            layout(&snapshot, config, session.stream_url().as_deref(), height)
        }
    };
    write_screen(&lines);
}

fn write_screen(lines: &[String]) {
    let mut out = io::stdout();
    let mut put = || -> io::Result<()> {
        out.queue(Clear(ClearType::All))?.queue(MoveTo(0, 0))?;
        for line in lines {
            out.queue(Print(line))?.queue(Print("\r\n"))?;
        }
        out.flush()
    };
    let _ = put();
}

// =============================================================================
// Layout
// =============================================================================

/// Lay out the full status view as styled rows, bounded by `height`.
/// The peer-table budget is whatever is left after the rows above it plus
/// the margin; peers beyond it collapse into a single `... and N more` row.
pub fn layout(
    snapshot: &TelemetrySnapshot,
    config: &Config,
    stream_url: Option<&str>,
    height: usize,
) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(player) = &config.player {
        lines.push(format!(
            "{} {}",
            "Streaming to".green(),
            player.display_name().bold()
        ));
    }
    if let Some(url) = stream_url {
        lines.push(format!(
            "{} {}",
            "server running at".green(),
            url.to_string().bold()
        ));
    }
    if let Some(out) = &config.out {
        lines.push(format!(
            "{} {}",
            "downloading to".green(),
            out.display().to_string().bold()
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "{} {}",
        "downloading:".green(),
        snapshot.name.clone().bold()
    ));
    lines.push(summary_line(snapshot));
    lines.push(timing_line(snapshot));
    lines.push(String::new());

    for piece in &snapshot.pieces {
        lines.push(piece_line(piece));
    }
    lines.push(String::new());

    let budget = height.saturating_sub(lines.len() + PEER_TABLE_MARGIN);
    let listed = snapshot.peers.len().min(budget);
    for row in &snapshot.peers[..listed] {
        lines.push(peer_line(row));
    }
    if snapshot.peers.len() > listed {
        lines.push(String::new());
        lines.push(format!("... and {} more", snapshot.peers.len() - listed));
    }
    lines.push(String::new());

    lines
}

fn summary_line(s: &TelemetrySnapshot) -> String {
    format!(
        "{} {}  {} {}/{}  {} {}  {} {}  {} {}",
        "speed:".green(),
        format!("{}/s", humanize_bytes(s.download_speed)).bold(),
        "downloaded:".green(),
        humanize_bytes(s.downloaded).bold(),
        humanize_bytes(s.total_length).bold(),
        "uploaded:".green(),
        humanize_bytes(s.uploaded).bold(),
        "peers:".green(),
        format!("{}/{}", s.active_peers, s.peers.len()).bold(),
        "hotswaps:".green(),
        s.hotswaps.to_string().bold()
    )
}

fn timing_line(s: &TelemetrySnapshot) -> String {
    format!(
        "{} {}  {} {}  {} {}  {} {}",
        "time remaining:".green(),
        format!("{} remaining", s.eta_human).bold(),
        "total time:".green(),
        format!("{}s", s.elapsed_seconds).bold(),
        "queued peers:".green(),
        s.queued_peers.to_string().bold(),
        "blocked:".green(),
        s.blocked_peers.to_string().bold()
    )
}

fn piece_line(piece: &PieceRow) -> String {
    let mut line = cell(&piece.index.to_string(), 4).cyan().to_string();
    line.push(' ');
    for written in &piece.blocks {
        let block = if *written { "█".green() } else { "█".red() };
        line.push_str(&block.to_string());
    }
    line
}

fn peer_line(row: &PeerRow) -> String {
    let requests = row
        .requests
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{} {} {} {} {} {}{}",
        cell(&row.progress.to_string(), 3),
        cell(&row.address, 25).magenta(),
        cell(&humanize_bytes(row.downloaded), 10),
        cell(&format!("{}/s", humanize_bytes(row.download_speed)), 10).cyan(),
        cell(&format!("{}/s", humanize_bytes(row.upload_speed)), 10).red(),
        cell(&row.tags.join(", "), 15).grey(),
        cell(&requests, 15).cyan()
    )
}

fn metadata_line(peers: usize) -> String {
    format!(
        "{} {} {}",
        "fetching torrent metadata from".green(),
        peers.to_string().bold(),
        "peers".green()
    )
}

fn verify_line(progress: &VerifyProgress) -> String {
    format!(
        "{} {} ({} {})",
        "verifying existing torrent".green(),
        format!("{}%", progress.percent_done.floor() as u64).bold(),
        format!("{}%", progress.percent_verified.floor() as u64).bold(),
        "passed verification".green()
    )
}

/// Pad or truncate to a fixed cell width.
fn cell(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{:<width$}", truncated, width = width)
}

// =============================================================================
// One-shot console output
// =============================================================================

/// Print the torrent's files with their stream indexes (list mode).
pub fn print_file_list(files: &[FileEntry]) {
    for (i, file) in files.iter().enumerate() {
        println!(
            "{} : {} {}",
            cell(&i.to_string(), 3).bold(),
            file.name.clone().magenta(),
            format!("({})", humanize_bytes(file.length)).blue()
        );
    }
}

/// Completion summary: peers that actually delivered data over the total.
pub fn print_done_summary(delivering: usize, total: usize, elapsed_seconds: u64) {
    println!(
        "torrent downloaded {} from {} {} in {}!",
        "successfully".green(),
        format!("{}/{}", delivering, total).bold(),
        "peers".green(),
        format!("{}s", elapsed_seconds).bold()
    );
}

/// Teardown has begun; destroying the swarm can take a while, so tell the
/// operator before the quiet stretch.
pub fn print_shutdown_notice() {
    println!();
    println!("{}", "swarmplay is exiting...".green());
}
