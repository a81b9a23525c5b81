//! Session lifecycle and the event dispatcher.
//!
//! One `Session` per run, owned by the controller. Every state mutation
//! happens inside the dispatch loop: swarm lifecycle events, the server
//! bind racing metadata arrival, the first accepted connection, player
//! completion, and the shutdown request are all funneled through one
//! `tokio::select!`. The renderer is the only other task and it only reads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::content::{ContentServer, ServerEvent, ServerHandle};
use crate::error::{report_fatal, Error, ExitCode};
use crate::player::{self, PlayerEvent, PlayerLocator, PlayerOrchestrator, PlayerProcess};
use crate::render::{self, StatusRenderer};
use crate::shutdown::ShutdownSequencer;
use crate::swarm::{SwarmEngine, SwarmEvent, SwarmHandle, SwarmOptions};
use crate::telemetry::VerifyProgress;

/// Lifecycle states for one download session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    AwaitingMetadata,
    /// Local data is being re-checked. Transient; never blocks `Ready`.
    Verifying,
    Ready,
    Downloading,
    Done,
    Destroyed,
}

/// One download run. Created once, destroyed at most once.
pub struct Session {
    id: String,
    started: Instant,
    swarm: Arc<dyn SwarmHandle>,
    state: Mutex<SessionState>,
    /// Monotonic: set on the first accepted content-server connection,
    /// never reset. Solely determines the graceful-exit decision.
    serving: AtomicBool,
    hotswaps: AtomicU64,
    verify: Mutex<Option<VerifyProgress>>,
    stream_url: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    fn new(swarm: Arc<dyn SwarmHandle>) -> Self {
        Self {
            id: swarm.id(),
            started: Instant::now(),
            swarm,
            state: Mutex::new(SessionState::Created),
            serving: AtomicBool::new(false),
            hotswaps: AtomicU64::new(0),
            verify: Mutex::new(None),
            stream_url: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn swarm(&self) -> &dyn SwarmHandle {
        self.swarm.as_ref()
    }

    pub(crate) fn swarm_handle(&self) -> Arc<dyn SwarmHandle> {
        self.swarm.clone()
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        debug!(from = ?*state, to = ?next, "session state");
        *state = next;
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_serving(&self) {
        self.serving.store(true, Ordering::Relaxed);
    }

    pub fn hotswaps(&self) -> u64 {
        self.hotswaps.load(Ordering::Relaxed)
    }

    pub(crate) fn note_hotswap(&self) {
        self.hotswaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn verify_progress(&self) -> Option<VerifyProgress> {
        *lock(&self.verify)
    }

    pub(crate) fn set_verify(&self, progress: VerifyProgress) {
        *lock(&self.verify) = Some(progress);
    }

    /// LAN-visible URL of the selected file, once the server is up.
    pub fn stream_url(&self) -> Option<String> {
        lock(&self.stream_url).clone()
    }

    pub(crate) fn set_stream_url(&self, url: String) {
        *lock(&self.stream_url) = Some(url);
    }
}

/// Drive a full run and hand back the process exit code for the front-end.
pub async fn run(
    config: Config,
    engine: &dyn SwarmEngine,
    server: Arc<dyn ContentServer>,
) -> i32 {
    match SessionController::start(config, engine).await {
        Ok(controller) => controller.run(server).await,
        Err(err) => report_fatal(&err),
    }
}

/// Owns the session and its dispatch loop.
pub struct SessionController {
    config: Arc<Config>,
    session: Arc<Session>,
    events: mpsc::Receiver<SwarmEvent>,
    players: PlayerOrchestrator,
}

impl SessionController {
    /// Open the swarm and enter `AwaitingMetadata`. Fails with
    /// [`Error::InvalidIdentifier`] when the engine cannot resolve the
    /// torrent reference.
    pub async fn start(config: Config, engine: &dyn SwarmEngine) -> Result<Self, Error> {
        let config = config.finalize();
        let options = SwarmOptions {
            download_dir: config.out.clone(),
            blocklist: config.blocklist.clone(),
        };
        let (swarm, events) = engine.open(&config.torrent_id, options).await?;
        let session = Arc::new(Session::new(swarm));
        session.set_state(SessionState::AwaitingMetadata);
        Ok(Self {
            config: Arc::new(config),
            session,
            events,
            players: PlayerOrchestrator::new(),
        })
    }

    /// Swap the player locator; tests inject fakes here.
    pub fn set_player_locator(&mut self, locator: Box<dyn PlayerLocator>) {
        self.players = PlayerOrchestrator::with_locator(locator);
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Run with signal handlers per the output mode: a fixed destination
    /// runs to natural completion, everything else is interruptible.
    pub async fn run(self, server: Arc<dyn ContentServer>) -> i32 {
        let shutdown = ShutdownSequencer::for_output_mode(self.config.out.is_some());
        self.run_with(server, shutdown).await
    }

    /// Run with a caller-supplied shutdown sequencer.
    pub async fn run_with(self, server: Arc<dyn ContentServer>, shutdown: ShutdownSequencer) -> i32 {
        let SessionController {
            config,
            session,
            events,
            players,
        } = self;

        let mut renderer = StatusRenderer::new(config.clone());
        renderer.start(session.clone());

        let mut dispatcher = Dispatcher {
            config,
            session,
            players,
            server_handle: None,
            player: None,
            pipe_task: None,
            metadata_ready: false,
            server_listening: false,
            ready_fired: false,
        };
        let outcome = dispatcher
            .dispatch(events, server, shutdown, &mut renderer)
            .await;
        renderer.stop();
        match outcome {
            Ok(code) => code,
            Err(err) => report_fatal(&err),
        }
    }
}

type BindResult = Result<(Box<dyn ServerHandle>, mpsc::Receiver<ServerEvent>), Error>;

/// One step chosen by the select loop. Arms only touch their channel; all
/// session-state handling happens afterwards on the dispatcher.
enum Step {
    Swarm(Option<SwarmEvent>),
    Bound(Result<BindResult, tokio::task::JoinError>),
    Conn(Option<ServerEvent>),
    Player(Option<PlayerEvent>),
    Shutdown,
}

enum ReadyOutcome {
    /// The run is complete (list mode).
    Finished(i32),
    /// Keep dispatching; a launched player reports through the receiver.
    Continue(Option<mpsc::Receiver<PlayerEvent>>),
}

struct Dispatcher {
    config: Arc<Config>,
    session: Arc<Session>,
    players: PlayerOrchestrator,
    server_handle: Option<Box<dyn ServerHandle>>,
    player: Option<PlayerProcess>,
    pipe_task: Option<JoinHandle<()>>,
    metadata_ready: bool,
    server_listening: bool,
    ready_fired: bool,
}

impl Dispatcher {
    async fn dispatch(
        &mut self,
        events: mpsc::Receiver<SwarmEvent>,
        server: Arc<dyn ContentServer>,
        mut shutdown: ShutdownSequencer,
        renderer: &mut StatusRenderer,
    ) -> Result<i32, Error> {
        let mut events = Some(events);
        let mut bind_task = if self.config.list {
            None
        } else {
            let swarm = self.session.swarm_handle();
            let port = self.config.port;
            Some(tokio::spawn(async move { server.bind(port, swarm).await }))
        };
        let mut conn_events: Option<mpsc::Receiver<ServerEvent>> = None;
        let mut player_events: Option<mpsc::Receiver<PlayerEvent>> = None;

        loop {
            let step = tokio::select! {
                event = recv_opt(&mut events) => Step::Swarm(event),
                bound = join_opt(&mut bind_task) => Step::Bound(bound),
                event = recv_opt(&mut conn_events) => Step::Conn(event),
                event = recv_opt(&mut player_events) => Step::Player(event),
                _ = shutdown.requested() => Step::Shutdown,
            };

            match step {
                Step::Swarm(Some(event)) => {
                    if let Some(code) = self.on_swarm_event(event, &mut player_events)? {
                        return Ok(code);
                    }
                }
                Step::Swarm(None) => events = None,

                Step::Bound(Ok(Ok((handle, connections)))) => {
                    bind_task = None;
                    debug!(port = handle.port(), "content server listening");
                    self.server_handle = Some(handle);
                    conn_events = Some(connections);
                    self.server_listening = true;
                    if let Some(code) = self.after_ready_precondition(&mut player_events)? {
                        return Ok(code);
                    }
                }
                Step::Bound(Ok(Err(err))) => return Err(err),
                Step::Bound(Err(join_err)) => {
                    return Err(Error::Server(format!("server task failed: {}", join_err)));
                }

                Step::Conn(Some(ServerEvent::Connection)) => self.session.mark_serving(),
                Step::Conn(None) => conn_events = None,

                Step::Player(Some(PlayerEvent::Exited(Ok(())))) => {
                    debug!("player completed");
                    if let Some(code) = self.exit_decision() {
                        return Ok(code);
                    }
                }
                Step::Player(Some(PlayerEvent::Exited(Err(reason)))) => {
                    return Err(Error::PlaybackLaunch(reason));
                }
                Step::Player(None) => player_events = None,

                Step::Shutdown => return Ok(self.teardown(renderer).await),
            }
        }
    }

    fn on_swarm_event(
        &mut self,
        event: SwarmEvent,
        player_events: &mut Option<mpsc::Receiver<PlayerEvent>>,
    ) -> Result<Option<i32>, Error> {
        match event {
            SwarmEvent::MetadataReady => {
                self.metadata_ready = true;
                self.after_ready_precondition(player_events)
            }
            SwarmEvent::Verifying {
                percent_done,
                percent_verified,
            } => {
                self.session.set_verify(VerifyProgress {
                    percent_done,
                    percent_verified,
                });
                if matches!(
                    self.session.state(),
                    SessionState::AwaitingMetadata | SessionState::Verifying
                ) {
                    self.session.set_state(SessionState::Verifying);
                }
                Ok(None)
            }
            SwarmEvent::HotSwap => {
                self.session.note_hotswap();
                Ok(None)
            }
            SwarmEvent::Done => Ok(self.on_done()),
            SwarmEvent::Error(reason) => Err(Error::Swarm(reason)),
        }
    }

    /// Metadata arrival and server listening race; whichever lands second
    /// fires the `Ready` transition, exactly once.
    fn after_ready_precondition(
        &mut self,
        player_events: &mut Option<mpsc::Receiver<PlayerEvent>>,
    ) -> Result<Option<i32>, Error> {
        if self.ready_fired
            || !ready_now(self.metadata_ready, self.server_listening, self.config.list)
        {
            return Ok(None);
        }
        self.ready_fired = true;
        match self.on_ready()? {
            ReadyOutcome::Finished(code) => Ok(Some(code)),
            ReadyOutcome::Continue(events) => {
                *player_events = events;
                Ok(None)
            }
        }
    }

    fn on_ready(&mut self) -> Result<ReadyOutcome, Error> {
        self.session.set_state(SessionState::Ready);
        let swarm = self.session.swarm_handle();

        if self.config.list {
            render::print_file_list(&swarm.files());
            self.session.set_state(SessionState::Done);
            return Ok(ReadyOutcome::Finished(ExitCode::Clean.into()));
        }

        let files = swarm.files();
        let index = self
            .config
            .index
            .or_else(|| player::default_file_index(&files))
            .unwrap_or(0);
        let target = player::resolve_target(self.config.port, index);
        self.session.set_stream_url(target.lan.clone());

        if self.config.player.is_some() {
            swarm.select_file(index);
        }
        if self.config.stdout {
            self.pipe_task = Some(player::pipe_to_stdout(swarm.file_stream(index)));
        }

        let mut player_events = None;
        if let Some(kind) = self.config.player.clone() {
            let (process, events) = self.players.launch(&kind, &target, &self.config)?;
            self.player = Some(process);
            player_events = Some(events);
        }

        self.session.set_state(SessionState::Downloading);
        Ok(ReadyOutcome::Continue(player_events))
    }

    fn on_done(&mut self) -> Option<i32> {
        self.session.set_state(SessionState::Done);
        if !self.config.quiet {
            let wires = self.session.swarm().wires();
            let delivering = wires.iter().filter(|w| w.downloaded > 0).count();
            render::print_done_summary(delivering, wires.len(), self.session.elapsed_seconds());
        }
        self.exit_decision()
    }

    /// Never served a connection: clean exit now. Serving: keep running, a
    /// consumer is still reading.
    fn exit_decision(&self) -> Option<i32> {
        if self.session.is_serving() {
            None
        } else {
            Some(ExitCode::Clean.into())
        }
    }

    /// Ordered teardown: renderer, operator notice, player, server, swarm.
    async fn teardown(&mut self, renderer: &mut StatusRenderer) -> i32 {
        renderer.stop();
        render::print_shutdown_notice();
        if let Some(player) = self.player.as_mut() {
            player.kill();
        }
        if let Some(server) = self.server_handle.take() {
            if let Err(err) = server.close().await {
                warn!(error = %err, "content server close failed");
            }
        }
        let code = match self.session.swarm().destroy().await {
            Ok(()) => ExitCode::Clean.into(),
            Err(err) => {
                warn!(error = %err, "swarm teardown failed");
                ExitCode::Fatal.into()
            }
        };
        if let Some(pipe) = self.pipe_task.take() {
            pipe.abort();
        }
        self.session.set_state(SessionState::Destroyed);
        code
    }
}

fn ready_now(metadata_ready: bool, server_listening: bool, list_mode: bool) -> bool {
    metadata_ready && (list_mode || server_listening)
}

async fn recv_opt<T>(slot: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match slot {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn join_opt<T>(
    slot: &mut Option<JoinHandle<T>>,
) -> Result<T, tokio::task::JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
