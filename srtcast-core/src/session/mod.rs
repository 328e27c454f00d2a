//! Streaming session supervision
//!
//! The [`Supervisor`] owns at most one live engine process. Starting is
//! serialized behind a mutex so two racing `start` calls can never spawn two
//! engines. Each session gets two tasks:
//!
//! - a diagnostic reader that forwards every stderr line as a log event and
//!   drives the state machine from the markers it finds;
//! - a monitor that owns the child process, handles stop/abort requests and
//!   applies the exit once the reader has drained (bounded).
//!
//! A session holds the slot until its monitor has reaped the child, even
//! after a failure marker has already made it `Errored`.

mod classify;
mod launcher;
mod state;

pub use classify::{classify, DiagnosticReader, LineClass, CONNECT_MARKERS, FAILURE_MARKERS};
pub use launcher::{Launcher, SystemLauncher};
pub use state::{SessionInput, SessionState};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::EncodingProfile;
use crate::endpoint::{safe_url, StreamProtocol};
use crate::error::{Result, SrtcastError};
use crate::events::{EventBus, SessionEvent};
use crate::plan::InvocationPlan;
use crate::types::{CaptureSource, SessionId};

/// Default time between the termination signal and a forced kill
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Default bound on draining diagnostics after exit
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor tuning
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Grace period after the termination signal
    pub stop_grace: Duration,
    /// Bound on reading leftover diagnostics once the engine has exited
    pub drain_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_grace: DEFAULT_STOP_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// What a session is streaming, kept for status reporting
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub source: Option<CaptureSource>,
    pub profile: Option<EncodingProfile>,
}

/// Snapshot of the current or most recent session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session: Option<SessionId>,
    pub source: Option<CaptureSource>,
    pub profile: Option<EncodingProfile>,
    /// Destination with secrets masked
    pub destination: Option<String>,
    pub protocol: Option<StreamProtocol>,
    pub pid: Option<u32>,
    pub uptime_seconds: u64,
    /// Seconds since the last diagnostic line
    pub idle_seconds: u64,
    pub exit_code: Option<i32>,
    pub last_error: Option<String>,
}

impl SessionStatus {
    /// Status when no session was ever started
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            source: None,
            profile: None,
            destination: None,
            protocol: None,
            pid: None,
            uptime_seconds: 0,
            idle_seconds: 0,
            exit_code: None,
            last_error: None,
        }
    }
}

/// Requests from the supervisor and reader to the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// Operator teardown
    Stop,
    /// Teardown after a failure marker
    Abort,
}

/// Mutable per-session details
struct Live {
    state: SessionState,
    last_activity_at: Instant,
    last_line: Option<String>,
    exit_code: Option<i32>,
    last_error: Option<String>,
}

/// State shared between the supervisor, reader and monitor
struct SessionShared {
    id: SessionId,
    meta: SessionMeta,
    destination: String,
    protocol: StreamProtocol,
    pid: Option<u32>,
    started_at: Instant,
    live: Mutex<Live>,
    /// Flips to true once the engine has been reaped
    reaped_tx: watch::Sender<bool>,
    bus: EventBus,
}

impl SessionShared {
    fn new(id: SessionId, plan: &InvocationPlan, meta: SessionMeta, pid: Option<u32>, bus: EventBus) -> Self {
        let now = Instant::now();
        let (reaped_tx, _) = watch::channel(false);
        Self {
            id,
            meta,
            destination: safe_url(plan.destination()),
            protocol: plan.protocol(),
            pid,
            started_at: now,
            live: Mutex::new(Live {
                state: SessionState::Idle,
                last_activity_at: now,
                last_line: None,
                exit_code: None,
                last_error: None,
            }),
            reaped_tx,
            bus,
        }
    }

    fn state(&self) -> SessionState {
        self.live.lock().state
    }

    /// Apply an input; publishes the transition while holding the lock so
    /// events leave in the order they were applied
    fn apply(&self, input: SessionInput) -> Option<(SessionState, SessionState)> {
        let mut live = self.live.lock();
        let from = live.state;
        let to = from.next(input)?;

        live.state = to;
        debug!("{}: {} -> {}", self.id, from, to);

        self.bus.publish(SessionEvent::StateChanged {
            session: self.id,
            from,
            to,
        });
        if to == SessionState::Streaming {
            info!("{}: connected to {}", self.id, self.destination);
            self.bus.publish(SessionEvent::Connected { session: self.id });
        }

        Some((from, to))
    }

    fn record_line(&self, line: &str) {
        let mut live = self.live.lock();
        live.last_activity_at = Instant::now();
        live.last_line = Some(line.to_string());
    }

    fn mark_reaped(&self) {
        self.reaped_tx.send_replace(true);
    }

    fn fail(&self, err: &SrtcastError) {
        self.live.lock().last_error = Some(err.to_string());
        self.bus.publish(SessionEvent::error(Some(self.id), err));
    }

    fn status(&self) -> SessionStatus {
        let live = self.live.lock();
        SessionStatus {
            state: live.state,
            session: Some(self.id),
            source: self.meta.source.clone(),
            profile: self.meta.profile.clone(),
            destination: Some(self.destination.clone()),
            protocol: Some(self.protocol),
            pid: self.pid,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            idle_seconds: live.last_activity_at.elapsed().as_secs(),
            exit_code: live.exit_code,
            last_error: live.last_error.clone(),
        }
    }
}

/// Handle kept in the exclusivity slot
struct ActiveSession {
    shared: Arc<SessionShared>,
    control: mpsc::UnboundedSender<Control>,
    reaped_rx: watch::Receiver<bool>,
}

impl ActiveSession {
    /// Terminal and the engine is gone
    fn is_finished(&self) -> bool {
        self.shared.state().is_terminal() && *self.reaped_rx.borrow()
    }
}

/// Owner of the single streaming session
pub struct Supervisor {
    launcher: Arc<dyn Launcher>,
    bus: EventBus,
    options: SupervisorOptions,
    slot: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl Supervisor {
    /// Supervisor spawning real processes
    pub fn new(bus: EventBus, options: SupervisorOptions) -> Self {
        Self::with_launcher(bus, options, Arc::new(SystemLauncher))
    }

    /// Supervisor with a custom launcher
    pub fn with_launcher(bus: EventBus, options: SupervisorOptions, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            bus,
            options,
            slot: tokio::sync::Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start a session for `plan`
    pub async fn start(&self, plan: &InvocationPlan) -> Result<SessionId> {
        self.start_with(plan, SessionMeta::default()).await
    }

    /// Start a session, recording what it streams
    ///
    /// Fails with `SessionBusy` and spawns nothing while another session is
    /// not yet terminal or its engine has not exited.
    pub async fn start_with(&self, plan: &InvocationPlan, meta: SessionMeta) -> Result<SessionId> {
        let mut slot = self.slot.lock().await;

        if let Some(ref active) = *slot {
            if !active.is_finished() {
                let state = active.shared.state();
                if state.is_terminal() {
                    warn!(
                        "Refusing to start: {} is {} but its engine is still exiting",
                        active.shared.id, state
                    );
                } else {
                    warn!("Refusing to start: {} is {}", active.shared.id, state);
                }
                let err = SrtcastError::SessionBusy;
                self.bus.publish(SessionEvent::error(Some(active.shared.id), &err));
                return Err(err);
            }
        }

        let id = SessionId::next();
        info!("{}: starting {}", id, plan.command_line());

        let mut child = match self.launcher.launch(plan) {
            Ok(child) => child,
            Err(e) => {
                let shared = Arc::new(SessionShared::new(id, plan, meta, None, self.bus.clone()));
                let err = SrtcastError::process(
                    None,
                    format!("Failed to spawn {}: {}", plan.program().display(), e),
                );
                error!("{}: {}", id, err);

                shared.apply(SessionInput::SpawnFailed);
                shared.mark_reaped();
                shared.fail(&err);
                self.bus.publish(SessionEvent::Ended {
                    session: id,
                    exit_code: None,
                    state: SessionState::Errored,
                });

                let (control, _) = mpsc::unbounded_channel();
                let reaped_rx = shared.reaped_tx.subscribe();
                *slot = Some(ActiveSession {
                    shared,
                    control,
                    reaped_rx,
                });
                return Err(err);
            }
        };

        let pid = child.id();
        let shared = Arc::new(SessionShared::new(id, plan, meta, pid, self.bus.clone()));
        let reaped_rx = shared.reaped_tx.subscribe();

        self.bus.publish(SessionEvent::Started {
            session: id,
            pid,
            destination: shared.destination.clone(),
        });
        shared.apply(SessionInput::Spawned);

        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let reader = child.stderr.take().map(|stderr| {
            tokio::spawn(read_diagnostics(stderr, Arc::clone(&shared), control_tx.clone()))
        });

        tokio::spawn(monitor(
            child,
            reader,
            Arc::clone(&shared),
            control_rx,
            self.options,
        ));

        *slot = Some(ActiveSession {
            shared,
            control: control_tx,
            reaped_rx,
        });

        Ok(id)
    }

    /// Stop the session and wait until its engine has been reaped
    ///
    /// Idempotent once stopping or terminal; returns the final state.
    pub async fn stop(&self) -> Result<SessionState> {
        let (shared, mut reaped_rx) = {
            let slot = self.slot.lock().await;
            let Some(ref active) = *slot else {
                let err = SrtcastError::InvalidTransition {
                    state: SessionState::Idle,
                    operation: "stop",
                };
                self.bus.publish(SessionEvent::error(None, &err));
                return Err(err);
            };

            let state = active.shared.state();
            if active.is_finished() {
                debug!("{} already {}", active.shared.id, state);
                return Ok(state);
            }

            if state.is_active() && state != SessionState::Stopping {
                info!("{}: stop requested", active.shared.id);
                let _ = active.control.send(Control::Stop);
            }
            (Arc::clone(&active.shared), active.reaped_rx.clone())
        };

        reaped_rx
            .wait_for(|reaped| *reaped)
            .await
            .map_err(|_| SrtcastError::process(None, "Session monitor ended unexpectedly"))?;

        Ok(shared.state())
    }

    /// Snapshot of the current or last session
    pub async fn status(&self) -> SessionStatus {
        let slot = self.slot.lock().await;
        match *slot {
            Some(ref active) => active.shared.status(),
            None => SessionStatus::idle(),
        }
    }

    /// State of the current or last session
    pub async fn state(&self) -> SessionState {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .map(|active| active.shared.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Whether a non-terminal session holds the slot
    pub async fn is_active(&self) -> bool {
        self.state().await.is_active()
    }
}

/// Forward diagnostics to the bus and drive the state machine from them
async fn read_diagnostics(
    stderr: ChildStderr,
    shared: Arc<SessionShared>,
    control: mpsc::UnboundedSender<Control>,
) {
    let mut reader = DiagnosticReader::new(BufReader::new(stderr));

    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("{}: diagnostic stream error: {}", shared.id, e);
                break;
            }
        };

        trace!("{}: {}", shared.id, line);
        shared.record_line(&line);
        shared.bus.publish(SessionEvent::Log {
            session: shared.id,
            line: line.clone(),
        });

        let class = classify(&line);
        if let Some((_, SessionState::Errored)) = shared.apply(SessionInput::Line(class)) {
            error!("{}: engine reported failure: {}", shared.id, line);
            shared.fail(&SrtcastError::process(None, line));
            let _ = control.send(Control::Abort);
        }
    }

    debug!("{}: diagnostic stream closed", shared.id);
}

/// Sleep until `deadline`, or forever without one
async fn wait_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Own the child until it exits, then settle the session
async fn monitor(
    mut child: Child,
    reader: Option<JoinHandle<()>>,
    shared: Arc<SessionShared>,
    mut control: mpsc::UnboundedReceiver<Control>,
    options: SupervisorOptions,
) {
    let mut stop_requested = false;
    let mut kill_at: Option<tokio::time::Instant> = None;

    let exit = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(cmd) = control.recv() => {
                if cmd == Control::Stop {
                    stop_requested = true;
                    shared.apply(SessionInput::StopRequested);
                }
                if kill_at.is_none() {
                    request_termination(&mut child, shared.id).await;
                    kill_at = Some(tokio::time::Instant::now() + options.stop_grace);
                }
            }
            _ = wait_deadline(kill_at) => {
                warn!(
                    "{}: engine ignored termination for {} ms, killing",
                    shared.id,
                    options.stop_grace.as_millis()
                );
                if let Err(e) = child.start_kill() {
                    warn!("{}: kill failed: {}", shared.id, e);
                }
                kill_at = None;
            }
        }
    };

    // Apply the exit only after the diagnostics that preceded it
    if let Some(mut reader) = reader {
        if tokio::time::timeout(options.drain_timeout, &mut reader).await.is_err() {
            debug!("{}: diagnostic drain timed out", shared.id);
            reader.abort();
        }
    }

    let exit_code = match exit {
        Ok(status) => status.code(),
        Err(ref e) => {
            warn!("{}: failed to wait for engine: {}", shared.id, e);
            None
        }
    };
    shared.live.lock().exit_code = exit_code;

    let transition = shared.apply(SessionInput::Exited {
        exit_code,
        stop_requested,
    });

    if let Some((_, SessionState::Errored)) = transition {
        let last_line = shared.live.lock().last_line.clone().unwrap_or_default();
        let err = SrtcastError::process(exit_code, last_line);
        error!("{}: engine exited unexpectedly: {}", shared.id, err);
        shared.fail(&err);
    }

    shared.mark_reaped();

    let state = shared.state();
    info!("{}: ended ({}, exit code {:?})", shared.id, state, exit_code);
    shared.bus.publish(SessionEvent::Ended {
        session: shared.id,
        exit_code,
        state,
    });
}

/// Ask the engine to exit gracefully
#[cfg(unix)]
async fn request_termination(child: &mut Child, id: SessionId) {
    let Some(pid) = child.id() else {
        return;
    };

    // SAFETY: kill(2) has no memory-safety requirements; pid is our own
    // child, which has not been reaped while `child.id()` is Some.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!(
            "{}: SIGTERM failed ({}), killing",
            id,
            std::io::Error::last_os_error()
        );
        let _ = child.start_kill();
    }
}

/// Ask the engine to exit gracefully
#[cfg(not(unix))]
async fn request_termination(child: &mut Child, id: SessionId) {
    use tokio::io::AsyncWriteExt;

    // ffmpeg finishes the output and quits on 'q'
    match child.stdin.take() {
        Some(mut stdin) => {
            if let Err(e) = stdin.write_all(b"q").await {
                warn!("{}: could not ask engine to quit: {}", id, e);
                let _ = child.start_kill();
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}
