//! One conversion job, end to end.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──▶ Uploading ──▶ Streaming ──┬──▶ Completed   (done frame)
//!   │          │             │       └──▶ Failed      (error frame, transport error, timeout)
//!   └──────────┴─────────────┴──────────▶ Cancelled   (cancel() or superseded)
//! ```
//!
//! A [`ConversionSession`] owns everything mutable about a job: the
//! transport, the assembled text, the render pacing. Nothing is shared
//! between sessions except the generation counter of the [`SessionSlot`]
//! that created them.
//!
//! ## Superseding
//!
//! A view runs at most one live session. [`SessionSlot::begin`] cancels the
//! previous session and advances the slot's generation *before* the new
//! session exists. Every observer callback is gated on the session's
//! generation still being current, so a stale session whose transport has
//! not noticed the cancellation yet can never write into the new session's
//! display.

use crate::backend::ConversionBackend;
use crate::config::ClientConfig;
use crate::error::{SessionError, TransportError};
use crate::input::ConversionRequest;
use crate::pipeline::assembler::Assembler;
use crate::pipeline::frame::Frame;
use crate::pipeline::parser::{frames, idle_timeout, FrameStream};
use crate::pipeline::scheduler::RenderScheduler;
use crate::progress::{ConversionObserver, ObserverRef};
use futures::StreamExt;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_CONVERTING: &str = "Converting to markdown...";
const STATUS_CHUNK: &str = "Converting...";
const STATUS_DONE: &str = "Done";

/// Opaque, unique-per-slot session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Uploading,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The final document.
    Completed(String),
    /// The job failed. `partial` is whatever had arrived; it is for display
    /// only and is not a conversion result.
    Failed { error: SessionError, partial: String },
    /// Cancelled or superseded; accumulated text was discarded.
    Cancelled,
}

/// The generation counter a slot shares with its sessions.
type Generation = Arc<RwLock<u64>>;

fn read_generation(current: &RwLock<u64>) -> RwLockReadGuard<'_, u64> {
    current.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_generation(current: &RwLock<u64>) -> RwLockWriteGuard<'_, u64> {
    current.write().unwrap_or_else(PoisonError::into_inner)
}

/// Identity check against the owning slot's current generation.
#[derive(Debug, Clone)]
pub struct LiveGuard {
    current: Generation,
    generation: u64,
}

impl LiveGuard {
    pub fn is_live(&self) -> bool {
        *read_generation(&self.current) == self.generation
    }

    /// Run `f` only if this generation is current. The slot cannot advance
    /// the generation until `f` returns.
    fn while_live(&self, f: impl FnOnce()) {
        let current = read_generation(&self.current);
        if *current == self.generation {
            f();
        }
    }
}

/// Cloneable remote control for a session. `cancel()` is safe to call at
/// any time, from any task, any number of times.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    token: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Per-view owner guaranteeing at most one live session.
///
/// Observer callbacks run under a read lock on the slot's generation and
/// [`SessionSlot::begin`] takes the write lock, so once `begin` returns no
/// callback of an older session is running or can start, whichever threads
/// the sessions run on. An observer must therefore not call back into the
/// slot from inside a callback.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Generation,
    active: Option<SessionHandle>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire the live session (if any) and create its successor.
    pub fn begin(
        &mut self,
        request: ConversionRequest,
        config: &ClientConfig,
        observer: ObserverRef,
    ) -> ConversionSession {
        if let Some(previous) = self.active.take() {
            debug!("Superseding session {}", previous.id());
            previous.cancel();
        }
        let generation = {
            let mut current = write_generation(&self.current);
            *current += 1;
            *current
        };
        let guard = LiveGuard {
            current: Arc::clone(&self.current),
            generation,
        };
        let session = ConversionSession::with_guard(request, config, observer, guard);
        self.active = Some(session.handle());
        session
    }

    /// Cancel the live session and leave the slot empty (view torn down).
    pub fn retire(&mut self) {
        if let Some(previous) = self.active.take() {
            debug!("Retiring session {}", previous.id());
            previous.cancel();
        }
        *write_generation(&self.current) += 1;
    }

    /// Id of the session currently allowed to touch the display.
    pub fn live_id(&self) -> Option<SessionId> {
        self.active
            .as_ref()
            .filter(|h| h.id.0 == *read_generation(&self.current) && !h.is_cancelled())
            .map(|h| h.id)
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
    }
}

/// Observer wrapper that drops every call once the session is stale.
struct GatedObserver {
    inner: ObserverRef,
    guard: LiveGuard,
}

impl ConversionObserver for GatedObserver {
    fn on_progress(&self, percent: u8, status: &str) {
        self.guard.while_live(|| self.inner.on_progress(percent, status));
    }

    fn on_snapshot(&self, text: &str) {
        self.guard.while_live(|| self.inner.on_snapshot(text));
    }

    fn on_complete(&self, text: &str) {
        self.guard.while_live(|| self.inner.on_complete(text));
    }

    fn on_error(&self, message: &str) {
        self.guard.while_live(|| self.inner.on_error(message));
    }
}

enum Step {
    Cancelled,
    Tick,
    Frame(Frame),
    Ended,
    Broken(TransportError),
}

/// One conversion attempt and its state.
pub struct ConversionSession {
    id: SessionId,
    request: ConversionRequest,
    state: SessionState,
    assembler: Assembler,
    scheduler: RenderScheduler,
    observer: GatedObserver,
    token: CancellationToken,
    idle_timeout: Option<Duration>,
    error: Option<SessionError>,
    result: Option<String>,
}

impl fmt::Debug for ConversionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionSession")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("state", &self.state)
            .field("accumulated_bytes", &self.assembler.len())
            .field("error", &self.error)
            .finish()
    }
}

impl ConversionSession {
    /// A standalone session, live until cancelled.
    ///
    /// Use [`SessionSlot::begin`] instead when sessions can supersede each
    /// other.
    pub fn new(request: ConversionRequest, config: &ClientConfig, observer: ObserverRef) -> Self {
        let guard = LiveGuard {
            current: Arc::new(RwLock::new(1)),
            generation: 1,
        };
        Self::with_guard(request, config, observer, guard)
    }

    fn with_guard(
        request: ConversionRequest,
        config: &ClientConfig,
        observer: ObserverRef,
        guard: LiveGuard,
    ) -> Self {
        Self {
            id: SessionId(guard.generation),
            request,
            state: SessionState::Idle,
            assembler: Assembler::new(),
            scheduler: RenderScheduler::new(config.render_policy),
            observer: GatedObserver {
                inner: observer,
                guard,
            },
            token: CancellationToken::new(),
            idle_timeout: config.idle_timeout(),
            error: None,
            result: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> &ConversionRequest {
        &self.request
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            token: self.token.clone(),
        }
    }

    /// Abort. Takes effect at the session's next suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True while this session may still touch shared display state.
    pub fn is_live(&self) -> bool {
        self.observer.guard.is_live() && !self.token.is_cancelled()
    }

    /// The current accumulated text (live view while streaming).
    pub fn snapshot(&self) -> &str {
        self.assembler.snapshot()
    }

    /// The completed document. `None` unless the session reached `Completed`.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// The failure, when the session reached `Failed`.
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// Text kept after a failure, for display only.
    pub fn partial_text(&self) -> Option<&str> {
        match self.state {
            SessionState::Failed => Some(self.assembler.snapshot()),
            _ => None,
        }
    }

    /// Drive the session to a terminal state.
    ///
    /// A session runs once; calling `run` again returns the recorded outcome.
    pub async fn run(&mut self, backend: &dyn ConversionBackend) -> SessionOutcome {
        if self.state != SessionState::Idle {
            warn!("Session {} already ran ({:?})", self.id, self.state);
            return self.outcome();
        }
        if !self.is_live() {
            return self.cancelled();
        }

        self.assembler.reset();
        self.state = SessionState::Uploading;
        info!("Session {}: uploading {}", self.id, self.request);
        self.observer
            .on_progress(20, self.request.uploading_status());

        let opened = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            opened = backend.open(&self.request) => Some(opened),
        };
        let transport = match opened {
            None => return self.cancelled(),
            Some(Err(e)) => return self.fail(SessionError::Transport(e)),
            Some(Ok(transport)) => transport,
        };
        if !self.is_live() {
            return self.cancelled();
        }

        self.state = SessionState::Streaming;
        info!("Session {}: streaming", self.id);
        self.observer.on_progress(50, STATUS_CONVERTING);

        let transport = match self.idle_timeout {
            Some(idle) => idle_timeout(transport, idle),
            None => transport,
        };
        let mut stream = frames(transport);
        let mut ticker = self.scheduler.tick().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            let step = tokio::select! {
                biased;
                _ = self.token.cancelled() => Step::Cancelled,
                _ = next_tick(&mut ticker) => Step::Tick,
                step = next_frame(&mut stream) => step,
            };

            if !self.is_live() {
                // Late frames from a superseded transport land here.
                drop(stream);
                return self.cancelled();
            }

            match step {
                Step::Cancelled => {
                    drop(stream);
                    return self.cancelled();
                }
                Step::Tick => {
                    self.scheduler
                        .on_tick(self.assembler.snapshot(), &self.observer);
                }
                Step::Frame(Frame::Chunk(text)) => {
                    self.assembler.append(&text);
                    self.scheduler
                        .on_append(self.assembler.snapshot(), &self.observer);
                    self.observer.on_progress(70, STATUS_CHUNK);
                }
                Step::Frame(Frame::Done) => {
                    drop(stream);
                    return self.complete();
                }
                Step::Frame(Frame::Error(message)) => {
                    drop(stream);
                    return self.fail(SessionError::Stream { message });
                }
                Step::Ended => {
                    drop(stream);
                    return self.fail(SessionError::Transport(TransportError::Disconnected {
                        reason: "stream ended before the conversion completed".into(),
                    }));
                }
                Step::Broken(e) => {
                    drop(stream);
                    return self.fail(SessionError::Transport(e));
                }
            }
        }
    }

    /// The terminal outcome recorded so far (`Cancelled` for a session that
    /// never finished).
    pub fn outcome(&self) -> SessionOutcome {
        match (self.state, &self.result, &self.error) {
            (SessionState::Completed, Some(text), _) => SessionOutcome::Completed(text.clone()),
            (SessionState::Failed, _, Some(error)) => SessionOutcome::Failed {
                error: error.clone(),
                partial: self.assembler.snapshot().to_string(),
            },
            _ => SessionOutcome::Cancelled,
        }
    }

    fn complete(&mut self) -> SessionOutcome {
        self.scheduler
            .flush(self.assembler.snapshot(), &self.observer);
        self.state = SessionState::Completed;
        let text = self.assembler.snapshot().to_string();
        info!(
            "Session {}: completed ({} chunks, {} bytes)",
            self.id,
            self.assembler.chunk_count(),
            text.len()
        );
        self.observer.on_progress(100, STATUS_DONE);
        self.observer.on_complete(&text);
        self.result = Some(text.clone());
        SessionOutcome::Completed(text)
    }

    fn fail(&mut self, error: SessionError) -> SessionOutcome {
        match &error {
            SessionError::Stream { .. } => {
                self.scheduler
                    .flush(self.assembler.snapshot(), &self.observer);
            }
            SessionError::Transport(_) => {
                self.scheduler
                    .on_tick(self.assembler.snapshot(), &self.observer);
            }
        }
        self.state = SessionState::Failed;
        warn!(
            "Session {}: failed after {} bytes: {}",
            self.id,
            self.assembler.len(),
            error
        );
        self.observer.on_error(&error.to_string());
        self.error = Some(error.clone());
        SessionOutcome::Failed {
            error,
            partial: self.assembler.snapshot().to_string(),
        }
    }

    fn cancelled(&mut self) -> SessionOutcome {
        self.state = SessionState::Cancelled;
        self.assembler.reset();
        info!("Session {}: cancelled", self.id);
        SessionOutcome::Cancelled
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn next_frame(stream: &mut FrameStream) -> Step {
    match stream.next().await {
        Some(Ok(frame)) => Step::Frame(frame),
        Some(Err(e)) => Step::Broken(e),
        None => Step::Ended,
    }
}
