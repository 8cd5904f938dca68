//! # Pipeline Session Management
//!
//! The [`PipelineController`] owns at most one decode session at a time and is
//! the only authority on its lifecycle state.
//!
//! ## Architecture
//!
//! ```text
//!  HTTP handlers ──play/pause/stop──▶ command queue ─┐
//!                                                     ▼
//!  engine bus ──────events──────────▶ event queue ──▶ run loop thread ──▶ DecodeEngine
//!                                                     │
//!                                                     └──▶ watch<LifecycleState>
//!  engine streaming thread ──frames──▶ FramePublisher ──▶ FrameSlot ──▶ viewers
//! ```
//!
//! ## Threading Rules
//!
//! - Every call into the engine happens on the session's run loop thread.
//! - Control methods only enqueue a command; they never wait for the engine.
//! - The controller lock, the slot lock and the lifecycle channel are never
//!   held at the same time. The controller lock is released before a replaced
//!   session is torn down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capture::engine::{
    DecodeEngine, EngineEvent, EngineFactory, EngineSinks, OutputFormat, RawFrame,
};
use crate::capture::source::SourceDescriptor;
use crate::core::frame_slot::FrameSlot;
use crate::core::lifecycle::{Command, LifecycleState};
use crate::error::{FeedError, FeedResult, classify};
use crate::processing::encoder::FrameEncoder;
use crate::processing::publisher::{EncodePolicy, FramePublisher};

/// How every session built by a controller decodes and encodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub output: OutputFormat,
    pub encoder: FrameEncoder,
    pub policy: EncodePolicy,
}

/// Creates, drives and replaces decode sessions.
pub struct PipelineController {
    factory: Arc<dyn EngineFactory>,
    options: PipelineOptions,
    session: Mutex<Option<PipelineSession>>,
    next_id: AtomicU64,
    // Served when no session exists, so viewers always have something to read.
    detached_slot: Arc<FrameSlot>,
    detached_state: watch::Sender<LifecycleState>,
}

impl PipelineController {
    pub fn new(factory: Arc<dyn EngineFactory>, options: PipelineOptions) -> Self {
        Self {
            factory,
            options,
            session: Mutex::new(None),
            next_id: AtomicU64::new(0),
            detached_slot: Arc::new(FrameSlot::new()),
            detached_state: watch::Sender::new(LifecycleState::Stopped),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<PipelineSession>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build a session for `source`, replacing (and stopping) any previous one.
    ///
    /// The new session starts `Idle`. Returns its id.
    ///
    /// # Errors
    ///
    /// - `SourceUnavailable` when a local file can no longer be opened.
    /// - `GraphConstruction` when the engine cannot build a graph for the
    ///   source kind.
    pub fn create(&self, source: SourceDescriptor) -> FeedResult<u64> {
        source
            .resolve()
            .map_err(|e| e.with_operation("create session"))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = Arc::new(FrameSlot::new());
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let publisher = FramePublisher::new(
            self.options.encoder,
            self.options.policy,
            Arc::clone(&slot),
        );
        let sinks = EngineSinks {
            on_frame: Arc::new(move |frame: RawFrame<'_>| {
                publisher.publish(frame);
            }),
            on_event: Arc::new(move |event: EngineEvent| {
                // The run loop is gone once the session ended; late events are moot.
                let _ = event_tx.send(event);
            }),
        };

        let engine = self
            .factory
            .build(&source, self.options.output, sinks)
            .map_err(|e| e.with_operation("create session"))?;

        let run_loop = RunLoop {
            id,
            engine,
            state: state_tx,
            slot: Arc::clone(&slot),
        };
        let handle = thread::Builder::new()
            .name(format!("vfeed-run-loop-{id}"))
            .spawn(move || run_loop.run(command_rx, event_rx))
            .map_err(|e| FeedError::io("spawn session run loop", e))?;

        info!(session = id, %source, "session created");
        let session = PipelineSession {
            id,
            source,
            commands: command_tx,
            state: state_rx,
            slot,
            run_loop: Some(handle),
        };

        let previous = self.lock_session().replace(session);
        if let Some(previous) = previous {
            debug!(session = previous.id, "replacing previous session");
            drop(previous);
        }
        Ok(id)
    }

    /// Start or resume playback. Returns as soon as the command is queued.
    pub fn play(&self) -> FeedResult<()> {
        self.send(Command::Play)
    }

    /// Pause playback. Has no effect unless the session is playing.
    pub fn pause(&self) -> FeedResult<()> {
        self.send(Command::Pause)
    }

    /// Stop the session and release its graph. Idempotent.
    pub fn stop(&self) -> FeedResult<()> {
        match self.send(Command::Stop) {
            // Already stopped or never created.
            Err(FeedError::State { .. }) => Ok(()),
            other => other,
        }
    }

    fn send(&self, command: Command) -> FeedResult<()> {
        let sender = self
            .lock_session()
            .as_ref()
            .map(|session| (session.id, session.commands.clone()));

        let Some((id, sender)) = sender else {
            warn!(%command, "no session to control");
            return Err(FeedError::state("absent", command.to_string()));
        };
        sender.send(command).map_err(|_| {
            let current = self.state();
            debug!(session = id, %command, %current, "session run loop has exited");
            FeedError::state(current.to_string(), command.to_string())
        })
    }

    /// Stop the current session and wait for its run loop to finish.
    ///
    /// Blocks; call from a blocking context.
    pub fn shutdown(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            info!(session = session.id, "shutting down session");
            drop(session);
        }
    }

    /// Lifecycle state of the current session, `Stopped` when there is none.
    pub fn state(&self) -> LifecycleState {
        self.lock_session()
            .as_ref()
            .map(|session| *session.state.borrow())
            .unwrap_or(LifecycleState::Stopped)
    }

    /// Watch the current session's lifecycle state.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lock_session()
            .as_ref()
            .map(|session| session.state.clone())
            .unwrap_or_else(|| self.detached_state.subscribe())
    }

    /// The current session's frame slot, or an always-empty one.
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        self.lock_session()
            .as_ref()
            .map(|session| Arc::clone(&session.slot))
            .unwrap_or_else(|| Arc::clone(&self.detached_slot))
    }

    pub fn session_id(&self) -> Option<u64> {
        self.lock_session().as_ref().map(|session| session.id)
    }

    pub fn source(&self) -> Option<SourceDescriptor> {
        self.lock_session()
            .as_ref()
            .map(|session| session.source.clone())
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Controller-side handle to a running session.
struct PipelineSession {
    id: u64,
    source: SourceDescriptor,
    commands: Sender<Command>,
    state: watch::Receiver<LifecycleState>,
    slot: Arc<FrameSlot>,
    run_loop: Option<JoinHandle<()>>,
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(handle) = self.run_loop.take() {
            if handle.join().is_err() {
                error!(session = self.id, "session run loop panicked");
            }
        }
    }
}

/// State owned by the run loop thread.
struct RunLoop {
    id: u64,
    engine: Box<dyn DecodeEngine>,
    state: watch::Sender<LifecycleState>,
    slot: Arc<FrameSlot>,
}

impl RunLoop {
    fn run(mut self, commands: Receiver<Command>, mut events: Receiver<EngineEvent>) {
        debug!(session = self.id, "run loop started");

        while self.current() != LifecycleState::Stopped {
            select! {
                recv(commands) -> command => match command {
                    Ok(command) => self.on_command(command),
                    // Controller dropped without a stop.
                    Err(_) => self.on_command(Command::Stop),
                },
                recv(events) -> event => match event {
                    Ok(event) => self.on_event(event),
                    Err(_) => events = never(),
                },
            }
        }

        if let Err(error) = self.engine.teardown() {
            warn!(session = self.id, %error, "teardown failed");
        }
        debug!(session = self.id, "run loop finished");
    }

    fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(session = self.id, from = %previous, to = %next, "lifecycle transition");
        }
    }

    fn on_command(&mut self, command: Command) {
        let current = self.current();
        let Some(next) = current.after_command(command) else {
            debug!(session = self.id, %command, %current, "command has no effect");
            return;
        };

        let result = match command {
            Command::Play => self.engine.set_playing(),
            Command::Pause => self.engine.set_paused(),
            Command::Stop => self.engine.teardown(),
        };
        match result {
            Ok(()) => self.transition(next),
            Err(error) if command == Command::Stop => {
                warn!(session = self.id, %error, "teardown failed");
                self.transition(next);
            }
            Err(error) if classify::is_session_fatal(&error) => {
                error!(session = self.id, %command, %error, "engine rejected command");
                self.fail();
            }
            Err(error) => {
                warn!(session = self.id, %command, %error, "engine refused command, state kept");
            }
        }
    }

    fn on_event(&mut self, event: EngineEvent) {
        match &event {
            EngineEvent::EndOfStream => info!(session = self.id, "end of stream"),
            EngineEvent::Error {
                code,
                message,
                debug,
            } => {
                let error = FeedError::decode(*code, message.clone(), debug.clone());
                error!(session = self.id, %error, "decode engine failed");
            }
            EngineEvent::Warning { message } => {
                warn!(session = self.id, %message, "decode engine warning")
            }
            EngineEvent::StateChanged {
                from_graph,
                old,
                new,
            } => debug!(session = self.id, from_graph, %old, %new, "engine state changed"),
        }

        let Some(next) = self.current().after_event(&event) else {
            return;
        };
        match event {
            EngineEvent::EndOfStream => {
                if let Err(error) = self.engine.teardown() {
                    warn!(session = self.id, %error, "teardown after end of stream failed");
                }
                self.transition(next);
            }
            EngineEvent::Error { .. } => self.fail(),
            _ => self.transition(next),
        }
    }

    /// Release the graph, blank the slot and mark the session errored.
    fn fail(&mut self) {
        if let Err(error) = self.engine.teardown() {
            warn!(session = self.id, %error, "teardown after failure failed");
        }
        self.slot.clear();
        self.transition(LifecycleState::Errored);
    }
}
