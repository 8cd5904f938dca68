//! # Session Lifecycle
//!
//! Pure transition table for a decode session. The run loop feeds it commands
//! from the control surface and events from the engine and publishes whatever
//! state it returns; nothing here touches threads or locks.
//!
//! ```text
//!          play              pause
//!   Idle ────────▶ Playing ────────▶ Paused
//!                     ▲                 │
//!                     └──────play───────┘
//!
//!   any non-Stopped ──stop──▶ Stopped
//!   Idle | Playing | Paused ──EOS──▶ Stopped
//!   Idle | Playing | Paused ──error──▶ Errored
//! ```
//!
//! `Stopped` and `Errored` are terminal for play and pause. `Errored` still
//! accepts `Stop` so the run loop can finish.

use std::fmt;

use serde::Serialize;

use crate::capture::engine::{EngineEvent, EngineState};

/// Lifecycle state of a pipeline session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    Playing,
    Paused,
    Stopped,
    Errored,
}

impl LifecycleState {
    /// True once the session can no longer play.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Playing => "playing",
            LifecycleState::Paused => "paused",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Errored => "errored",
        }
    }

    /// State after a control command, or `None` when the command does not
    /// apply in this state.
    pub fn after_command(self, command: Command) -> Option<LifecycleState> {
        use LifecycleState::*;
        match (command, self) {
            (Command::Play, Idle | Paused) => Some(Playing),
            (Command::Pause, Playing) => Some(Paused),
            (Command::Stop, Stopped) => None,
            (Command::Stop, _) => Some(Stopped),
            _ => None,
        }
    }

    /// State after an engine event, or `None` when the event is ignored.
    ///
    /// State changes are only honoured when they concern the top-level graph;
    /// a decoder or source element changing state says nothing about the
    /// session as a whole.
    pub fn after_event(self, event: &EngineEvent) -> Option<LifecycleState> {
        use LifecycleState::*;
        if self.is_terminal() {
            return None;
        }
        match event {
            EngineEvent::EndOfStream => Some(Stopped),
            EngineEvent::Error { .. } => Some(Errored),
            EngineEvent::Warning { .. } => None,
            EngineEvent::StateChanged {
                from_graph: false, ..
            } => None,
            EngineEvent::StateChanged { old, new, .. } => match (self, *old, *new) {
                (Idle | Paused, _, EngineState::Playing) => Some(Playing),
                (Playing, EngineState::Playing, EngineState::Paused) => Some(Paused),
                _ => None,
            },
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control commands accepted by a session run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
        };
        f.write_str(name)
    }
}
