//! Run state of a topology graph.

use crate::error::{Error, Result};
use std::fmt;

/// Lifecycle phase of the whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// Constructed, not started.
    #[default]
    Idle,
    /// Executing.
    Playing,
    /// End-of-stream reached, shutting down.
    Draining,
    /// Torn down.
    Stopped,
}

impl RunState {
    /// Whether `next` may follow `self`.
    ///
    /// ```text
    /// Idle -> Playing -> Stopped
    /// Playing -> Draining -> Stopped
    /// Idle -> Stopped
    /// ```
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Playing)
                | (RunState::Idle, RunState::Stopped)
                | (RunState::Playing, RunState::Draining)
                | (RunState::Playing, RunState::Stopped)
                | (RunState::Draining, RunState::Stopped)
        )
    }

    /// Whether the graph has left the playing phase for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Draining | RunState::Stopped)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Playing => "playing",
            RunState::Draining => "draining",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// The current run state and every state entered so far.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: Vec<RunState>,
}

impl Lifecycle {
    /// Start in [`RunState::Idle`].
    pub fn new() -> Self {
        Self {
            history: vec![RunState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or_default()
    }

    /// All states entered, oldest first.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&mut self, next: RunState) -> Result<RunState> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(Error::InvalidTransition { from, to: next });
        }
        self.history.push(next);
        tracing::debug!(%from, to = %next, "run state changed");
        Ok(from)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
