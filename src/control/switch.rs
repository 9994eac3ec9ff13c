//! Timed switching between the two merge-stage inputs.

use crate::engine::{ACTIVE_PAD, Engine, N_PADS};
use crate::error::{Error, Result};
use crate::pipeline::{RunState, TopologyGraph};
use std::time::Duration;

/// Switch period used when none (or an invalid one) is given.
pub const DEFAULT_SWITCH_PERIOD: Duration = Duration::from_millis(5000);

/// What the timer should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fire again after one period.
    Reschedule,
    /// Stop firing.
    Cancel,
}

/// The two switchable input ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPair {
    first: String,
    second: String,
}

impl SwitchPair {
    /// A pair of port names.
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// The names of the first two request ports (`sink_0`, `sink_1`).
    pub fn request_ports() -> Self {
        Self::new("sink_0", "sink_1")
    }

    /// The port that is not `current`.
    ///
    /// `toggle(toggle(p)) == p` for both members; any other name is an
    /// [`Error::UnknownActivePort`].
    pub fn toggle(&self, current: &str) -> Result<&str> {
        if current == self.first {
            Ok(&self.second)
        } else if current == self.second {
            Ok(&self.first)
        } else {
            Err(Error::UnknownActivePort(current.to_string()))
        }
    }
}

impl Default for SwitchPair {
    fn default() -> Self {
        Self::request_ports()
    }
}

/// Flips the merge stage's active input once per period.
#[derive(Debug, Clone)]
pub struct SwitchController {
    merge: String,
    pair: SwitchPair,
    period: Duration,
    switches: u64,
}

impl SwitchController {
    /// A controller for the merge stage called `merge`.
    pub fn new(merge: impl Into<String>, period: Duration) -> Self {
        Self {
            merge: merge.into(),
            pair: SwitchPair::default(),
            period,
            switches: 0,
        }
    }

    /// A controller for the merge stage of a wired graph.
    pub fn for_graph<E: Engine>(graph: &TopologyGraph<E>, period: Duration) -> Result<Self> {
        let merge = graph
            .merge_stage()
            .and_then(|id| graph.stage(id))
            .ok_or_else(|| Error::InvalidSegment("graph has no merge stage".into()))?;
        Ok(Self::new(merge.name(), period))
    }

    /// Use a different pair of port names.
    pub fn with_pair(mut self, pair: SwitchPair) -> Self {
        self.pair = pair;
        self
    }

    /// Time between two ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Name of the controlled merge stage.
    pub fn merge(&self) -> &str {
        &self.merge
    }

    /// Number of switches performed.
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    /// Run one switching step.
    ///
    /// Nothing here is fatal: an unreadable or foreign active port is logged
    /// and the tick skipped.
    pub fn tick<E: Engine>(&mut self, graph: &mut TopologyGraph<E>) -> Schedule {
        match graph.run_state() {
            RunState::Draining | RunState::Stopped => {
                tracing::debug!("graph is shutting down, switch timer cancelled");
                return Schedule::Cancel;
            }
            RunState::Idle => {
                tracing::debug!("graph not playing yet, skipping switch");
                return Schedule::Reschedule;
            }
            RunState::Playing => {}
        }

        let n_pads = graph
            .property(&self.merge, N_PADS)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let Some(current) = graph.property(&self.merge, ACTIVE_PAD).map(|v| v.as_string()) else {
            tracing::debug!(stage = %self.merge, "no active input yet, skipping switch");
            return Schedule::Reschedule;
        };

        let next = match self.pair.toggle(&current) {
            Ok(next) => next.to_string(),
            Err(e) => {
                tracing::warn!(stage = %self.merge, error = %e, "cannot switch");
                return Schedule::Reschedule;
            }
        };

        let target_exists = graph
            .stage_by_name(&self.merge)
            .is_some_and(|stage| stage.port(&next).is_some());
        if !target_exists {
            tracing::warn!(stage = %self.merge, port = %next, "switch target does not exist");
            return Schedule::Reschedule;
        }

        match graph.set_property(&self.merge, ACTIVE_PAD, next.as_str()) {
            Ok(()) => {
                self.switches += 1;
                tracing::info!(
                    sources = n_pads,
                    previous = %current,
                    active = %next,
                    "switched active input"
                );
            }
            Err(e) => tracing::warn!(stage = %self.merge, error = %e, "switch rejected"),
        }
        Schedule::Reschedule
    }
}
