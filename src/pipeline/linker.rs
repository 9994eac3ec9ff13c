//! Deferred links for stages whose outputs appear at runtime.
//!
//! A network source or a decoding bin cannot be linked when the graph is
//! built: its output port only exists once the engine has negotiated the
//! stream. The [`DynamicLinker`] remembers the intended downstream stage and
//! supplies it when the engine announces the port.

use super::graph::StageId;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Sink port a deferred link targets on the downstream stage.
pub const DEFAULT_SINK_PORT: &str = "sink";

/// A link recorded before its source port exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    /// Stage that receives the announced port's data.
    pub downstream: StageId,
    /// Input port on the downstream stage.
    pub sink_port: String,
    /// Source port the link was established from, once linked.
    pub linked_from: Option<String>,
}

impl PendingLink {
    /// Whether the link has been established.
    pub fn is_linked(&self) -> bool {
        self.linked_from.is_some()
    }
}

/// Registry of deferred links, one per dynamic stage.
#[derive(Debug, Default)]
pub struct DynamicLinker {
    pending: HashMap<StageId, PendingLink>,
}

impl DynamicLinker {
    /// Create an empty linker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `upstream`'s future output goes to `downstream`.
    ///
    /// A dynamic stage feeds exactly one downstream stage: registering a
    /// second target is an error.
    pub fn register(&mut self, upstream: StageId, downstream: StageId) -> Result<()> {
        if self.pending.contains_key(&upstream) {
            return Err(Error::InvalidSegment(format!(
                "stage #{} already has a deferred link",
                upstream.index()
            )));
        }
        self.pending.insert(
            upstream,
            PendingLink {
                downstream,
                sink_port: DEFAULT_SINK_PORT.to_string(),
                linked_from: None,
            },
        );
        Ok(())
    }

    /// The deferred link registered for `upstream`.
    pub fn target(&self, upstream: StageId) -> Option<&PendingLink> {
        self.pending.get(&upstream)
    }

    /// Resolve an announced port to its `(downstream, sink_port)` pair.
    ///
    /// The same pair is returned for every announcement, so a repeated
    /// notification maps to the link that already exists.
    pub fn resolve(&self, upstream: StageId) -> Option<(StageId, String)> {
        self.pending
            .get(&upstream)
            .map(|p| (p.downstream, p.sink_port.clone()))
    }

    /// Mark the record of `upstream` as linked from `port`.
    pub fn mark_linked(&mut self, upstream: StageId, port: &str) {
        if let Some(record) = self.pending.get_mut(&upstream) {
            record.linked_from = Some(port.to_string());
        }
    }

    /// Mark the record as unlinked after `port` went away.
    ///
    /// Returns `false` if the record was not linked from `port`.
    pub fn mark_unlinked(&mut self, upstream: StageId, port: &str) -> bool {
        match self.pending.get_mut(&upstream) {
            Some(record) if record.linked_from.as_deref() == Some(port) => {
                record.linked_from = None;
                true
            }
            _ => false,
        }
    }

    /// Number of records that are still waiting for a port.
    pub fn pending_count(&self) -> usize {
        self.pending.values().filter(|p| !p.is_linked()).count()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether there are no records at all.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
