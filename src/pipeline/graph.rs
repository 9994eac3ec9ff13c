//! Topology graph structure using daggy.

use super::events::StageSignal;
use super::linker::DynamicLinker;
use super::segment::Segment;
use super::state::{Lifecycle, RunState};
use crate::engine::{Engine, EngineState};
use crate::error::{Error, Result};
use crate::observability::{span_graph, trace_state_change};
use crate::stage::{PortDirection, PropertyValue, Stage, StageDescriptor, StageFactory};
use daggy::petgraph::Direction;
use daggy::petgraph::visit::EdgeRef;
use daggy::{Dag, NodeIndex};
use std::collections::HashMap;

/// Unique identifier for a stage in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub(crate) NodeIndex);

impl StageId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// A link between two stages in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Name of the source (output) port.
    pub src_port: String,
    /// Name of the sink (input) port.
    pub sink_port: String,
}

impl Link {
    /// Create a link with specific port names.
    pub fn new(src_port: impl Into<String>, sink_port: impl Into<String>) -> Self {
        Self {
            src_port: src_port.into(),
            sink_port: sink_port.into(),
        }
    }
}

/// A link described by stage names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Upstream stage.
    pub src: String,
    /// Output port on the upstream stage.
    pub src_port: String,
    /// Downstream stage.
    pub sink: String,
    /// Input port on the downstream stage.
    pub sink_port: String,
}

/// Result of a link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new link was established.
    Linked,
    /// Exactly this link already existed; nothing changed.
    AlreadyLinked,
}

/// The live dataflow graph: stages, links and the engine executing them.
///
/// The graph owns every stage it creates and is the only place that changes
/// links. Structural operations are forwarded to the engine `E`; the
/// engine's asynchronous notifications come back in through
/// [`handle_signal`](Self::handle_signal).
pub struct TopologyGraph<E: Engine> {
    /// The DAG structure.
    dag: Dag<Stage, Link>,
    /// Name-to-StageId mapping for quick lookup.
    by_name: HashMap<String, StageId>,
    factory: StageFactory,
    linker: DynamicLinker,
    lifecycle: Lifecycle,
    segments: Vec<Segment>,
    merge: Option<StageId>,
    output: Option<String>,
    /// `(stage, property)` pairs whose changes are logged.
    watched: Vec<(String, String)>,
    engine: E,
}

impl<E: Engine> TopologyGraph<E> {
    /// Create an empty graph using the built-in stage factories.
    pub fn new(engine: E) -> Self {
        Self::with_factory(engine, StageFactory::new())
    }

    /// Create an empty graph with a custom factory registry.
    pub fn with_factory(engine: E, factory: StageFactory) -> Self {
        Self {
            dag: Dag::new(),
            by_name: HashMap::new(),
            factory,
            linker: DynamicLinker::new(),
            lifecycle: Lifecycle::new(),
            segments: Vec::new(),
            merge: None,
            output: None,
            watched: Vec::new(),
            engine,
        }
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Create a stage and hand it to the engine.
    ///
    /// Fails with [`Error::DuplicateStage`] if the name is taken, with the
    /// factory's errors for unknown kinds or rejected configuration, and with
    /// [`Error::RegistrationFailed`] if the engine refuses the stage.
    pub fn add_stage(&mut self, descriptor: &StageDescriptor) -> Result<StageId> {
        if self.by_name.contains_key(descriptor.name()) {
            return Err(Error::DuplicateStage(descriptor.name().to_string()));
        }

        let stage = self.factory.create(descriptor)?;
        self.engine
            .register(&stage)
            .map_err(|e| Error::RegistrationFailed {
                stage: stage.name().to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(stage = %stage.name(), factory = %stage.factory(), "stage added");
        let name = stage.name().to_string();
        let id = StageId(self.dag.add_node(stage));
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Get a stage by ID.
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.dag.node_weight(id.0)
    }

    /// Get a stage ID by name.
    pub fn stage_id(&self, name: &str) -> Option<StageId> {
        self.by_name.get(name).copied()
    }

    /// Get a stage by name.
    pub fn stage_by_name(&self, name: &str) -> Option<&Stage> {
        self.stage_id(name).and_then(|id| self.stage(id))
    }

    fn stage_ref(&self, id: StageId) -> Result<&Stage> {
        self.stage(id)
            .ok_or_else(|| Error::StageNotFound(format!("#{}", id.index())))
    }

    fn stage_mut(&mut self, id: StageId) -> Result<&mut Stage> {
        self.dag
            .node_weight_mut(id.0)
            .ok_or_else(|| Error::StageNotFound(format!("#{}", id.index())))
    }

    fn id_of(&self, name: &str) -> Result<StageId> {
        self.stage_id(name)
            .ok_or_else(|| Error::StageNotFound(name.to_string()))
    }

    /// Number of stages.
    pub fn stage_count(&self) -> usize {
        self.dag.node_count()
    }

    /// Check if the graph has no stages.
    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    /// The factory registry stages are created from.
    pub fn factory(&self) -> &StageFactory {
        &self.factory
    }

    /// Mutable access to the factory registry, to register custom factories.
    pub fn factory_mut(&mut self) -> &mut StageFactory {
        &mut self.factory
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Link an output port to an input port.
    ///
    /// Linking a pair that is already linked returns
    /// [`LinkOutcome::AlreadyLinked`]. A port already used by another link is
    /// [`Error::PortBusy`]. Links that would create a cycle, or that the
    /// engine refuses, are [`Error::LinkRejected`] and leave the graph
    /// unchanged.
    pub fn link_ports(
        &mut self,
        src: StageId,
        src_port: &str,
        sink: StageId,
        sink_port: &str,
    ) -> Result<LinkOutcome> {
        let src_name = self.checked_port(src, src_port, PortDirection::Output)?;
        let sink_name = self.checked_port(sink, sink_port, PortDirection::Input)?;

        let graph = self.dag.graph();
        if graph.edges(src.0).any(|e| {
            e.target() == sink.0 && e.weight().src_port == src_port && e.weight().sink_port == sink_port
        }) {
            return Ok(LinkOutcome::AlreadyLinked);
        }
        if graph.edges(src.0).any(|e| e.weight().src_port == src_port) {
            return Err(Error::PortBusy {
                stage: src_name,
                port: src_port.to_string(),
            });
        }
        if graph
            .edges_directed(sink.0, Direction::Incoming)
            .any(|e| e.weight().sink_port == sink_port)
        {
            return Err(Error::PortBusy {
                stage: sink_name,
                port: sink_port.to_string(),
            });
        }

        let describe = || format!("{src_name}:{src_port} -> {sink_name}:{sink_port}");

        // Add edge (daggy ensures no cycles)
        let edge = self
            .dag
            .add_edge(src.0, sink.0, Link::new(src_port, sink_port))
            .map_err(|_| Error::LinkRejected(format!("{} would create a cycle", describe())))?;

        if let Err(e) = self.engine.link(&src_name, src_port, &sink_name, sink_port) {
            self.dag.remove_edge(edge);
            return Err(Error::LinkRejected(format!("{}: {e}", describe())));
        }

        tracing::debug!(link = %describe(), "linked");
        Ok(LinkOutcome::Linked)
    }

    /// Check that `port` exists on `id` with the given direction.
    ///
    /// Returns the stage name.
    fn checked_port(&self, id: StageId, port: &str, direction: PortDirection) -> Result<String> {
        let stage = self.stage_ref(id)?;
        match stage.port(port) {
            Some(p) if p.direction() == direction => Ok(stage.name().to_string()),
            _ => Err(Error::PortNotFound {
                stage: stage.name().to_string(),
                port: port.to_string(),
            }),
        }
    }

    /// Link the static output of `src` to the static input of `sink`.
    pub fn link_stages(&mut self, src: StageId, sink: StageId) -> Result<LinkOutcome> {
        let src_stage = self.stage_ref(src)?;
        let src_port = src_stage
            .static_output()
            .map(|p| p.name().to_string())
            .ok_or_else(|| Error::PortNotFound {
                stage: src_stage.name().to_string(),
                port: "src".to_string(),
            })?;

        let sink_stage = self.stage_ref(sink)?;
        let sink_port = sink_stage
            .static_input()
            .map(|p| p.name().to_string())
            .ok_or_else(|| Error::PortNotFound {
                stage: sink_stage.name().to_string(),
                port: "sink".to_string(),
            })?;

        self.link_ports(src, &src_port, sink, &sink_port)
    }

    /// Record that `upstream`'s runtime output feeds `downstream`.
    pub fn defer_link(&mut self, upstream: StageId, downstream: StageId) -> Result<()> {
        let upstream_name = self.stage_ref(upstream)?.name().to_string();
        let downstream_name = self.stage_ref(downstream)?.name().to_string();
        self.linker.register(upstream, downstream)?;
        tracing::debug!(
            upstream = %upstream_name,
            downstream = %downstream_name,
            "link deferred until port appears"
        );
        Ok(())
    }

    /// Create the next request input port on a stage.
    ///
    /// Returns the new port's name.
    pub fn request_port(&mut self, id: StageId) -> Result<String> {
        let port = self.stage_mut(id)?.request_input_port()?;
        Ok(port.name().to_string())
    }

    /// Number of links from `src` to `sink`.
    pub fn link_count_between(&self, src: StageId, sink: StageId) -> usize {
        self.dag
            .graph()
            .edges(src.0)
            .filter(|e| e.target() == sink.0)
            .count()
    }

    /// Get the number of links in the graph.
    pub fn link_count(&self) -> usize {
        self.dag.edge_count()
    }

    /// All links, by stage name.
    pub fn links(&self) -> Vec<LinkInfo> {
        let graph = self.dag.graph();
        graph
            .edge_references()
            .map(|e| LinkInfo {
                src: graph[e.source()].name().to_string(),
                src_port: e.weight().src_port.clone(),
                sink: graph[e.target()].name().to_string(),
                sink_port: e.weight().sink_port.clone(),
            })
            .collect()
    }

    /// The deferred links still known to the graph.
    pub fn linker(&self) -> &DynamicLinker {
        &self.linker
    }

    // ========================================================================
    // Segments
    // ========================================================================

    pub(crate) fn record_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// All segments built into this graph, in build order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Get a segment by name.
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name() == name)
    }

    /// Connect every input segment to the first stage of `output`.
    ///
    /// The first stage of the output segment is the merge stage: it must take
    /// request inputs. Afterwards it has exactly one input per input segment.
    pub fn wire(&mut self, inputs: &[Segment], output: &Segment) -> Result<()> {
        let _guard = span_graph("wire").entered();

        let merge = output.first().ok_or_else(|| {
            Error::InvalidSegment(format!("output segment '{}' is empty", output.name()))
        })?;
        let merge_stage = self.stage_ref(merge)?;
        if !merge_stage.has_request_inputs() {
            return Err(Error::InvalidSegment(format!(
                "merge stage '{}' does not take request inputs",
                merge_stage.name()
            )));
        }

        for input in inputs {
            let last = input.last().ok_or_else(|| {
                Error::InvalidSegment(format!("input segment '{}' is empty", input.name()))
            })?;
            let last_stage = self.stage_ref(last)?;
            let src_port = last_stage
                .static_output()
                .map(|p| p.name().to_string())
                .ok_or_else(|| Error::PortNotFound {
                    stage: last_stage.name().to_string(),
                    port: "src".to_string(),
                })?;

            let sink_port = self.request_port(merge)?;
            self.link_ports(last, &src_port, merge, &sink_port)?;
            tracing::info!(segment = %input.name(), port = %sink_port, "input wired to merge stage");
        }

        let merge_inputs = self.stage_ref(merge)?.ports().inputs().count();
        if merge_inputs != inputs.len() {
            return Err(Error::InvalidSegment(format!(
                "merge stage has {merge_inputs} inputs for {} input segments",
                inputs.len()
            )));
        }

        self.merge = Some(merge);
        self.output = Some(output.name().to_string());
        Ok(())
    }

    /// The stage all inputs are merged into, once wired.
    pub fn merge_stage(&self) -> Option<StageId> {
        self.merge
    }

    /// The output segment, once wired.
    pub fn output_segment(&self) -> Option<&Segment> {
        self.output.as_deref().and_then(|name| self.segment(name))
    }

    // ========================================================================
    // Runtime notifications
    // ========================================================================

    /// React to a stage signal from the engine.
    ///
    /// Failures are logged and never propagate: a port that cannot be linked
    /// leaves the rest of the graph running. Returns the link outcome when a
    /// `PortAdded` signal resolved a deferred link.
    pub fn handle_signal(&mut self, signal: &StageSignal) -> Option<LinkOutcome> {
        if self.lifecycle.state() == RunState::Stopped {
            tracing::trace!(stage = %signal.stage(), "ignoring signal after stop");
            return None;
        }

        match signal {
            StageSignal::PortAdded { stage, port } => match self.on_port_added(stage, port) {
                Ok(outcome) => {
                    match outcome {
                        LinkOutcome::Linked => {
                            tracing::info!(stage = %stage, port = %port, "dynamic port linked")
                        }
                        LinkOutcome::AlreadyLinked => {
                            tracing::debug!(stage = %stage, port = %port, "dynamic port already linked")
                        }
                    }
                    Some(outcome)
                }
                Err(e) => {
                    tracing::warn!(stage = %stage, port = %port, error = %e, "could not link dynamic port");
                    None
                }
            },
            StageSignal::PortRemoved { stage, port } => {
                if let Err(e) = self.on_port_removed(stage, port) {
                    tracing::warn!(stage = %stage, port = %port, error = %e, "could not unlink removed port");
                }
                None
            }
            StageSignal::PropertyChanged {
                stage,
                property,
                value,
            } => {
                if self.is_watched(stage, property) {
                    tracing::info!(stage = %stage, "{property}: {value}");
                } else {
                    tracing::trace!(stage = %stage, property = %property, "property changed");
                }
                None
            }
        }
    }

    fn on_port_added(&mut self, stage: &str, port: &str) -> Result<LinkOutcome> {
        let id = self.id_of(stage)?;
        let added = self.stage_mut(id)?.add_dynamic_port(port)?;

        let linked = self
            .linker
            .resolve(id)
            .ok_or_else(|| Error::LinkRejected(format!("no pending link for '{stage}'")))
            .and_then(|(downstream, sink_port)| self.link_ports(id, port, downstream, &sink_port));

        match linked {
            Ok(outcome) => {
                self.linker.mark_linked(id, port);
                Ok(outcome)
            }
            Err(e) => {
                // A port that could not be linked is not kept on the stage
                if added {
                    self.stage_mut(id)?.remove_dynamic_port(port);
                }
                Err(e)
            }
        }
    }

    fn on_port_removed(&mut self, stage: &str, port: &str) -> Result<()> {
        let id = self.id_of(stage)?;

        let existing = self
            .dag
            .graph()
            .edges(id.0)
            .find(|e| e.weight().src_port == port)
            .map(|e| (e.id(), e.target()));

        if let Some((edge, target)) = existing {
            let sink_name = self.stage_ref(StageId(target))?.name().to_string();
            if let Some(link) = self.dag.remove_edge(edge) {
                self.engine.unlink(stage, port, &sink_name, &link.sink_port)?;
                tracing::info!(stage = %stage, port = %port, "dynamic port unlinked");
            }
        }

        self.linker.mark_unlinked(id, port);
        self.stage_mut(id)?.remove_dynamic_port(port);
        Ok(())
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Read a runtime property from the engine.
    pub fn property(&self, stage: &str, key: &str) -> Option<PropertyValue> {
        self.engine.property(stage, key)
    }

    /// Write a runtime property through the engine.
    pub fn set_property(
        &mut self,
        stage: &str,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        self.id_of(stage)?;
        self.engine.set_property(stage, key, value.into())
    }

    /// Log every change of `stage`'s `key` at info level.
    pub fn watch_property(&mut self, stage: &str, key: &str) -> Result<()> {
        self.id_of(stage)?;
        if !self.is_watched(stage, key) {
            self.watched.push((stage.to_string(), key.to_string()));
        }
        Ok(())
    }

    fn is_watched(&self, stage: &str, key: &str) -> bool {
        self.watched.iter().any(|(s, k)| s == stage && k == key)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.lifecycle.state()
    }

    /// Every run state entered so far, oldest first.
    pub fn state_history(&self) -> &[RunState] {
        self.lifecycle.history()
    }

    /// Start execution: Idle → Playing.
    ///
    /// If the engine cannot start, the graph is stopped and the error returned.
    pub fn start(&mut self) -> Result<()> {
        let _guard = span_graph("start").entered();

        let from = self.lifecycle.transition(RunState::Playing)?;
        if let Err(e) = self.engine.set_state(EngineState::Playing) {
            self.stop();
            return Err(e);
        }

        trace_state_change(&from.to_string(), "playing");
        Ok(())
    }

    /// Begin shutdown after end-of-stream: Playing → Draining.
    pub fn drain(&mut self) -> Result<()> {
        let _guard = span_graph("drain").entered();
        let from = self.lifecycle.transition(RunState::Draining)?;
        trace_state_change(&from.to_string(), "draining");
        Ok(())
    }

    /// Tear the graph down.
    ///
    /// The engine goes back to Ready and every stage is released exactly
    /// once. Calling `stop` on a stopped graph does nothing and returns
    /// `false`.
    pub fn stop(&mut self) -> bool {
        let _guard = span_graph("stop").entered();

        let from = match self.lifecycle.transition(RunState::Stopped) {
            Ok(from) => from,
            Err(_) => {
                tracing::debug!("graph already stopped");
                return false;
            }
        };

        if let Err(e) = self.engine.set_state(EngineState::Ready) {
            tracing::warn!(error = %e, "engine did not return to ready");
        }

        let names: Vec<String> = self
            .dag
            .graph()
            .node_indices()
            .map(|idx| self.dag[idx].name().to_string())
            .collect();
        for name in &names {
            self.engine.release(name);
        }
        self.linker.clear();

        trace_state_change(&from.to_string(), "stopped");
        true
    }

    // ========================================================================
    // Engine access
    // ========================================================================

    /// The engine executing this graph.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable access to the engine.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E: Engine> std::fmt::Debug for TopologyGraph<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyGraph")
            .field("stages", &self.stage_count())
            .field("links", &self.link_count())
            .field("segments", &self.segments.len())
            .field("state", &self.run_state())
            .finish()
    }
}
