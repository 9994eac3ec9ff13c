//! Built-in simulated execution engine.
//!
//! Every registered stage becomes a tokio task once the engine is set to
//! [`EngineState::Playing`]. Tasks exchange [`Frame`]s over unbounded
//! channels; a frame only carries its origin, a sequence number and the caps
//! stamped on it, which is enough to observe routing and switching.
//!
//! Behaviour per kind:
//!
//! - **Sources** produce one frame per [`SimConfig::frame_interval`].
//!   `rtspsrc` and `uridecodebin` announce their output port after
//!   [`SimConfig::negotiation_delay`]. `uridecodebin` posts a bus error if
//!   its `file://` URI cannot be opened. `videotestsrc num-buffers=N` ends
//!   the stream after N frames.
//! - **Filters** forward frames. `capsfilter` stamps its caps; `identity`
//!   with `silent=false` publishes `last-message`.
//! - **Selectors** forward the active input only. The first input that
//!   delivers data becomes active if none was chosen.
//! - **Sinks** count frames (`frames-rendered`), remember the origin of the
//!   last one (`last-origin`) and post end-of-stream on the bus.
//!
//! Frames pushed from an unlinked output are dropped.

use super::{ACTIVE_PAD, Engine, EngineState, LAST_MESSAGE, N_PADS};
use crate::error::{Error, Result};
use crate::observability::{span_stage, trace_eos};
use crate::pipeline::events::{BusMessage, BusSender, SignalSender, StageSignal};
use crate::stage::{Caps, PortDirection, PortPresence, PropertyValue, Stage, StageKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::Instrument;
use url::Url;

/// Sink property counting rendered frames.
pub const FRAMES_RENDERED: &str = "frames-rendered";
/// Sink property naming the source of the last rendered frame.
pub const LAST_ORIGIN: &str = "last-origin";

/// Indices used when a source names its announced port.
const ANNOUNCED_PORT_INDICES: &[u32] = &[0, 0, 96];

/// Timing of the simulated engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Time between two frames of a source.
    pub frame_interval: Duration,
    /// Time before a dynamic source announces its output port.
    pub negotiation_delay: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            negotiation_delay: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// Frames and ports
// ============================================================================

/// A unit of simulated video.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Name of the source stage that produced the frame.
    pub origin: Arc<str>,
    /// Sequence number within the source.
    pub sequence: u64,
    /// Caps stamped by the last caps filter passed.
    pub caps: Option<Caps>,
}

#[derive(Debug)]
enum Packet {
    Frame { port: String, frame: Frame },
    Eos { port: String },
}

impl Packet {
    fn port(&self) -> &str {
        match self {
            Packet::Frame { port, .. } | Packet::Eos { port } => port,
        }
    }
}

#[derive(Debug, Clone)]
struct Peer {
    inbox: mpsc::UnboundedSender<Packet>,
    sink_port: String,
}

/// An output port: the peer it currently pushes to, if any.
#[derive(Debug, Clone)]
struct Output {
    peer: Arc<watch::Sender<Option<Peer>>>,
}

impl Output {
    fn new() -> Self {
        let (peer, _) = watch::channel(None);
        Self {
            peer: Arc::new(peer),
        }
    }

    fn connect(&self, peer: Peer) {
        self.peer.send_replace(Some(peer));
    }

    fn disconnect(&self) {
        self.peer.send_replace(None);
    }

    fn is_linked(&self) -> bool {
        self.peer.borrow().is_some()
    }

    /// Push a frame. Returns `false` if it was dropped.
    fn push(&self, frame: Frame) -> bool {
        match &*self.peer.borrow() {
            Some(peer) => peer
                .inbox
                .send(Packet::Frame {
                    port: peer.sink_port.clone(),
                    frame,
                })
                .is_ok(),
            None => false,
        }
    }

    fn push_eos(&self) -> bool {
        match &*self.peer.borrow() {
            Some(peer) => peer
                .inbox
                .send(Packet::Eos {
                    port: peer.sink_port.clone(),
                })
                .is_ok(),
            None => false,
        }
    }
}

type Props = BTreeMap<String, PropertyValue>;

/// Runtime half of a registered stage.
struct StageRuntime {
    factory: String,
    kind: StageKind,
    config: Props,
    inbox: mpsc::UnboundedSender<Packet>,
    /// Taken by the worker when it starts.
    receiver: Option<mpsc::UnboundedReceiver<Packet>>,
    outputs: HashMap<String, Output>,
    /// Input ports that currently have a peer.
    linked_inputs: Vec<String>,
    props: Arc<watch::Sender<Props>>,
    task: Option<JoinHandle<()>>,
}

impl StageRuntime {
    fn from_stage(stage: &Stage) -> Self {
        let mut outputs = HashMap::new();
        for port in stage.ports().outputs() {
            outputs.insert(port.name().to_string(), Output::new());
        }
        // The port a dynamic source will announce exists from the start, so
        // the worker can push to it as soon as the graph links it.
        for template in stage.templates().iter().filter(|t| {
            t.direction == PortDirection::Output && t.presence == PortPresence::Sometimes
        }) {
            outputs.insert(template.port_name(ANNOUNCED_PORT_INDICES), Output::new());
        }

        let mut initial = Props::new();
        match stage.kind() {
            StageKind::Selector => {
                initial.insert(N_PADS.to_string(), PropertyValue::Integer(0));
            }
            StageKind::Sink => {
                initial.insert(FRAMES_RENDERED.to_string(), PropertyValue::Integer(0));
            }
            _ => {}
        }
        let (props, _) = watch::channel(initial);
        let (inbox, receiver) = mpsc::unbounded_channel();

        Self {
            factory: stage.factory().to_string(),
            kind: stage.kind(),
            config: stage.config().clone(),
            inbox,
            receiver: Some(receiver),
            outputs,
            linked_inputs: Vec::new(),
            props: Arc::new(props),
            task: None,
        }
    }

    fn update_pad_count(&self) {
        if self.kind == StageKind::Selector {
            let count = self.linked_inputs.len() as i64;
            self.props.send_modify(|p| {
                p.insert(N_PADS.to_string(), PropertyValue::Integer(count));
            });
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The built-in engine: one tokio task per stage.
///
/// Creating the engine needs no runtime; switching it to
/// [`EngineState::Playing`] does.
pub struct SimEngine {
    config: SimConfig,
    bus: BusSender,
    signals: SignalSender,
    stages: HashMap<String, StageRuntime>,
    state: EngineState,
    started: bool,
}

impl SimEngine {
    /// Create an engine with default timing.
    pub fn new(bus: BusSender, signals: SignalSender) -> Self {
        Self::with_config(bus, signals, SimConfig::default())
    }

    /// Create an engine with custom timing.
    pub fn with_config(bus: BusSender, signals: SignalSender, config: SimConfig) -> Self {
        Self {
            config,
            bus,
            signals,
            stages: HashMap::new(),
            state: EngineState::Null,
            started: false,
        }
    }

    /// Current execution state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Timing in use.
    pub fn config(&self) -> SimConfig {
        self.config
    }

    /// Number of stages registered.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn runtime(&self, stage: &str) -> Result<&StageRuntime> {
        self.stages
            .get(stage)
            .ok_or_else(|| Error::StageNotFound(stage.to_string()))
    }

    fn start_workers(&mut self) -> Result<()> {
        if Handle::try_current().is_err() {
            return Err(Error::Engine(
                "the simulated engine needs a tokio runtime to play".into(),
            ));
        }
        if self.started {
            return Err(Error::Engine(
                "the simulated engine cannot restart after teardown".into(),
            ));
        }
        self.started = true;

        for (name, runtime) in &mut self.stages {
            let Some(inbox) = runtime.receiver.take() else {
                continue;
            };
            let worker = Worker {
                name: Arc::from(name.as_str()),
                factory: runtime.factory.clone(),
                config: runtime.config.clone(),
                inbox,
                outputs: runtime.outputs.clone(),
                props: runtime.props.clone(),
                bus: self.bus.clone(),
                signals: self.signals.clone(),
                timing: self.config,
            };
            let span = span_stage(name, &runtime.factory);
            let kind = runtime.kind;
            runtime.task = Some(tokio::spawn(worker.run(kind).instrument(span)));
        }
        Ok(())
    }

    fn stop_workers(&mut self) {
        for runtime in self.stages.values_mut() {
            runtime.abort();
        }
    }
}

impl Engine for SimEngine {
    fn register(&mut self, stage: &Stage) -> Result<()> {
        if self.stages.contains_key(stage.name()) {
            return Err(Error::Engine(format!(
                "stage '{}' is already registered",
                stage.name()
            )));
        }
        self.stages
            .insert(stage.name().to_string(), StageRuntime::from_stage(stage));
        Ok(())
    }

    fn link(&mut self, src: &str, src_port: &str, sink: &str, sink_port: &str) -> Result<()> {
        let sink_runtime = self.runtime(sink)?;
        if !sink_runtime.kind.has_input() {
            return Err(Error::Engine(format!("'{sink}' does not accept input")));
        }
        let peer = Peer {
            inbox: sink_runtime.inbox.clone(),
            sink_port: sink_port.to_string(),
        };

        let output = self
            .runtime(src)?
            .outputs
            .get(src_port)
            .ok_or_else(|| Error::Engine(format!("'{src}' has no output '{src_port}'")))?;
        if output.is_linked() {
            return Err(Error::Engine(format!("'{src}:{src_port}' already has a peer")));
        }
        output.connect(peer);

        if let Some(runtime) = self.stages.get_mut(sink) {
            runtime.linked_inputs.push(sink_port.to_string());
            runtime.update_pad_count();
        }
        Ok(())
    }

    fn unlink(&mut self, src: &str, src_port: &str, sink: &str, sink_port: &str) -> Result<()> {
        if let Some(output) = self.runtime(src)?.outputs.get(src_port) {
            output.disconnect();
        }
        if let Some(runtime) = self.stages.get_mut(sink) {
            runtime.linked_inputs.retain(|p| p != sink_port);
            runtime.update_pad_count();
        }
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) -> Result<()> {
        if state == self.state {
            return Ok(());
        }
        match state {
            EngineState::Playing => self.start_workers()?,
            EngineState::Ready | EngineState::Null => self.stop_workers(),
        }

        let from = std::mem::replace(&mut self.state, state);
        self.bus.post(BusMessage::StateChanged { from, to: state });
        Ok(())
    }

    fn property(&self, stage: &str, key: &str) -> Option<PropertyValue> {
        let runtime = self.stages.get(stage)?;
        let live = runtime.props.borrow().get(key).cloned();
        live.or_else(|| runtime.config.get(key).cloned())
    }

    fn set_property(&mut self, stage: &str, key: &str, value: PropertyValue) -> Result<()> {
        let runtime = self.runtime(stage)?;

        if runtime.kind == StageKind::Selector && key == ACTIVE_PAD {
            let port = value
                .as_str()
                .ok_or_else(|| Error::Engine(format!("'{ACTIVE_PAD}' takes a port name")))?;
            if !runtime.linked_inputs.iter().any(|p| p == port) {
                return Err(Error::Engine(format!("'{stage}' has no linked input '{port}'")));
            }
        }

        runtime.props.send_modify(|p| {
            p.insert(key.to_string(), value.clone());
        });
        self.signals.emit(StageSignal::PropertyChanged {
            stage: stage.to_string(),
            property: key.to_string(),
            value,
        });
        Ok(())
    }

    fn release(&mut self, stage: &str) {
        if let Some(mut runtime) = self.stages.remove(stage) {
            runtime.abort();
            tracing::trace!(stage = %stage, "released");
        }
    }
}

impl Drop for SimEngine {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl std::fmt::Debug for SimEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEngine")
            .field("stages", &self.stages.len())
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Workers
// ============================================================================

struct Worker {
    name: Arc<str>,
    factory: String,
    config: Props,
    inbox: mpsc::UnboundedReceiver<Packet>,
    outputs: HashMap<String, Output>,
    props: Arc<watch::Sender<Props>>,
    bus: BusSender,
    signals: SignalSender,
    timing: SimConfig,
}

impl Worker {
    async fn run(self, kind: StageKind) {
        match kind {
            StageKind::Source => self.run_source().await,
            StageKind::Selector => self.run_selector().await,
            StageKind::Sink => self.run_sink().await,
            _ => self.run_filter().await,
        }
    }

    /// Runtime value first, construction config second.
    fn setting(&self, key: &str) -> Option<PropertyValue> {
        let live = self.props.borrow().get(key).cloned();
        live.or_else(|| self.config.get(key).cloned())
    }

    fn publish(&self, key: &str, value: PropertyValue) {
        self.props.send_modify(|p| {
            p.insert(key.to_string(), value.clone());
        });
        self.signals.emit(StageSignal::PropertyChanged {
            stage: self.name.to_string(),
            property: key.to_string(),
            value,
        });
    }

    fn output(&self, port: &str) -> Option<&Output> {
        self.outputs.get(port)
    }

    async fn run_source(self) {
        let dynamic = matches!(self.factory.as_str(), "rtspsrc" | "uridecodebin");

        if self.factory == "uridecodebin" {
            if let Err(cause) = self.check_uri() {
                self.bus.post_error(
                    &*self.name,
                    "Could not open resource for reading.",
                    cause,
                );
                return;
            }
        }

        let Some((port, output)) = self.outputs.iter().next() else {
            tracing::warn!("source has no output port");
            return;
        };

        if dynamic {
            sleep(self.timing.negotiation_delay).await;
            tracing::debug!(port = %port, "announcing output port");
            self.signals.port_added(&*self.name, port.as_str());
        }
        self.bus.post(BusMessage::StreamStart {
            source: self.name.to_string(),
        });

        let limit = self
            .setting("num-buffers")
            .and_then(|v| v.as_i64())
            .and_then(|n| u64::try_from(n).ok());

        let mut ticker = interval(self.timing.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence = 0u64;
        loop {
            if limit.is_some_and(|n| sequence >= n) {
                trace_eos(&self.name);
                output.push_eos();
                return;
            }
            ticker.tick().await;
            output.push(Frame {
                origin: self.name.clone(),
                sequence,
                caps: None,
            });
            sequence += 1;
        }
    }

    /// Check that a `file://` URI points at a readable file.
    fn check_uri(&self) -> std::result::Result<(), String> {
        let uri = self
            .setting("uri")
            .map(|v| v.as_string())
            .ok_or_else(|| "no URI set".to_string())?;
        let url = Url::parse(&uri).map_err(|e| format!("malformed URI '{uri}': {e}"))?;
        if url.scheme() != "file" {
            return Ok(());
        }
        let path = url
            .to_file_path()
            .map_err(|_| format!("'{uri}' is not a local path"))?;
        std::fs::File::open(&path)
            .map(drop)
            .map_err(|e| format!("{}: {e}", path.display()))
    }

    async fn run_filter(mut self) {
        let caps = self
            .setting("caps")
            .and_then(|v| v.as_caps().cloned());
        let is_identity = self.factory == "identity";

        while let Some(packet) = self.inbox.recv().await {
            let output = self.output("src");
            match packet {
                Packet::Frame { port, mut frame } => {
                    if let Some(caps) = &caps {
                        frame.caps = Some(caps.clone());
                    }
                    if is_identity && !self.is_silent() {
                        let message = format!(
                            "chain   ******* ({}:{port}) seq {} from {}",
                            self.name, frame.sequence, frame.origin
                        );
                        self.publish(LAST_MESSAGE, PropertyValue::String(message));
                    }
                    if let Some(output) = output {
                        output.push(frame);
                    }
                }
                Packet::Eos { .. } => {
                    if let Some(output) = output {
                        output.push_eos();
                    }
                }
            }
        }
    }

    fn is_silent(&self) -> bool {
        self.setting("silent")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    async fn run_selector(mut self) {
        while let Some(packet) = self.inbox.recv().await {
            let active = self.active_port(packet.port());
            if packet.port() != active {
                continue;
            }
            let Some(output) = self.output("src") else {
                continue;
            };
            match packet {
                Packet::Frame { frame, .. } => {
                    output.push(frame);
                }
                Packet::Eos { .. } => {
                    trace_eos(&self.name);
                    output.push_eos();
                }
            }
        }
    }

    /// The active input, defaulting to `candidate` if none was chosen yet.
    fn active_port(&self, candidate: &str) -> String {
        let current = self
            .props
            .borrow()
            .get(ACTIVE_PAD)
            .and_then(|v| v.as_str().map(str::to_string));
        match current {
            Some(port) => port,
            None => {
                tracing::debug!(port = %candidate, "first data, selecting as active");
                self.publish(ACTIVE_PAD, PropertyValue::String(candidate.to_string()));
                candidate.to_string()
            }
        }
    }

    async fn run_sink(mut self) {
        while let Some(packet) = self.inbox.recv().await {
            match packet {
                Packet::Frame { frame, .. } => {
                    self.props.send_modify(|p| {
                        let rendered = p
                            .get(FRAMES_RENDERED)
                            .and_then(|v| v.as_i64())
                            .unwrap_or(0);
                        p.insert(
                            FRAMES_RENDERED.to_string(),
                            PropertyValue::Integer(rendered + 1),
                        );
                        p.insert(
                            LAST_ORIGIN.to_string(),
                            PropertyValue::String(frame.origin.to_string()),
                        );
                    });
                }
                Packet::Eos { .. } => {
                    trace_eos(&self.name);
                    self.bus.post_eos();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::{BusReceiver, SignalReceiver, bus, signals};
    use crate::stage::{StageDescriptor, StageFactory};

    fn engine() -> (SimEngine, BusReceiver, SignalReceiver) {
        let (bus_tx, bus_rx) = bus(256);
        let (signal_tx, signal_rx) = signals();
        (SimEngine::new(bus_tx, signal_tx), bus_rx, signal_rx)
    }

    fn register(engine: &mut SimEngine, descriptor: StageDescriptor) {
        let stage = StageFactory::new().create(&descriptor).unwrap();
        engine.register(&stage).unwrap();
    }

    fn int(engine: &SimEngine, stage: &str, key: &str) -> i64 {
        engine
            .property(stage, key)
            .and_then(|v| v.as_i64())
            .unwrap()
    }

    #[test]
    fn test_playing_needs_runtime() {
        let (mut engine, _bus, _signals) = engine();
        register(&mut engine, StageDescriptor::new("fakesink", "sink"));
        assert!(matches!(
            engine.set_state(EngineState::Playing),
            Err(Error::Engine(_))
        ));
        assert_eq!(engine.state(), EngineState::Null);
    }

    #[test]
    fn test_duplicate_registration() {
        let (mut engine, _bus, _signals) = engine();
        register(&mut engine, StageDescriptor::new("fakesink", "sink"));
        let stage = StageFactory::new()
            .create(&StageDescriptor::new("fakesink", "sink"))
            .unwrap();
        assert!(engine.register(&stage).is_err());
        assert_eq!(engine.stage_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_source_reaches_eos() {
        let (mut engine, mut bus, _signals) = engine();
        register(
            &mut engine,
            StageDescriptor::new("videotestsrc", "src").with("num-buffers", 3),
        );
        register(&mut engine, StageDescriptor::new("fakesink", "sink"));
        engine.link("src", "src", "sink", "sink").unwrap();
        engine.set_state(EngineState::Playing).unwrap();

        bus.wait_terminal().await.unwrap();
        assert_eq!(int(&engine, "sink", FRAMES_RENDERED), 3);
        assert_eq!(
            engine.property("sink", LAST_ORIGIN),
            Some(PropertyValue::String("src".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_caps_are_stamped_and_unlinked_frames_dropped() {
        let (mut engine, _bus, mut signals) = engine();
        register(&mut engine, StageDescriptor::new("videotestsrc", "src"));
        register(
            &mut engine,
            StageDescriptor::new("capsfilter", "caps")
                .with("caps", "video/x-raw,width=640,height=480"),
        );
        register(
            &mut engine,
            StageDescriptor::new("identity", "id").with("silent", false),
        );
        engine.link("src", "src", "caps", "sink").unwrap();
        engine.link("caps", "src", "id", "sink").unwrap();
        engine.set_state(EngineState::Playing).unwrap();

        // `id` has no downstream peer: its frames are dropped, but it still
        // reports what it processed.
        let signal = signals.recv().await.unwrap();
        match signal {
            StageSignal::PropertyChanged {
                stage,
                property,
                value,
            } => {
                assert_eq!(stage, "id");
                assert_eq!(property, LAST_MESSAGE);
                assert!(value.as_string().contains("from src"));
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_selector_forwards_active_input_only() {
        let (mut engine, _bus, _signals) = engine();
        register(&mut engine, StageDescriptor::new("videotestsrc", "a"));
        register(&mut engine, StageDescriptor::new("videotestsrc", "b"));
        register(&mut engine, StageDescriptor::new("input-selector", "sw"));
        register(&mut engine, StageDescriptor::new("fakesink", "sink"));
        engine.link("a", "src", "sw", "sink_0").unwrap();
        engine.link("b", "src", "sw", "sink_1").unwrap();
        engine.link("sw", "src", "sink", "sink").unwrap();
        assert_eq!(int(&engine, "sw", N_PADS), 2);
        assert!(engine.property("sw", ACTIVE_PAD).is_none());

        engine.set_state(EngineState::Playing).unwrap();
        sleep(Duration::from_millis(200)).await;

        let active = engine.property("sw", ACTIVE_PAD).unwrap().as_string();
        let expected_origin = if active == "sink_0" { "a" } else { "b" };
        assert_eq!(
            engine.property("sink", LAST_ORIGIN).unwrap().as_string(),
            expected_origin
        );

        let other = if active == "sink_0" { "sink_1" } else { "sink_0" };
        engine
            .set_property("sw", ACTIVE_PAD, PropertyValue::String(other.into()))
            .unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_ne!(
            engine.property("sink", LAST_ORIGIN).unwrap().as_string(),
            expected_origin
        );

        assert!(
            engine
                .set_property("sw", ACTIVE_PAD, PropertyValue::String("sink_9".into()))
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_source_announces_port() {
        let (mut engine, _bus, mut signals) = engine();
        register(
            &mut engine,
            StageDescriptor::new("rtspsrc", "src0").with("location", "rtsp://127.0.0.1/x"),
        );
        engine.set_state(EngineState::Playing).unwrap();

        let started = tokio::time::Instant::now();
        let signal = signals.recv().await.unwrap();
        assert_eq!(
            signal,
            StageSignal::PortAdded {
                stage: "src0".into(),
                port: "recv_rtp_src_0_0_96".into(),
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_posts_error() {
        let (mut engine, mut bus, _signals) = engine();
        let dir = tempfile::tempdir().unwrap();
        let uri = Url::from_file_path(dir.path().join("missing.mp4")).unwrap();
        register(
            &mut engine,
            StageDescriptor::new("uridecodebin", "dec1").with("uri", uri.as_str()),
        );
        engine.set_state(EngineState::Playing).unwrap();

        let err = bus.wait_terminal().await.unwrap_err();
        assert!(err.starts_with("Error in dec1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_aborts_workers() {
        let (mut engine, mut bus, _signals) = engine();
        register(&mut engine, StageDescriptor::new("videotestsrc", "src"));
        register(&mut engine, StageDescriptor::new("fakesink", "sink"));
        engine.link("src", "src", "sink", "sink").unwrap();
        engine.set_state(EngineState::Playing).unwrap();
        sleep(Duration::from_millis(100)).await;

        engine.set_state(EngineState::Ready).unwrap();
        tokio::task::yield_now().await;
        let rendered = int(&engine, "sink", FRAMES_RENDERED);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(int(&engine, "sink", FRAMES_RENDERED), rendered);
        assert!(engine.set_state(EngineState::Playing).is_err());

        let mut transitions = Vec::new();
        while let Some(message) = bus.try_recv() {
            if let BusMessage::StateChanged { to, .. } = message {
                transitions.push(to);
            }
        }
        assert_eq!(transitions, vec![EngineState::Playing, EngineState::Ready]);

        engine.release("src");
        engine.release("src");
        assert_eq!(engine.stage_count(), 1);
    }
}
