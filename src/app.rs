//! Assembly of the two-input switching graph.
//!
//! ```text
//! input-a: rtspsrc ~> rtph265depay ! h265parse ! avdec_h265 ! videoconvert
//!          ! videoscale ! capsfilter ! identity ─┐
//!                                                ├─> input-selector ! identity ! ximagesink
//! input-b: uridecodebin ~> videoconvert ! ...  ──┘
//!      or  videotestsrc ! capsfilter ! identity
//! ```
//!
//! `~>` marks a link made only once the source announces its output.

use crate::config::AppConfig;
use crate::control::{Controller, ExitReason, SwitchController};
use crate::engine::{Engine, LAST_MESSAGE, SimEngine};
use crate::error::Result;
use crate::pipeline::events::{bus, signals};
use crate::pipeline::{SegmentBuilder, TopologyGraph};
use crate::stage::StageDescriptor;
use std::future::Future;
use std::path::Path;
use url::Url;

/// Name of the merge stage.
pub const MERGE_STAGE: &str = "video_switch";

/// Name of the output identity whose `last-message` is logged.
pub const OUTPUT_IDENTITY: &str = "identity-segment";

/// Bus capacity used by [`run`].
const BUS_CAPACITY: usize = 64;

/// Where the second input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondInput {
    /// Decoded from a local file.
    File(String),
    /// Generated test pattern.
    TestPattern,
}

/// A fully wired graph plus the controller that will switch it.
#[derive(Debug)]
pub struct Topology<E: Engine> {
    /// The graph, not yet started.
    pub graph: TopologyGraph<E>,
    /// Switch controller bound to the merge stage.
    pub switch: SwitchController,
    /// Source chosen for the second input.
    pub second_input: SecondInput,
}

/// `file://` URI of `path` if the file can be opened.
pub fn file_uri(path: &Path) -> Option<String> {
    std::fs::File::open(path).ok()?;
    let absolute = std::fs::canonicalize(path).ok()?;
    Url::from_file_path(absolute).ok().map(String::from)
}

/// Build the graph described by `config` on top of `engine`.
///
/// Any construction error is returned before anything runs.
pub fn build_topology<E: Engine>(config: &AppConfig, engine: E) -> Result<Topology<E>> {
    let mut graph = TopologyGraph::new(engine);
    let caps = config.caps();

    let input_a = SegmentBuilder::new("input-a")
        .stage(StageDescriptor::new("rtspsrc", "src0").with("location", config.rtsp_location.as_str()))
        .stage(StageDescriptor::new("rtph265depay", "depay0"))
        .stage(StageDescriptor::new("h265parse", "parse0"))
        .stage(StageDescriptor::new("avdec_h265", "decode0"))
        .stage(StageDescriptor::new("videoconvert", "conv0"))
        .stage(StageDescriptor::new("videoscale", "scale0"))
        .stage(StageDescriptor::new("capsfilter", "caps0").with("caps", caps.as_str()))
        .stage(StageDescriptor::new("identity", "sink0_sync").with("sync", true))
        .build(&mut graph)?;

    let uri = config.video_file().and_then(file_uri);
    let (second_input, head) = match uri {
        Some(uri) => {
            let head = vec![
                StageDescriptor::new("uridecodebin", "dec1").with("uri", uri.as_str()),
                StageDescriptor::new("videoconvert", "conv1"),
                StageDescriptor::new("videoscale", "scale1"),
            ];
            (SecondInput::File(uri), head)
        }
        None => {
            tracing::info!("Could not open input file, using 'videotestsrc'");
            let head = vec![
                StageDescriptor::new("videotestsrc", "src1").with("pattern", config.test_pattern),
            ];
            (SecondInput::TestPattern, head)
        }
    };
    let input_b = SegmentBuilder::new("input-b")
        .stages(head)
        .stage(StageDescriptor::new("capsfilter", "caps1").with("caps", caps.as_str()))
        .stage(StageDescriptor::new("identity", "sink1_sync").with("sync", true))
        .build(&mut graph)?;

    let output = SegmentBuilder::parse(
        "output",
        &format!(
            "input-selector name={MERGE_STAGE} \
             ! identity name={OUTPUT_IDENTITY} silent=true single-segment=true \
             ! ximagesink name=video_sink sync=false"
        ),
    )?
    .build(&mut graph)?;

    graph.wire(&[input_a, input_b], &output)?;
    graph.watch_property(OUTPUT_IDENTITY, LAST_MESSAGE)?;

    let switch = SwitchController::for_graph(&graph, config.switch_period)?;
    tracing::debug!(?graph, input = ?second_input, "topology built");

    Ok(Topology {
        graph,
        switch,
        second_input,
    })
}

/// Build the graph on the built-in engine and run it until it ends or
/// `shutdown` completes.
pub async fn run<F: Future>(config: &AppConfig, shutdown: F) -> Result<ExitReason> {
    let (bus_tx, bus_rx) = bus(BUS_CAPACITY);
    let (signal_tx, signal_rx) = signals();

    let topology = build_topology(config, SimEngine::new(bus_tx, signal_tx))?;
    let mut controller = Controller::new(topology.graph, bus_rx, signal_rx, topology.switch);
    controller.run_until(shutdown).await
}
