//! Segments: linear chains of stages built in one step.

use super::graph::{StageId, TopologyGraph};
use super::parser::parse_segment;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::stage::StageDescriptor;

/// An ordered chain of stages inside a [`TopologyGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    name: String,
    stages: Vec<StageId>,
}

impl Segment {
    /// Segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in upstream-to-downstream order.
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// The most upstream stage.
    pub fn first(&self) -> Option<StageId> {
        self.stages.first().copied()
    }

    /// The most downstream stage.
    pub fn last(&self) -> Option<StageId> {
        self.stages.last().copied()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the segment has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the segment contains `id`.
    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains(&id)
    }
}

/// Builds a [`Segment`] from stage descriptors.
///
/// # Example
///
/// ```rust
/// use vswitch::pipeline::{SegmentBuilder, TopologyGraph};
/// use vswitch::stage::StageDescriptor;
/// # use vswitch::engine::SimEngine;
/// # use vswitch::pipeline::events::{bus, signals};
/// # let (bus_tx, _bus_rx) = bus(16);
/// # let (signal_tx, _signal_rx) = signals();
/// # let mut graph = TopologyGraph::new(SimEngine::new(bus_tx, signal_tx));
///
/// let input = SegmentBuilder::new("input-b")
///     .stage(StageDescriptor::new("videotestsrc", "src1").with("pattern", 1))
///     .stage(StageDescriptor::new("capsfilter", "caps1"))
///     .build(&mut graph)
///     .unwrap();
/// assert_eq!(input.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    name: String,
    descriptors: Vec<StageDescriptor>,
}

impl SegmentBuilder {
    /// Start a segment with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptors: Vec::new(),
        }
    }

    /// Start a segment from a launch-style description.
    pub fn parse(name: impl Into<String>, description: &str) -> Result<Self> {
        let mut builder = Self::new(name);
        builder.descriptors = parse_segment(description)?;
        Ok(builder)
    }

    /// Append a stage.
    pub fn stage(mut self, descriptor: StageDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Append several stages.
    pub fn stages(mut self, descriptors: impl IntoIterator<Item = StageDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Create the stages in `graph` and link them in order.
    ///
    /// Every stage is registered with the graph's engine; any construction
    /// error aborts the build. Adjacent stages are linked immediately unless
    /// the upstream one only exposes outputs at runtime, in which case the
    /// link is deferred to the graph's dynamic linker.
    pub fn build<E: Engine>(self, graph: &mut TopologyGraph<E>) -> Result<Segment> {
        if self.descriptors.is_empty() {
            return Err(Error::InvalidSegment(format!(
                "segment '{}' has no stages",
                self.name
            )));
        }
        if graph.segment(&self.name).is_some() {
            return Err(Error::InvalidSegment(format!(
                "segment '{}' already exists",
                self.name
            )));
        }

        let mut stages = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            stages.push(graph.add_stage(descriptor)?);
        }

        for pair in stages.windows(2) {
            let (upstream, downstream) = (pair[0], pair[1]);
            let dynamic = graph
                .stage(upstream)
                .is_some_and(|stage| stage.has_dynamic_outputs());
            if dynamic {
                graph.defer_link(upstream, downstream)?;
            } else {
                graph.link_stages(upstream, downstream)?;
            }
        }

        tracing::debug!(segment = %self.name, stages = stages.len(), "segment built");
        let segment = Segment {
            name: self.name,
            stages,
        };
        graph.record_segment(segment.clone());
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;

    fn graph() -> TopologyGraph<MockEngine> {
        TopologyGraph::new(MockEngine::new())
    }

    #[test]
    fn test_static_segment_is_linked() {
        let mut graph = graph();
        let segment = SegmentBuilder::new("chain")
            .stage(StageDescriptor::new("videoconvert", "conv0"))
            .stage(StageDescriptor::new("videoscale", "scale0"))
            .stage(StageDescriptor::new("capsfilter", "caps0"))
            .build(&mut graph)
            .unwrap();

        assert_eq!(segment.len(), 3);
        assert_eq!(graph.link_count(), 2);
        assert_eq!(graph.stage(segment.first().unwrap()).unwrap().name(), "conv0");
        assert_eq!(graph.stage(segment.last().unwrap()).unwrap().name(), "caps0");
        assert_eq!(graph.segments().len(), 1);
    }

    #[test]
    fn test_dynamic_head_is_deferred() {
        let mut graph = graph();
        let segment = SegmentBuilder::parse(
            "input-a",
            "rtspsrc name=src0 location=rtsp://127.0.0.1:8554/test ! rtph265depay name=depay0 ! h265parse name=parse0",
        )
        .unwrap()
        .build(&mut graph)
        .unwrap();

        assert_eq!(segment.len(), 3);
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.linker().pending_count(), 1);
        let src0 = graph.stage_id("src0").unwrap();
        assert!(segment.contains(src0));
        assert_eq!(
            graph.linker().target(src0).unwrap().downstream,
            graph.stage_id("depay0").unwrap()
        );
    }

    #[test]
    fn test_construction_errors_abort() {
        let mut graph = graph();
        let err = SegmentBuilder::new("bad")
            .stage(StageDescriptor::new("videoconvert", "conv0"))
            .stage(StageDescriptor::new("nvh265dec", "dec0"))
            .build(&mut graph)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStageKind(ref k) if k == "nvh265dec"));
        assert!(err.is_construction());

        let err = SegmentBuilder::new("empty").build(&mut graph).unwrap_err();
        assert!(matches!(err, Error::InvalidSegment(_)));
    }

    #[test]
    fn test_segment_names_are_unique() {
        let mut graph = graph();
        SegmentBuilder::new("out")
            .stage(StageDescriptor::new("fakesink", "sink0"))
            .build(&mut graph)
            .unwrap();
        assert!(
            SegmentBuilder::new("out")
                .stage(StageDescriptor::new("fakesink", "sink1"))
                .build(&mut graph)
                .is_err()
        );
    }

    #[test]
    fn test_wire_inputs_into_selector() {
        let mut graph = graph();
        let a = SegmentBuilder::new("a")
            .stage(StageDescriptor::new("videotestsrc", "src0"))
            .build(&mut graph)
            .unwrap();
        let b = SegmentBuilder::new("b")
            .stage(StageDescriptor::new("videotestsrc", "src1"))
            .build(&mut graph)
            .unwrap();
        let output = SegmentBuilder::new("output")
            .stage(StageDescriptor::new("input-selector", "video_switch"))
            .stage(StageDescriptor::new("fakesink", "video_sink"))
            .build(&mut graph)
            .unwrap();

        graph.wire(&[a, b], &output).unwrap();

        let merge = graph.merge_stage().unwrap();
        let merge_stage = graph.stage(merge).unwrap();
        let inputs: Vec<&str> = merge_stage.ports().inputs().map(|p| p.name()).collect();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.contains(&"sink_0") && inputs.contains(&"sink_1"));
        assert_eq!(graph.link_count(), 3);
        assert_eq!(graph.output_segment().unwrap().name(), "output");
    }

    #[test]
    fn test_wire_requires_request_inputs() {
        let mut graph = graph();
        let a = SegmentBuilder::new("a")
            .stage(StageDescriptor::new("videotestsrc", "src0"))
            .build(&mut graph)
            .unwrap();
        let output = SegmentBuilder::new("output")
            .stage(StageDescriptor::new("fakesink", "video_sink"))
            .build(&mut graph)
            .unwrap();

        assert!(matches!(
            graph.wire(&[a], &output),
            Err(Error::InvalidSegment(_))
        ));
    }
}
