//! Stage kinds.

use std::fmt;

/// The role a stage plays in a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Produces frames (network, file or synthetic source).
    Source,
    /// Extracts payload from transport packets.
    Depacketizer,
    /// Frames an elementary stream.
    Parser,
    /// Decodes compressed video.
    Decoder,
    /// Colorspace conversion.
    Convert,
    /// Resolution scaling.
    Scale,
    /// Caps filters, identity and queue style pass-through stages.
    Filter,
    /// N-to-1 input selection (the merge stage).
    Selector,
    /// Consumes frames (display or discard).
    Sink,
}

impl StageKind {
    /// Whether stages of this kind consume frames from upstream.
    pub fn has_input(&self) -> bool {
        !matches!(self, StageKind::Source)
    }

    /// Whether stages of this kind forward frames downstream.
    pub fn has_output(&self) -> bool {
        !matches!(self, StageKind::Sink)
    }

    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Source => "source",
            StageKind::Depacketizer => "depacketizer",
            StageKind::Parser => "parser",
            StageKind::Decoder => "decoder",
            StageKind::Convert => "convert",
            StageKind::Scale => "scale",
            StageKind::Filter => "filter",
            StageKind::Selector => "selector",
            StageKind::Sink => "sink",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
