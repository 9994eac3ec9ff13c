//! Topology construction and lifecycle.
//!
//! This module provides the control-plane view of the running graph:
//!
//! - [`TopologyGraph`]: owns the stages and links (a DAG) and drives the engine
//! - [`SegmentBuilder`] / [`Segment`]: linear chains of stages built in one step
//! - [`DynamicLinker`]: links deferred until a stage announces its output port
//! - [`RunState`]: Idle → Playing → Draining → Stopped
//! - [`events`]: the bus and signal channels the engine reports through
//!
//! # Example
//!
//! ```rust
//! use vswitch::pipeline::{SegmentBuilder, TopologyGraph};
//! use vswitch::engine::SimEngine;
//! use vswitch::pipeline::events::{bus, signals};
//!
//! let (bus_tx, _bus_rx) = bus(64);
//! let (signal_tx, _signal_rx) = signals();
//! let mut graph = TopologyGraph::new(SimEngine::new(bus_tx, signal_tx));
//!
//! let a = SegmentBuilder::parse("a", "videotestsrc name=src0 ! identity name=id0")?
//!     .build(&mut graph)?;
//! let b = SegmentBuilder::parse("b", "videotestsrc name=src1 pattern=1 ! identity name=id1")?
//!     .build(&mut graph)?;
//! let out = SegmentBuilder::parse("out", "input-selector name=sw ! fakesink name=sink")?
//!     .build(&mut graph)?;
//!
//! graph.wire(&[a, b], &out)?;
//! assert_eq!(graph.link_count(), 5);
//! # Ok::<(), vswitch::Error>(())
//! ```

pub mod events;
mod graph;
mod linker;
pub mod parser;
mod segment;
mod state;

pub use events::{BusMessage, BusReceiver, BusSender, SignalReceiver, SignalSender, StageSignal};
pub use graph::{Link, LinkInfo, LinkOutcome, StageId, TopologyGraph};
pub use linker::{DEFAULT_SINK_PORT, DynamicLinker, PendingLink};
pub use parser::{ParsedStage, parse_segment};
pub use segment::{Segment, SegmentBuilder};
pub use state::{Lifecycle, RunState};
