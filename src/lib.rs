//! # vswitch
//!
//! Timed switching between two live video inputs.
//!
//! vswitch builds a graph of processing stages from named segments, links
//! stages whose outputs only appear at runtime as soon as the engine announces
//! them, merges every input into one selector stage and flips the selector's
//! active input on a fixed period. Errors and end-of-stream tear the whole
//! graph down.
//!
//! ## Features
//!
//! - **Segments**: ordered stage chains, built from descriptors or a
//!   launch-style description
//! - **Deferred links**: links from stages with dynamic outputs are made when
//!   the output port is announced, exactly once
//! - **Single-task control plane**: bus messages, port signals and switch
//!   ticks are handled serially by one `tokio::select!` loop
//! - **Pluggable engine**: the graph drives any [`engine::Engine`]; the
//!   built-in [`engine::SimEngine`] moves synthetic frames between tokio tasks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vswitch::prelude::*;
//!
//! # async fn demo() -> vswitch::Result<()> {
//! let config = AppConfig::default().with_video_file("clip.mp4");
//! let reason = vswitch::app::run(&config, tokio::signal::ctrl_c()).await?;
//! println!("finished: {reason}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod stage;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{AppConfig, Invocation};
    pub use crate::control::{Controller, ExitReason, SwitchController};
    pub use crate::engine::{Engine, EngineState, SimEngine};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{RunState, Segment, SegmentBuilder, StageId, TopologyGraph};
    pub use crate::stage::{PropertyValue, StageDescriptor, StageKind};
}

pub use error::{Error, Result};
