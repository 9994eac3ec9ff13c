//! Execution engines.
//!
//! The topology graph describes *what* is connected; an [`Engine`] makes the
//! data flow. The graph calls into the engine for every structural change and
//! the engine reports back asynchronously through the bus and the signal
//! queue (see [`crate::pipeline::events`]).
//!
//! [`SimEngine`] is the built-in engine. It runs every stage as a tokio task
//! and moves synthetic frames between them.

pub mod sim;

use crate::error::Result;
use crate::stage::{PropertyValue, Stage};

pub use sim::{SimConfig, SimEngine};

/// Selector property naming the forwarded input.
pub const ACTIVE_PAD: &str = "active-pad";
/// Selector property counting linked inputs.
pub const N_PADS: &str = "n-pads";
/// Identity property holding the last processed frame description.
pub const LAST_MESSAGE: &str = "last-message";

/// State the engine executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    /// Nothing allocated.
    #[default]
    Null,
    /// Resources allocated, no data flowing.
    Ready,
    /// Data flowing.
    Playing,
}

/// The collaborator a [`TopologyGraph`](crate::pipeline::TopologyGraph) drives.
///
/// All calls come from the control plane, one at a time. Stages are
/// identified by their unique name.
pub trait Engine {
    /// Take ownership of a stage's runtime counterpart.
    fn register(&mut self, stage: &Stage) -> Result<()>;

    /// Connect `src:src_port` to `sink:sink_port`.
    fn link(&mut self, src: &str, src_port: &str, sink: &str, sink_port: &str) -> Result<()>;

    /// Disconnect a previously established link.
    fn unlink(&mut self, src: &str, src_port: &str, sink: &str, sink_port: &str) -> Result<()>;

    /// Change the execution state.
    fn set_state(&mut self, state: EngineState) -> Result<()>;

    /// Read a runtime property.
    ///
    /// Returns `None` if the stage or the property does not exist.
    fn property(&self, stage: &str, key: &str) -> Option<PropertyValue>;

    /// Write a runtime property.
    fn set_property(&mut self, stage: &str, key: &str, value: PropertyValue) -> Result<()>;

    /// Drop the runtime counterpart of a stage.
    fn release(&mut self, stage: &str);
}

#[cfg(test)]
pub(crate) mod mock {
    //! An engine that records every call instead of executing anything.

    use super::{Engine, EngineState};
    use crate::error::{Error, Result};
    use crate::stage::{PropertyValue, Stage};
    use std::collections::{HashMap, HashSet};

    /// A recorded link: `(src, src_port, sink, sink_port)`.
    pub type LinkCall = (String, String, String, String);

    #[derive(Debug, Default)]
    pub struct MockEngine {
        pub registered: Vec<String>,
        pub links: Vec<LinkCall>,
        pub unlinks: Vec<LinkCall>,
        pub states: Vec<EngineState>,
        pub released: Vec<String>,
        pub properties: HashMap<(String, String), PropertyValue>,
        pub refuse_register: HashSet<String>,
        pub refuse_links: bool,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::default()
        }

        /// Preset a runtime property.
        pub fn set(&mut self, stage: &str, key: &str, value: impl Into<PropertyValue>) {
            self.properties
                .insert((stage.to_string(), key.to_string()), value.into());
        }

        pub fn release_count(&self, stage: &str) -> usize {
            self.released.iter().filter(|s| *s == stage).count()
        }
    }

    fn call(src: &str, src_port: &str, sink: &str, sink_port: &str) -> LinkCall {
        (
            src.to_string(),
            src_port.to_string(),
            sink.to_string(),
            sink_port.to_string(),
        )
    }

    impl Engine for MockEngine {
        fn register(&mut self, stage: &Stage) -> Result<()> {
            if self.refuse_register.contains(stage.name()) {
                return Err(Error::Engine(format!("refusing '{}'", stage.name())));
            }
            self.registered.push(stage.name().to_string());
            Ok(())
        }

        fn link(&mut self, src: &str, src_port: &str, sink: &str, sink_port: &str) -> Result<()> {
            if self.refuse_links {
                return Err(Error::Engine("incompatible formats".into()));
            }
            self.links.push(call(src, src_port, sink, sink_port));
            Ok(())
        }

        fn unlink(&mut self, src: &str, src_port: &str, sink: &str, sink_port: &str) -> Result<()> {
            self.unlinks.push(call(src, src_port, sink, sink_port));
            Ok(())
        }

        fn set_state(&mut self, state: EngineState) -> Result<()> {
            self.states.push(state);
            Ok(())
        }

        fn property(&self, stage: &str, key: &str) -> Option<PropertyValue> {
            self.properties
                .get(&(stage.to_string(), key.to_string()))
                .cloned()
        }

        fn set_property(&mut self, stage: &str, key: &str, value: PropertyValue) -> Result<()> {
            self.set(stage, key, value);
            Ok(())
        }

        fn release(&mut self, stage: &str) {
            self.released.push(stage.to_string());
        }
    }
}
