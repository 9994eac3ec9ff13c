//! Stages: the processing units of a topology graph.
//!
//! This module defines the static description of stages:
//!
//! - [`Stage`]: a named, typed unit with ports and a fixed configuration
//! - [`Port`] / [`PortTemplate`]: connection points, static or dynamic
//! - [`StageFactory`]: creates validated stages from factory names
//! - [`StageDescriptor`]: declarative factory + name + properties
//!
//! Stages do not process frames themselves. Execution belongs to the
//! [`Engine`](crate::engine::Engine) the graph drives.

mod caps;
mod descriptor;
mod factory;
mod kind;
mod node;
mod port;
mod property;

pub use caps::{Caps, CapsParseError, CapsValue};
pub use descriptor::StageDescriptor;
pub use factory::{FactoryEntry, PropertySpec, PropertyType, StageFactory};
pub use kind::StageKind;
pub use node::Stage;
pub use port::{Port, PortDirection, PortList, PortPresence, PortTemplate};
pub use property::PropertyValue;
