//! The stage record owned by a topology graph.

use super::{Port, PortDirection, PortList, PortPresence, PortTemplate, PropertyValue, StageKind};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A named processing unit.
///
/// Stages are created by a [`StageFactory`](super::StageFactory) and become
/// owned by the graph they are added to. Only the graph mutates their ports;
/// their configuration is fixed after construction.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    factory: String,
    kind: StageKind,
    config: BTreeMap<String, PropertyValue>,
    templates: Vec<PortTemplate>,
    ports: PortList,
    next_request: u32,
}

impl Stage {
    pub(crate) fn new(
        name: impl Into<String>,
        factory: impl Into<String>,
        kind: StageKind,
        templates: Vec<PortTemplate>,
        config: BTreeMap<String, PropertyValue>,
    ) -> Self {
        let mut ports = PortList::new();
        for template in templates
            .iter()
            .filter(|t| t.presence == PortPresence::Always)
        {
            ports.add(Port::new(
                template.name.clone(),
                template.direction,
                PortPresence::Always,
            ));
        }

        Self {
            name: name.into(),
            factory: factory.into(),
            kind,
            config,
            templates,
            ports,
            next_request: 0,
        }
    }

    /// Get the stage's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the factory this stage was created from (`rtspsrc`, `capsfilter`, ...).
    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Get the stage kind.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Get the construction-time configuration.
    pub fn config(&self) -> &BTreeMap<String, PropertyValue> {
        &self.config
    }

    /// Get one configured property.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.config.get(key)
    }

    /// Get the port templates.
    pub fn templates(&self) -> &[PortTemplate] {
        &self.templates
    }

    /// Get the ports that currently exist.
    pub fn ports(&self) -> &PortList {
        &self.ports
    }

    /// Get a port by name.
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    /// The first always-present output port.
    pub fn static_output(&self) -> Option<&Port> {
        self.ports
            .outputs()
            .find(|p| p.presence() == PortPresence::Always)
    }

    /// The first always-present input port.
    pub fn static_input(&self) -> Option<&Port> {
        self.ports
            .inputs()
            .find(|p| p.presence() == PortPresence::Always)
    }

    /// Whether this stage only exposes outputs after runtime discovery.
    pub fn has_dynamic_outputs(&self) -> bool {
        self.static_output().is_none()
            && self.templates.iter().any(|t| {
                t.direction == PortDirection::Output && t.presence == PortPresence::Sometimes
            })
    }

    /// Whether inputs of this stage are created on request.
    pub fn has_request_inputs(&self) -> bool {
        self.request_template(PortDirection::Input).is_some()
    }

    fn request_template(&self, direction: PortDirection) -> Option<&PortTemplate> {
        self.templates
            .iter()
            .find(|t| t.direction == direction && t.presence == PortPresence::Request)
    }

    /// Add a port announced at runtime.
    ///
    /// Returns `Ok(false)` when the port already exists.
    pub(crate) fn add_dynamic_port(&mut self, name: &str) -> Result<bool> {
        if self.ports.get(name).is_some() {
            return Ok(false);
        }

        let template = self
            .templates
            .iter()
            .find(|t| t.presence == PortPresence::Sometimes && t.matches(name))
            .ok_or_else(|| Error::PortNotFound {
                stage: self.name.clone(),
                port: name.to_string(),
            })?;

        self.ports.add(Port::new(
            name,
            template.direction,
            PortPresence::Sometimes,
        ));
        Ok(true)
    }

    /// Remove a runtime port. Static ports are never removed.
    pub(crate) fn remove_dynamic_port(&mut self, name: &str) -> bool {
        if self.ports.get(name).is_some_and(Port::is_dynamic) {
            self.ports.remove(name).is_some()
        } else {
            false
        }
    }

    /// Create the next input port from the request template (`sink_0`, `sink_1`, ...).
    pub(crate) fn request_input_port(&mut self) -> Result<Port> {
        let template = self
            .request_template(PortDirection::Input)
            .ok_or_else(|| {
                Error::InvalidSegment(format!(
                    "stage '{}' does not provide request input ports",
                    self.name
                ))
            })?;

        let port = Port::new(
            template.port_name(&[self.next_request]),
            PortDirection::Input,
            PortPresence::Request,
        );
        self.next_request += 1;
        self.ports.add(port.clone());
        Ok(port)
    }
}
