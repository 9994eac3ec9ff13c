//! Port abstraction for stage inputs and outputs.
//!
//! Ports are the connection points of stages. A port is either known when the
//! stage is constructed ([`PortPresence::Always`]), appears once the stage has
//! looked at its stream ([`PortPresence::Sometimes`]), or is created on demand
//! by the graph ([`PortPresence::Request`]).

use std::fmt;

/// Direction of a port (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// An input port (receives frames from upstream).
    Input,
    /// An output port (sends frames downstream).
    Output,
}

/// Whether a port is always present or created dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortPresence {
    /// Port is always present on the stage.
    Always,
    /// Port is created by the stage at runtime (e.g., after format discovery).
    Sometimes,
    /// Port is created when the graph requests it.
    Request,
}

/// Template for creating ports.
///
/// The name may contain `%u` placeholders (e.g. `sink_%u`), which are filled
/// with decimal indices when a concrete port is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTemplate {
    /// Name pattern for this port (e.g., "src", "sink", "sink_%u").
    pub name: String,
    /// Direction of this port.
    pub direction: PortDirection,
    /// Whether this port is always present or created on demand.
    pub presence: PortPresence,
}

impl PortTemplate {
    /// Create a new port template.
    pub fn new(name: impl Into<String>, direction: PortDirection, presence: PortPresence) -> Self {
        Self {
            name: name.into(),
            direction,
            presence,
        }
    }

    /// Create a template for an always-present input port.
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Input, PortPresence::Always)
    }

    /// Create a template for an always-present output port.
    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Output, PortPresence::Always)
    }

    /// Create a template for a sometimes-present output port.
    pub fn sometimes_output(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Output, PortPresence::Sometimes)
    }

    /// Create a template for request input ports.
    pub fn request_input(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Input, PortPresence::Request)
    }

    /// Fill the `%u` placeholders with `indices`, in order.
    ///
    /// Missing indices are filled with `0`.
    pub fn port_name(&self, indices: &[u32]) -> String {
        let mut parts = self.name.split("%u");
        let mut out = parts.next().unwrap_or_default().to_string();
        for (i, part) in parts.enumerate() {
            out.push_str(&indices.get(i).copied().unwrap_or(0).to_string());
            out.push_str(part);
        }
        out
    }

    /// Check whether a concrete port name could have come from this template.
    pub fn matches(&self, port_name: &str) -> bool {
        let mut parts = self.name.split("%u");
        let Some(head) = parts.next() else {
            return false;
        };
        let Some(mut rest) = port_name.strip_prefix(head) else {
            return false;
        };
        for literal in parts {
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return false;
            }
            match rest[digits..].strip_prefix(literal) {
                Some(tail) => rest = tail,
                None => return false,
            }
        }
        rest.is_empty()
    }
}

/// A port instance on a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    name: String,
    direction: PortDirection,
    presence: PortPresence,
}

impl Port {
    /// Create a new port.
    pub fn new(name: impl Into<String>, direction: PortDirection, presence: PortPresence) -> Self {
        Self {
            name: name.into(),
            direction,
            presence,
        }
    }

    /// Create a standard static input port named "sink".
    pub fn sink() -> Self {
        Self::new("sink", PortDirection::Input, PortPresence::Always)
    }

    /// Create a standard static output port named "src".
    pub fn src() -> Self {
        Self::new("src", PortDirection::Output, PortPresence::Always)
    }

    /// Get the port's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the port's direction.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Get how the port came into existence.
    pub fn presence(&self) -> PortPresence {
        self.presence
    }

    /// Check if this is an input port.
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Check if this is an output port.
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    /// Check if this port only exists after runtime discovery.
    pub fn is_dynamic(&self) -> bool {
        self.presence == PortPresence::Sometimes
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Collection of ports for a stage.
#[derive(Debug, Default, Clone)]
pub struct PortList {
    ports: Vec<Port>,
}

impl PortList {
    /// Create an empty port list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port to the list.
    pub fn add(&mut self, port: Port) {
        self.ports.push(port);
    }

    /// Remove a port by name, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Port> {
        let idx = self.ports.iter().position(|p| p.name() == name)?;
        Some(self.ports.remove(idx))
    }

    /// Get a port by name.
    pub fn get(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Get all input ports.
    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_input())
    }

    /// Get all output ports.
    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_output())
    }

    /// Get all ports.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    /// Get the number of ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Check if the port list is empty.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_creation() {
        let input = Port::sink();
        assert_eq!(input.name(), "sink");
        assert!(input.is_input());
        assert!(!input.is_dynamic());

        let output = Port::src();
        assert_eq!(output.name(), "src");
        assert!(output.is_output());
    }

    #[test]
    fn test_template_port_name() {
        let template = PortTemplate::request_input("sink_%u");
        assert_eq!(template.port_name(&[0]), "sink_0");
        assert_eq!(template.port_name(&[7]), "sink_7");

        let template = PortTemplate::sometimes_output("recv_rtp_src_%u_%u_%u");
        assert_eq!(template.port_name(&[0, 0, 96]), "recv_rtp_src_0_0_96");
        assert_eq!(template.port_name(&[]), "recv_rtp_src_0_0_0");

        let template = PortTemplate::output("src");
        assert_eq!(template.port_name(&[3]), "src");
    }

    #[test]
    fn test_template_matches() {
        let template = PortTemplate::request_input("sink_%u");
        assert!(template.matches("sink_0"));
        assert!(template.matches("sink_12"));
        assert!(!template.matches("sink_"));
        assert!(!template.matches("sink_a"));
        assert!(!template.matches("src_0"));

        let template = PortTemplate::sometimes_output("recv_rtp_src_%u_%u_%u");
        assert!(template.matches("recv_rtp_src_0_1234_96"));
        assert!(!template.matches("recv_rtp_src_0_1234"));

        let template = PortTemplate::output("src");
        assert!(template.matches("src"));
        assert!(!template.matches("src_0"));
    }

    #[test]
    fn test_port_list() {
        let mut list = PortList::new();
        list.add(Port::sink());
        list.add(Port::src());
        list.add(Port::new(
            "src_0",
            PortDirection::Output,
            PortPresence::Sometimes,
        ));

        assert_eq!(list.len(), 3);
        assert_eq!(list.inputs().count(), 1);
        assert_eq!(list.outputs().count(), 2);
        assert!(list.get("src_0").is_some_and(Port::is_dynamic));

        assert!(list.remove("src_0").is_some());
        assert!(list.get("src_0").is_none());
        assert!(list.remove("src_0").is_none());
    }
}
