//! Declarative stage descriptions.

use super::PropertyValue;

/// Everything needed to create a stage: factory, name and properties.
///
/// # Example
///
/// ```rust
/// use vswitch::stage::StageDescriptor;
///
/// let caps = StageDescriptor::new("capsfilter", "caps0")
///     .with("caps", "video/x-raw,width=640,height=480");
/// assert_eq!(caps.name(), "caps0");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StageDescriptor {
    factory: String,
    name: String,
    properties: Vec<(String, PropertyValue)>,
}

impl StageDescriptor {
    /// Describe a stage created from `factory` with the given name.
    pub fn new(factory: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Set a property.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Factory name.
    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties in the order they were given.
    pub fn properties(&self) -> &[(String, PropertyValue)] {
        &self.properties
    }
}
