//! Stage factory for creating stages from descriptors.
//!
//! Every factory entry declares the stage kind, its port templates and the
//! properties it accepts. Configuration is validated here, so a stage that
//! makes it into a graph is always well-formed.

use super::{Caps, PortTemplate, PropertyValue, Stage, StageDescriptor, StageKind};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Accepted type of a stage property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Any value, stored as a string.
    String,
    /// Integer in an inclusive range.
    Int {
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },
    /// Boolean.
    Bool,
    /// Caps string, parsed into [`Caps`].
    Caps,
    /// URI with one of the given schemes.
    Uri(&'static [&'static str]),
}

/// A property a factory accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property key.
    pub name: &'static str,
    /// Accepted type.
    pub ty: PropertyType,
}

impl PropertySpec {
    /// Create a property spec.
    pub const fn new(name: &'static str, ty: PropertyType) -> Self {
        Self { name, ty }
    }
}

/// Description of one registered factory.
#[derive(Debug, Clone)]
pub struct FactoryEntry {
    /// Kind of stage this factory creates.
    pub kind: StageKind,
    /// Port templates of created stages.
    pub templates: Vec<PortTemplate>,
    /// Accepted properties.
    pub properties: Vec<PropertySpec>,
}

impl FactoryEntry {
    /// Create an entry.
    pub fn new(kind: StageKind, templates: Vec<PortTemplate>, properties: &[PropertySpec]) -> Self {
        Self {
            kind,
            templates,
            properties: properties.to_vec(),
        }
    }

    /// An entry with one static `sink` input and one static `src` output.
    pub fn pass_through(kind: StageKind, properties: &[PropertySpec]) -> Self {
        Self::new(
            kind,
            vec![PortTemplate::input("sink"), PortTemplate::output("src")],
            properties,
        )
    }
}

const NO_PROPERTIES: &[PropertySpec] = &[];
const SYNC: PropertySpec = PropertySpec::new("sync", PropertyType::Bool);

/// Registry of stage factories.
#[derive(Debug, Clone)]
pub struct StageFactory {
    entries: HashMap<String, FactoryEntry>,
}

impl StageFactory {
    /// Create a factory with the built-in stages registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();

        // Sources
        factory.register(
            "rtspsrc",
            FactoryEntry::new(
                StageKind::Source,
                vec![PortTemplate::sometimes_output("recv_rtp_src_%u_%u_%u")],
                &[
                    PropertySpec::new("location", PropertyType::Uri(&["rtsp", "rtsps", "rtspt"])),
                    PropertySpec::new(
                        "latency",
                        PropertyType::Int {
                            min: 0,
                            max: u32::MAX as i64,
                        },
                    ),
                ],
            ),
        );
        factory.register(
            "uridecodebin",
            FactoryEntry::new(
                StageKind::Source,
                vec![PortTemplate::sometimes_output("src_%u")],
                &[PropertySpec::new(
                    "uri",
                    PropertyType::Uri(&["file", "http", "https", "rtsp"]),
                )],
            ),
        );
        factory.register(
            "videotestsrc",
            FactoryEntry::new(
                StageKind::Source,
                vec![PortTemplate::output("src")],
                &[
                    PropertySpec::new("pattern", PropertyType::Int { min: 0, max: 25 }),
                    PropertySpec::new(
                        "num-buffers",
                        PropertyType::Int {
                            min: -1,
                            max: i32::MAX as i64,
                        },
                    ),
                    PropertySpec::new("is-live", PropertyType::Bool),
                ],
            ),
        );

        // Depacketizers, parsers and decoders
        for name in ["rtph265depay", "rtph264depay"] {
            factory.register(
                name,
                FactoryEntry::pass_through(StageKind::Depacketizer, NO_PROPERTIES),
            );
        }
        for name in ["h265parse", "h264parse"] {
            factory.register(
                name,
                FactoryEntry::pass_through(
                    StageKind::Parser,
                    &[PropertySpec::new(
                        "config-interval",
                        PropertyType::Int { min: -1, max: 3600 },
                    )],
                ),
            );
        }
        for name in ["avdec_h265", "avdec_h264"] {
            factory.register(
                name,
                FactoryEntry::pass_through(
                    StageKind::Decoder,
                    &[PropertySpec::new(
                        "max-threads",
                        PropertyType::Int { min: 0, max: 64 },
                    )],
                ),
            );
        }

        // Video processing
        factory.register(
            "videoconvert",
            FactoryEntry::pass_through(StageKind::Convert, NO_PROPERTIES),
        );
        factory.register(
            "videoscale",
            FactoryEntry::pass_through(
                StageKind::Scale,
                &[PropertySpec::new("add-borders", PropertyType::Bool)],
            ),
        );
        factory.register(
            "capsfilter",
            FactoryEntry::pass_through(
                StageKind::Filter,
                &[PropertySpec::new("caps", PropertyType::Caps)],
            ),
        );
        factory.register(
            "identity",
            FactoryEntry::pass_through(
                StageKind::Filter,
                &[
                    SYNC,
                    PropertySpec::new("silent", PropertyType::Bool),
                    PropertySpec::new("single-segment", PropertyType::Bool),
                ],
            ),
        );
        factory.register(
            "queue",
            FactoryEntry::pass_through(
                StageKind::Filter,
                &[PropertySpec::new(
                    "max-size-buffers",
                    PropertyType::Int {
                        min: 0,
                        max: u32::MAX as i64,
                    },
                )],
            ),
        );

        // Selection
        factory.register(
            "input-selector",
            FactoryEntry::new(
                StageKind::Selector,
                vec![
                    PortTemplate::request_input("sink_%u"),
                    PortTemplate::output("src"),
                ],
                &[
                    PropertySpec::new("sync-streams", PropertyType::Bool),
                    PropertySpec::new("cache-buffers", PropertyType::Bool),
                ],
            ),
        );

        // Sinks
        for name in ["ximagesink", "autovideosink", "fakesink"] {
            factory.register(
                name,
                FactoryEntry::new(StageKind::Sink, vec![PortTemplate::input("sink")], &[SYNC]),
            );
        }

        factory
    }

    /// Create a factory with nothing registered.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a factory entry, replacing any previous one with that name.
    pub fn register(&mut self, name: &str, entry: FactoryEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    /// Check if a factory is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Look up a factory entry.
    pub fn entry(&self, name: &str) -> Option<&FactoryEntry> {
        self.entries.get(name)
    }

    /// List all registered factory names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a stage from a descriptor.
    pub fn create(&self, descriptor: &StageDescriptor) -> Result<Stage> {
        self.create_stage(
            descriptor.factory(),
            descriptor.name(),
            descriptor.properties(),
        )
    }

    /// Create a stage.
    ///
    /// Fails with [`Error::UnknownStageKind`] if `factory` is not registered
    /// and [`Error::ConfigRejected`] if any property is unknown or invalid.
    pub fn create_stage(
        &self,
        factory: &str,
        name: &str,
        config: &[(String, PropertyValue)],
    ) -> Result<Stage> {
        let entry = self
            .entries
            .get(factory)
            .ok_or_else(|| Error::UnknownStageKind(factory.to_string()))?;

        if name.is_empty() {
            return Err(Error::rejected(factory, "name", "stage name must not be empty"));
        }

        let mut validated = BTreeMap::new();
        for (key, value) in config {
            let spec = entry
                .properties
                .iter()
                .find(|p| p.name == key.as_str())
                .ok_or_else(|| Error::rejected(name, key, format!("'{factory}' has no such property")))?;
            validated.insert(key.clone(), coerce(name, spec, value)?);
        }

        Ok(Stage::new(
            name,
            factory,
            entry.kind,
            entry.templates.clone(),
            validated,
        ))
    }
}

impl Default for StageFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn coerce(stage: &str, spec: &PropertySpec, value: &PropertyValue) -> Result<PropertyValue> {
    let reject = |reason: String| Error::rejected(stage, spec.name, reason);

    match spec.ty {
        PropertyType::String => Ok(PropertyValue::String(value.as_string())),
        PropertyType::Int { min, max } => {
            let v = value
                .as_i64()
                .ok_or_else(|| reject(format!("expected integer, got {} '{value}'", value.type_name())))?;
            if v < min || v > max {
                return Err(reject(format!("{v} is outside {min}..={max}")));
            }
            Ok(PropertyValue::Integer(v))
        }
        PropertyType::Bool => value
            .as_bool()
            .map(PropertyValue::Bool)
            .ok_or_else(|| reject(format!("expected boolean, got '{value}'"))),
        PropertyType::Caps => match value {
            PropertyValue::Caps(c) => Ok(PropertyValue::Caps(c.clone())),
            PropertyValue::String(s) => Caps::parse(s)
                .map(PropertyValue::Caps)
                .map_err(|e| reject(e.to_string())),
            other => Err(reject(format!("expected caps, got {}", other.type_name()))),
        },
        PropertyType::Uri(schemes) => {
            let raw = value
                .as_str()
                .ok_or_else(|| reject(format!("expected URI, got {}", value.type_name())))?;
            let url = Url::parse(raw).map_err(|e| reject(format!("malformed URI '{raw}': {e}")))?;
            if !schemes.contains(&url.scheme()) {
                return Err(reject(format!(
                    "unsupported scheme '{}', expected one of {schemes:?}",
                    url.scheme()
                )));
            }
            Ok(PropertyValue::String(raw.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::PortPresence;

    fn props(pairs: &[(&str, PropertyValue)]) -> Vec<(String, PropertyValue)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_builtin_factories() {
        let factory = StageFactory::new();
        for name in [
            "rtspsrc",
            "rtph265depay",
            "h265parse",
            "avdec_h265",
            "videoconvert",
            "videoscale",
            "capsfilter",
            "identity",
            "input-selector",
            "uridecodebin",
            "videotestsrc",
            "ximagesink",
        ] {
            assert!(factory.is_registered(name), "{name} missing");
        }
        assert!(!factory.is_registered("nvh265dec"));
    }

    #[test]
    fn test_unknown_kind() {
        let factory = StageFactory::new();
        let err = factory.create_stage("doesnotexist", "x", &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownStageKind(k) if k == "doesnotexist"));
    }

    #[test]
    fn test_caps_are_parsed() {
        let factory = StageFactory::new();
        let stage = factory
            .create_stage(
                "capsfilter",
                "caps0",
                &props(&[("caps", "video/x-raw,width=640,height=480".into())]),
            )
            .unwrap();

        let caps = stage.property("caps").and_then(PropertyValue::as_caps).unwrap();
        assert_eq!(caps.resolution(), Some((640, 480)));
    }

    #[test]
    fn test_malformed_resolution_rejected() {
        let factory = StageFactory::new();
        let err = factory
            .create_stage(
                "capsfilter",
                "caps0",
                &props(&[("caps", "video/x-raw,width=six-forty".into())]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConfigRejected { ref key, .. } if key == "caps"));
    }

    #[test]
    fn test_unknown_property_rejected() {
        let factory = StageFactory::new();
        let err = factory
            .create_stage("identity", "id", &props(&[("colour", "blue".into())]))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigRejected { .. }));
    }

    #[test]
    fn test_type_and_range_checks() {
        let factory = StageFactory::new();

        let stage = factory
            .create_stage("identity", "id", &props(&[("sync", "true".into())]))
            .unwrap();
        assert_eq!(stage.property("sync"), Some(&PropertyValue::Bool(true)));

        assert!(
            factory
                .create_stage("identity", "id", &props(&[("sync", "often".into())]))
                .is_err()
        );
        assert!(
            factory
                .create_stage("videotestsrc", "t", &props(&[("pattern", 99i64.into())]))
                .is_err()
        );
        assert!(
            factory
                .create_stage("videotestsrc", "t", &props(&[("num-buffers", (-1i64).into())]))
                .is_ok()
        );
    }

    #[test]
    fn test_uri_scheme_checks() {
        let factory = StageFactory::new();
        assert!(
            factory
                .create_stage(
                    "rtspsrc",
                    "src0",
                    &props(&[("location", "rtsp://camera.local:554/stream".into())]),
                )
                .is_ok()
        );
        assert!(
            factory
                .create_stage("rtspsrc", "src0", &props(&[("location", "http://x/".into())]))
                .is_err()
        );
        assert!(
            factory
                .create_stage("uridecodebin", "dec", &props(&[("uri", "not a uri".into())]))
                .is_err()
        );
    }

    #[test]
    fn test_templates_follow_kind() {
        let factory = StageFactory::new();

        let src = factory.create_stage("rtspsrc", "src0", &[]).unwrap();
        assert_eq!(src.kind(), StageKind::Source);
        assert!(src.has_dynamic_outputs());

        let selector = factory.create_stage("input-selector", "sw", &[]).unwrap();
        assert!(selector.has_request_inputs());
        assert!(
            selector
                .templates()
                .iter()
                .any(|t| t.presence == PortPresence::Request)
        );
    }

    #[test]
    fn test_custom_registration() {
        let mut factory = StageFactory::empty();
        assert!(factory.list().is_empty());

        factory.register(
            "mirror",
            FactoryEntry::pass_through(StageKind::Filter, NO_PROPERTIES),
        );
        assert_eq!(factory.list(), vec!["mirror".to_string()]);
        assert!(factory.create_stage("mirror", "m", &[]).is_ok());
    }
}
