//! Segment description parser using winnow.
//!
//! Parses launch-style segment descriptions:
//!
//! ```text
//! rtspsrc name=src0 location=rtsp://camera.local/stream ! rtph265depay name=depay0
//! videotestsrc pattern=1 ! capsfilter caps="video/x-raw,width=640,height=480"
//! ```
//!
//! # Syntax
//!
//! - Stages are separated by `!`
//! - Properties are specified as `key=value` after the factory name
//! - `name=` sets the stage name; unnamed stages are called `<factory><n>`,
//!   counting per factory within one description
//! - Values can be quoted strings, numbers, booleans, or bare words running
//!   up to the next whitespace or `!`
//! - Whitespace is optional around `!` and `=`

use crate::error::{Error, Result};
use crate::stage::{PropertyValue, StageDescriptor};
use std::collections::HashMap;
use winnow::Parser;
use winnow::ascii::{alpha1, digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, repeat, separated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// A parsed stage: factory name and properties, `name=` included.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStage {
    /// The factory name (e.g., "rtspsrc", "capsfilter").
    pub factory: String,
    /// Properties as key-value pairs.
    pub properties: Vec<(String, PropertyValue)>,
}

/// Parse a segment description into stage descriptors.
///
/// # Example
///
/// ```rust
/// use vswitch::pipeline::parser::parse_segment;
///
/// let stages = parse_segment("videotestsrc name=src1 pattern=1 ! videoconvert").unwrap();
/// assert_eq!(stages.len(), 2);
/// assert_eq!(stages[0].name(), "src1");
/// assert_eq!(stages[1].name(), "videoconvert0");
/// ```
pub fn parse_segment(input: &str) -> Result<Vec<StageDescriptor>> {
    let parsed = parse_stages(input)?;
    let mut counters: HashMap<String, u32> = HashMap::new();

    let descriptors = parsed
        .into_iter()
        .map(|stage| {
            let (names, properties): (Vec<_>, Vec<_>) = stage
                .properties
                .into_iter()
                .partition(|(key, _)| key == "name");

            let name = match names.last() {
                Some((_, value)) => value.as_string(),
                None => {
                    let n = counters.entry(stage.factory.clone()).or_insert(0);
                    let name = format!("{}{}", stage.factory, n);
                    *n += 1;
                    name
                }
            };

            properties
                .into_iter()
                .fold(StageDescriptor::new(stage.factory, name), |d, (k, v)| {
                    d.with(k, v)
                })
        })
        .collect();

    Ok(descriptors)
}

/// Parse a description without assigning names.
pub fn parse_stages(input: &str) -> Result<Vec<ParsedStage>> {
    stages
        .parse(input.trim())
        .map_err(|e| Error::InvalidSegment(format!("parse error: {e}")))
}

/// Parse a complete description.
fn stages(input: &mut &str) -> WResult<Vec<ParsedStage>> {
    let stages = separated(1.., stage, link_separator).parse_next(input)?;

    // Ensure we consumed all input
    ws(input)?;
    if !input.is_empty() {
        return Err(ContextError::new());
    }

    Ok(stages)
}

/// Parse a stage (factory + optional properties).
fn stage(input: &mut &str) -> WResult<ParsedStage> {
    ws(input)?;
    let factory: &str = identifier.parse_next(input)?;
    ws(input)?;

    let properties: Vec<(String, PropertyValue)> = repeat(0.., property).parse_next(input)?;

    Ok(ParsedStage {
        factory: factory.to_string(),
        properties,
    })
}

/// Skip optional whitespace.
fn ws(input: &mut &str) -> WResult<()> {
    multispace0.void().parse_next(input)
}

/// Parse the link separator `!`.
fn link_separator(input: &mut &str) -> WResult<()> {
    (multispace0, '!', multispace0).void().parse_next(input)
}

/// Parse an identifier (factory name or property key).
fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

/// Parse a property (key=value).
fn property(input: &mut &str) -> WResult<(String, PropertyValue)> {
    ws(input)?;

    // Only consume input if this really is `key=`
    let checkpoint = *input;

    let key: &str = match identifier.parse_next(input) {
        Ok(k) => k,
        Err(_) => {
            *input = checkpoint;
            return Err(ContextError::new());
        }
    };

    ws(input)?;

    match input.strip_prefix('=') {
        Some(rest) => *input = rest,
        None => {
            *input = checkpoint;
            return Err(ContextError::new());
        }
    }

    ws(input)?;
    let value = property_value.parse_next(input)?;
    ws(input)?;

    Ok((key.to_string(), value))
}

/// Parse a property value.
fn property_value(input: &mut &str) -> WResult<PropertyValue> {
    alt((
        quoted_string.map(PropertyValue::String),
        terminated_word(boolean).map(PropertyValue::Bool),
        terminated_word(float).map(PropertyValue::Float),
        terminated_word(integer).map(PropertyValue::Integer),
        bare_string.map(PropertyValue::String),
    ))
    .parse_next(input)
}

/// Accept `parser` only if the value ends right after it.
///
/// Keeps `1080p` or `true-color` from being read as a number or boolean
/// followed by garbage.
fn terminated_word<'a, O>(
    mut parser: impl Parser<&'a str, O, ContextError>,
) -> impl Parser<&'a str, O, ContextError> {
    move |input: &mut &'a str| {
        let checkpoint = *input;
        let value = parser.parse_next(input)?;
        match input.chars().next() {
            None => Ok(value),
            Some(c) if c.is_whitespace() || c == '!' => Ok(value),
            Some(_) => {
                *input = checkpoint;
                Err(ContextError::new())
            }
        }
    }
}

/// Parse a quoted string.
fn quoted_string(input: &mut &str) -> WResult<String> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Parse a boolean.
fn boolean(input: &mut &str) -> WResult<bool> {
    alt((
        "true".map(|_| true),
        "false".map(|_| false),
        "yes".map(|_| true),
        "no".map(|_| false),
    ))
    .parse_next(input)
}

/// Parse an integer.
fn integer(input: &mut &str) -> WResult<i64> {
    let (negative, digits): (Option<char>, &str) =
        (opt('-'), digit1::<_, ContextError>).parse_next(input)?;

    // Make sure this isn't a float (no decimal point follows)
    if input.starts_with('.') {
        return Err(ContextError::new());
    }

    let value: i64 = digits.parse().map_err(|_| ContextError::new())?;

    Ok(if negative.is_some() { -value } else { value })
}

/// Parse a float.
fn float(input: &mut &str) -> WResult<f64> {
    let (negative, int_part, _, frac_part): (Option<char>, &str, char, &str) =
        (opt('-'), digit1::<_, ContextError>, '.', digit1).parse_next(input)?;

    let s = format!(
        "{}{}.{}",
        if negative.is_some() { "-" } else { "" },
        int_part,
        frac_part
    );
    s.parse().map_err(|_| ContextError::new())
}

/// Parse a bare (unquoted) string value.
/// Stops at whitespace or `!`.
fn bare_string(input: &mut &str) -> WResult<String> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '!')
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_stage() {
        let result = parse_stages("ximagesink").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].factory, "ximagesink");
        assert!(result[0].properties.is_empty());
    }

    #[test]
    fn test_parse_stage_with_property() {
        let result = parse_stages("videotestsrc num-buffers=100").unwrap();
        assert_eq!(result[0].properties.len(), 1);
        assert_eq!(result[0].properties[0].0, "num-buffers");
        assert_eq!(result[0].properties[0].1, PropertyValue::Integer(100));
    }

    #[test]
    fn test_parse_chain() {
        let result = parse_stages("rtph265depay ! h265parse ! avdec_h265").unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].factory, "rtph265depay");
        assert_eq!(result[1].factory, "h265parse");
        assert_eq!(result[2].factory, "avdec_h265");
    }

    #[test]
    fn test_parse_uri_with_query() {
        let result =
            parse_stages("rtspsrc location=rtsp://10.0.0.2:554/stream?profile=main latency=200")
                .unwrap();
        assert_eq!(
            result[0].properties[0],
            (
                "location".to_string(),
                PropertyValue::String("rtsp://10.0.0.2:554/stream?profile=main".to_string())
            )
        );
        assert_eq!(
            result[0].properties[1],
            ("latency".to_string(), PropertyValue::Integer(200))
        );
    }

    #[test]
    fn test_parse_quoted_string() {
        let result = parse_stages(r#"capsfilter caps="video/x-raw, width=640""#).unwrap();
        assert_eq!(
            result[0].properties[0].1,
            PropertyValue::String("video/x-raw, width=640".to_string())
        );

        let result = parse_stages("uridecodebin uri='file:///tmp/a b.mp4'").unwrap();
        assert_eq!(
            result[0].properties[0].1,
            PropertyValue::String("file:///tmp/a b.mp4".to_string())
        );
    }

    #[test]
    fn test_parse_typed_values() {
        let result =
            parse_stages("identity sync=true silent=no ! queue rate=1.5 offset=-100").unwrap();
        assert_eq!(result[0].properties[0].1, PropertyValue::Bool(true));
        assert_eq!(result[0].properties[1].1, PropertyValue::Bool(false));
        assert_eq!(result[1].properties[0].1, PropertyValue::Float(1.5));
        assert_eq!(result[1].properties[1].1, PropertyValue::Integer(-100));
    }

    #[test]
    fn test_words_starting_with_digits_stay_strings() {
        let result = parse_stages("x mode=1080p flag=trueish").unwrap();
        assert_eq!(
            result[0].properties[0].1,
            PropertyValue::String("1080p".to_string())
        );
        assert_eq!(
            result[0].properties[1].1,
            PropertyValue::String("trueish".to_string())
        );
    }

    #[test]
    fn test_parse_no_spaces() {
        let result = parse_stages("a!b!c").unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[2].factory, "c");
    }

    #[test]
    fn test_names_are_extracted() {
        let stages =
            parse_segment("videoconvert name=conv1 ! videoscale ! videoconvert ! videoconvert")
                .unwrap();
        let names: Vec<&str> = stages.iter().map(StageDescriptor::name).collect();
        assert_eq!(
            names,
            ["conv1", "videoscale0", "videoconvert0", "videoconvert1"]
        );
        assert!(stages[0].properties().is_empty());
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(parse_stages("").is_err());
        assert!(parse_stages("!").is_err());
        assert!(matches!(
            parse_segment("a ! ! b"),
            Err(Error::InvalidSegment(_))
        ));
    }
}
