//! Capability descriptions (`video/x-raw,width=640,height=480`).
//!
//! Caps are parsed with winnow from the usual comma separated syntax: a media
//! type followed by `key=value` fields. Values may carry a type cast such as
//! `(int)640`, which is accepted and ignored.

use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use winnow::Parser;
use winnow::ascii::multispace0;
use winnow::combinator::{delimited, opt, preceded, repeat};
use winnow::error::ContextError;
use winnow::token::take_while;

type WResult<T> = std::result::Result<T, ContextError>;

/// A single caps field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
    /// Integer field (`width=640`).
    Int(i64),
    /// Any other field, kept verbatim (`framerate=30/1`, `format=I420`).
    Text(String),
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::Int(i) => write!(f, "{i}"),
            CapsValue::Text(s) => f.write_str(s),
        }
    }
}

/// Error returned when a caps string cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed caps '{input}': {reason}")]
pub struct CapsParseError {
    /// The offending input.
    pub input: String,
    /// What was wrong with it.
    pub reason: String,
}

/// A media type with optional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    media_type: String,
    fields: SmallVec<[(String, CapsValue); 4]>,
}

impl Caps {
    /// Create caps for a media type without fields.
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            fields: SmallVec::new(),
        }
    }

    /// Raw video caps with a fixed resolution.
    pub fn raw_video(width: u32, height: u32) -> Self {
        Self::new("video/x-raw")
            .with_field("width", CapsValue::Int(i64::from(width)))
            .with_field("height", CapsValue::Int(i64::from(height)))
    }

    /// Add or replace a field.
    pub fn with_field(mut self, key: impl Into<String>, value: CapsValue) -> Self {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    /// The media type (`video/x-raw`).
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Look up a field.
    pub fn field(&self, key: &str) -> Option<&CapsValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Integer field value.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.field(key)? {
            CapsValue::Int(i) => Some(*i),
            CapsValue::Text(_) => None,
        }
    }

    /// Width and height, when both are present.
    pub fn resolution(&self) -> Option<(i64, i64)> {
        Some((self.int("width")?, self.int("height")?))
    }

    /// Parse a caps string.
    pub fn parse(input: &str) -> Result<Self, CapsParseError> {
        let fail = |reason: String| CapsParseError {
            input: input.to_string(),
            reason,
        };

        let parsed = caps.parse(input.trim()).map_err(|e| fail(e.to_string()))?;

        for key in ["width", "height"] {
            match parsed.field(key) {
                None => {}
                Some(CapsValue::Int(v)) if *v > 0 => {}
                Some(other) => {
                    return Err(fail(format!(
                        "{key} must be a positive integer, got '{other}'"
                    )));
                }
            }
        }

        Ok(parsed)
    }
}

impl FromStr for Caps {
    type Err = CapsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Caps::parse(s)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        for (key, value) in &self.fields {
            write!(f, ",{key}={value}")?;
        }
        Ok(())
    }
}

fn caps(input: &mut &str) -> WResult<Caps> {
    let media_type = media_type.parse_next(input)?;
    let fields: Vec<(String, CapsValue)> = repeat(0.., preceded(separator, field)).parse_next(input)?;

    Ok(Caps {
        media_type: media_type.to_string(),
        fields: fields.into_iter().collect(),
    })
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+')
}

/// `video/x-raw`
fn media_type<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        take_while(1.., is_token_char),
        '/',
        take_while(1.., is_token_char),
    )
        .take()
        .parse_next(input)
}

fn separator(input: &mut &str) -> WResult<()> {
    (multispace0, ',', multispace0).void().parse_next(input)
}

fn field_name<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., is_token_char).parse_next(input)
}

/// `(int)`
fn type_cast<'a>(input: &mut &'a str) -> WResult<&'a str> {
    delimited('(', take_while(1.., char::is_alphanumeric), ')').parse_next(input)
}

fn field_value<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| c != ',' && !c.is_whitespace()).parse_next(input)
}

fn field(input: &mut &str) -> WResult<(String, CapsValue)> {
    let (key, _, _, _, _, raw) = (
        field_name,
        multispace0,
        '=',
        multispace0,
        opt(type_cast),
        field_value,
    )
        .parse_next(input)?;

    let value = match raw.parse::<i64>() {
        Ok(i) => CapsValue::Int(i),
        Err(_) => CapsValue::Text(raw.to_string()),
    };
    Ok((key.to_string(), value))
}
