#![forbid(unsafe_code)]

//! Property references of the form `provider.segment[.segment...]`.
//!
//! `v.stringAttribute` reads the `stringAttribute` attribute of a component;
//! `v.map.title` walks into the `title` key of the `map` attribute. The first
//! segment after the provider is always the attribute name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;

/// Provider prefix for component attributes.
pub const ATTRIBUTE_PROVIDER: &str = "v";

/// A parsed property reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    provider: String,
    segments: Vec<String>,
}

impl PropertyRef {
    /// Parse `provider.segment[.segment...]`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the reference has no segment after the
    /// provider or contains an empty segment (`v..x`).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let raw = raw.trim();
        let mut parts = raw.split('.');
        let provider = match parts.next() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(PathError::MissingProvider { raw: raw.into() }),
        };
        let segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.is_empty() {
            return Err(PathError::MissingAttribute { raw: raw.into() });
        }
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment { raw: raw.into() });
        }
        Ok(Self { provider, segments })
    }

    /// Reference to an attribute through the `v` provider.
    ///
    /// # Errors
    ///
    /// See [`PropertyRef::parse`].
    pub fn attribute(path: &str) -> Result<Self, PathError> {
        Self::parse(&format!("{ATTRIBUTE_PROVIDER}.{path}"))
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The attribute name (first segment after the provider).
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.segments[0]
    }

    /// Segments below the attribute, possibly empty.
    #[must_use]
    pub fn sub_path(&self) -> &[String] {
        &self.segments[1..]
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.provider)?;
        for seg in &self.segments {
            write!(f, ".{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for PropertyRef {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PropertyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PropertyRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attribute_reference() {
        let p = PropertyRef::parse("v.stringAttribute").unwrap();
        assert_eq!(p.provider(), "v");
        assert_eq!(p.attribute_name(), "stringAttribute");
        assert!(p.sub_path().is_empty());
        assert_eq!(p.to_string(), "v.stringAttribute");
    }

    #[test]
    fn nested_segments() {
        let p = PropertyRef::attribute("map.title").unwrap();
        assert_eq!(p.attribute_name(), "map");
        assert_eq!(p.sub_path(), ["title".to_string()]);
        assert_eq!(p.to_string(), "v.map.title");
    }

    #[test]
    fn malformed_references() {
        assert!(matches!(
            PropertyRef::parse(""),
            Err(PathError::MissingProvider { .. })
        ));
        assert!(matches!(
            PropertyRef::parse("v"),
            Err(PathError::MissingAttribute { .. })
        ));
        assert!(matches!(
            PropertyRef::parse("v..x"),
            Err(PathError::EmptySegment { .. })
        ));
    }
}
