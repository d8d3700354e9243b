#![forbid(unsafe_code)]

//! Qualified definition names.
//!
//! A definition is addressed as `prefix://namespace:name`, for example
//! `markup://loadLevelTest:displayMap`. The prefix names the definition
//! language; components are always `markup`.
//!
//! Descriptors are cheap to clone (the parts are shared `Arc<str>`) and
//! serialize as their qualified string form.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DescriptorError;

/// Prefix used when a descriptor is written without one.
pub const DEFAULT_PREFIX: &str = "markup";

/// A parsed `prefix://namespace:name` definition reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefDescriptor {
    prefix: Arc<str>,
    namespace: Arc<str>,
    name: Arc<str>,
}

impl DefDescriptor {
    /// Build a descriptor from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] if any part is empty or contains a
    /// separator character.
    pub fn new(prefix: &str, namespace: &str, name: &str) -> Result<Self, DescriptorError> {
        validate_part("prefix", prefix)?;
        validate_part("namespace", namespace)?;
        validate_part("name", name)?;
        Ok(Self {
            prefix: prefix.into(),
            namespace: namespace.into(),
            name: name.into(),
        })
    }

    /// Shorthand for a `markup://namespace:name` descriptor.
    ///
    /// # Errors
    ///
    /// See [`DefDescriptor::new`].
    pub fn markup(namespace: &str, name: &str) -> Result<Self, DescriptorError> {
        Self::new(DEFAULT_PREFIX, namespace, name)
    }

    /// Parse `prefix://namespace:name` or `namespace:name`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when the namespace separator is missing or
    /// a part is empty.
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let raw = raw.trim();
        let (prefix, rest) = match raw.split_once("://") {
            Some((prefix, rest)) => (prefix, rest),
            None => (DEFAULT_PREFIX, raw),
        };
        let Some((namespace, name)) = rest.split_once(':') else {
            return Err(DescriptorError::MissingNamespace {
                raw: raw.to_string(),
            });
        };
        Self::new(prefix, namespace, name)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully qualified form, e.g. `markup://ui:button`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.to_string()
    }
}

fn validate_part(part: &'static str, value: &str) -> Result<(), DescriptorError> {
    if value.is_empty() {
        return Err(DescriptorError::EmptyPart { part });
    }
    if let Some(ch) = value
        .chars()
        .find(|c| matches!(c, ':' | '/') || c.is_whitespace())
    {
        return Err(DescriptorError::InvalidChar {
            part,
            ch,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for DefDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.prefix, self.namespace, self.name)
    }
}

impl FromStr for DefDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DefDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DefDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_qualified() {
        let d = DefDescriptor::parse("markup://loadLevelTest:displayMap").unwrap();
        assert_eq!(d.prefix(), "markup");
        assert_eq!(d.namespace(), "loadLevelTest");
        assert_eq!(d.name(), "displayMap");
        assert_eq!(d.to_string(), "markup://loadLevelTest:displayMap");
    }

    #[test]
    fn parse_without_prefix_defaults_to_markup() {
        let d = DefDescriptor::parse("ui:button").unwrap();
        assert_eq!(d, DefDescriptor::markup("ui", "button").unwrap());
    }

    #[test]
    fn missing_namespace_rejected() {
        assert!(matches!(
            DefDescriptor::parse("markup://button"),
            Err(DescriptorError::MissingNamespace { .. })
        ));
    }

    #[test]
    fn empty_and_invalid_parts_rejected() {
        assert!(matches!(
            DefDescriptor::parse("markup://:button"),
            Err(DescriptorError::EmptyPart { part: "namespace" })
        ));
        assert!(matches!(
            DefDescriptor::parse("markup://ui:but:ton"),
            Err(DescriptorError::InvalidChar { ch: ':', .. })
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let d = DefDescriptor::markup("ui", "button").unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"markup://ui:button\"");
        let back: DefDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(serde_json::from_str::<DefDescriptor>("\"nonsense\"").is_err());
    }
}
