use thiserror::Error;

use crate::descriptor::DefDescriptor;

pub type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor has no namespace separator: {raw}")]
    MissingNamespace { raw: String },

    #[error("descriptor {part} is empty")]
    EmptyPart { part: &'static str },

    #[error("descriptor {part} contains invalid character {ch:?}: {value}")]
    InvalidChar {
        part: &'static str,
        ch: char,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("property reference has no provider: {raw:?}")]
    MissingProvider { raw: String },

    #[error("property reference names no attribute: {raw:?}")]
    MissingAttribute { raw: String },

    #[error("property reference has an empty segment: {raw:?}")]
    EmptySegment { raw: String },
}

/// A value was requested from a component that no longer exists.
///
/// The message format is matched verbatim by error expectations, so it must
/// stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Invalid component tried calling function [{function}] with arguments [{}], {descriptor}",
    .arguments.join(",")
)]
pub struct DestroyedReferenceError {
    /// The capability that was invoked (`get`, `set`).
    pub function: &'static str,
    /// Arguments of the attempted call, typically the property path.
    pub arguments: Vec<String>,
    /// Definition of the destroyed component.
    pub descriptor: DefDescriptor,
}

/// Failure to resolve a value through a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Destroyed(#[from] DestroyedReferenceError),

    #[error("unknown attribute {attribute:?} on {descriptor}")]
    UnknownAttribute {
        attribute: String,
        descriptor: DefDescriptor,
    },

    #[error("unknown value provider {provider:?} in {path}")]
    UnknownProvider { provider: String, path: String },

    #[error("cannot read {segment:?} of a non-container value in {path}")]
    NotAContainer { segment: String, path: String },

    #[error("value provider chain exceeded depth {depth} at {path}")]
    CycleDetected { depth: usize, path: String },

    #[error("component key is not known to this arena")]
    UnknownComponent,

    #[error("component is still pending creation: {descriptor}")]
    Pending { descriptor: DefDescriptor },

    #[error(transparent)]
    Path(#[from] PathError),
}

impl ResolveError {
    /// True for failures caused by a destroyed component.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_reference_message_is_stable() {
        let err = DestroyedReferenceError {
            function: "get",
            arguments: vec!["v.stringAttribute".into()],
            descriptor: DefDescriptor::parse("markup://loadLevelTest:newCmpWithValueProvider")
                .unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid component tried calling function [get] with arguments [v.stringAttribute], \
             markup://loadLevelTest:newCmpWithValueProvider"
        );
        let wrapped = ResolveError::from(err.clone());
        assert!(wrapped.is_destroyed());
        assert_eq!(wrapped.to_string(), err.to_string());
    }
}
