#![forbid(unsafe_code)]

//! Value providers and provider-bearing value trees.
//!
//! A [`ValueProvider`] is either a literal or a reference to an attribute of
//! another component. References are resolved lazily against a
//! [`ComponentArena`]; nothing is captured at reference time except the
//! owner's key and descriptor, so a reference whose owner has been destroyed
//! fails with [`DestroyedReferenceError`](crate::error::DestroyedReferenceError)
//! instead of yielding stale data.
//!
//! [`ValueExpr`] nests providers inside maps and lists. It is the storage
//! format for component attributes and action parameters alike.
//!
//! # Invariants
//!
//! 1. Resolving a literal never fails.
//! 2. A reference resolves only while its owner is `Live`.
//! 3. [`ValueExpr::resolve_each`] reports exactly one error per failing
//!    reference site, in depth-first order, and substitutes `null` for it.
//!    A reference whose target attribute itself holds failing references
//!    reports those sites instead of a single error for the chain.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::arena::ComponentArena;
use crate::component::ComponentKey;
use crate::descriptor::DefDescriptor;
use crate::error::ResolveError;
use crate::path::PropertyRef;

/// The attribute-reading capability bound to exactly one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeProvider {
    owner: ComponentKey,
    descriptor: DefDescriptor,
}

impl AttributeProvider {
    pub(crate) fn new(owner: ComponentKey, descriptor: DefDescriptor) -> Self {
        Self { owner, descriptor }
    }

    #[must_use]
    pub fn owner(&self) -> ComponentKey {
        self.owner
    }

    /// Definition of the owning component, kept for error reporting after the
    /// owner is gone.
    #[must_use]
    pub fn descriptor(&self) -> &DefDescriptor {
        &self.descriptor
    }

    /// Read `path` from the owning component.
    ///
    /// # Errors
    ///
    /// Fails with [`ResolveError::Destroyed`] once the owner is destroyed,
    /// and with the other [`ResolveError`] variants for malformed paths or
    /// undeclared attributes.
    pub fn get(&self, arena: &ComponentArena, path: &PropertyRef) -> Result<Value, ResolveError> {
        arena.resolve_through(self, path, 0)
    }
}

/// A symbolic reference to `path` on a specific component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReference {
    provider: AttributeProvider,
    path: PropertyRef,
}

impl AttributeReference {
    #[must_use]
    pub fn new(provider: AttributeProvider, path: PropertyRef) -> Self {
        Self { provider, path }
    }

    #[must_use]
    pub fn provider(&self) -> &AttributeProvider {
        &self.provider
    }

    #[must_use]
    pub fn path(&self) -> &PropertyRef {
        &self.path
    }

    #[must_use]
    pub fn target(&self) -> ComponentKey {
        self.provider.owner
    }
}

/// A resolvable leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueProvider {
    Literal(Value),
    Reference(AttributeReference),
}

impl ValueProvider {
    /// Resolve to a concrete value.
    ///
    /// # Errors
    ///
    /// Only references can fail; see [`AttributeProvider::get`].
    pub fn resolve(&self, arena: &ComponentArena) -> Result<Value, ResolveError> {
        self.resolve_at(arena, 0)
    }

    pub(crate) fn resolve_at(
        &self,
        arena: &ComponentArena,
        depth: usize,
    ) -> Result<Value, ResolveError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Reference(r) => arena.resolve_through(&r.provider, &r.path, depth),
        }
    }
}

/// A value tree whose leaves are providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Provided(ValueProvider),
    Map(BTreeMap<String, ValueExpr>),
    List(Vec<ValueExpr>),
}

impl ValueExpr {
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Provided(ValueProvider::Literal(value.into()))
    }

    #[must_use]
    pub fn null() -> Self {
        Self::Provided(ValueProvider::Literal(Value::Null))
    }

    #[must_use]
    pub fn reference(reference: AttributeReference) -> Self {
        Self::Provided(ValueProvider::Reference(reference))
    }

    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ValueExpr)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn list(items: impl IntoIterator<Item = ValueExpr>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Lift a plain JSON value; objects and arrays become `Map`/`List`.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            other => Self::literal(other),
        }
    }

    /// The literal value if this is a literal leaf.
    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Provided(ValueProvider::Literal(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(Value::as_str)
    }

    /// Child entry of a `Map`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ValueExpr> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// All reference sites in depth-first order.
    #[must_use]
    pub fn references(&self) -> Vec<&AttributeReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a AttributeReference>) {
        match self {
            Self::Provided(ValueProvider::Reference(r)) => out.push(r),
            Self::Provided(ValueProvider::Literal(_)) => {}
            Self::Map(m) => m.values().for_each(|v| v.collect_references(out)),
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
        }
    }

    /// True if any leaf references `key`.
    #[must_use]
    pub fn references_component(&self, key: ComponentKey) -> bool {
        self.references().iter().any(|r| r.target() == key)
    }

    /// Resolve the whole tree, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`ResolveError`] met in depth-first order.
    pub fn resolve(&self, arena: &ComponentArena) -> Result<Value, ResolveError> {
        self.resolve_at(arena, 0)
    }

    pub(crate) fn resolve_at(
        &self,
        arena: &ComponentArena,
        depth: usize,
    ) -> Result<Value, ResolveError> {
        match self {
            Self::Provided(p) => p.resolve_at(arena, depth),
            Self::Map(m) => {
                let mut obj = Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.resolve_at(arena, depth)?);
                }
                Ok(Value::Object(obj))
            }
            Self::List(items) => items
                .iter()
                .map(|v| v.resolve_at(arena, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    /// Resolve every site, pushing one error per failing reference and
    /// substituting `null` for it. Sites reached through a referenced
    /// attribute count as sites of their own.
    pub fn resolve_each(&self, arena: &ComponentArena, errors: &mut Vec<ResolveError>) -> Value {
        self.resolve_each_at(arena, 0, errors)
    }

    pub(crate) fn resolve_each_at(
        &self,
        arena: &ComponentArena,
        depth: usize,
        errors: &mut Vec<ResolveError>,
    ) -> Value {
        match self {
            Self::Provided(ValueProvider::Literal(v)) => v.clone(),
            Self::Provided(ValueProvider::Reference(r)) => {
                arena.collect_through(&r.provider, &r.path, depth, errors)
            }
            Self::Map(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.resolve_each_at(arena, depth, errors)))
                    .collect(),
            ),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|v| v.resolve_each_at(arena, depth, errors))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for ValueExpr {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl From<AttributeReference> for ValueExpr {
    fn from(reference: AttributeReference) -> Self {
        Self::reference(reference)
    }
}
