#![forbid(unsafe_code)]

//! Core: component arena, value providers, definitions, and lookup scopes.

pub mod arena;
pub mod component;
pub mod def;
pub mod descriptor;
pub mod error;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod path;
pub mod provider;
pub mod scope;

pub use arena::ComponentArena;
pub use component::{Component, ComponentKey, GlobalId, LifecycleState};
pub use def::{AttributeDef, ComponentDef};
pub use descriptor::DefDescriptor;
pub use error::{DescriptorError, DestroyedReferenceError, PathError, ResolveError};
pub use path::PropertyRef;
pub use provider::{AttributeProvider, AttributeReference, ValueExpr, ValueProvider};
pub use scope::LookupScope;
