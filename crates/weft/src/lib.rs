#![forbid(unsafe_code)]

//! weft public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use weft_core as core;
pub use weft_runtime as runtime;

pub mod prelude {
    pub use weft_core::{
        AttributeDef, AttributeReference, ComponentArena, ComponentDef, ComponentKey,
        DefDescriptor, LifecycleState, ResolveError, ValueExpr, ValueProvider,
    };
    pub use weft_runtime::{
        ActionBuilder, ActionDef, ActionError, ActionHandle, ActionState, ComponentConfig,
        Creation, CreationState, OfflineTransport, Runtime, RuntimeConfig, RuntimeError, SendContext,
        Transport,
    };
}
