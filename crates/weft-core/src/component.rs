#![forbid(unsafe_code)]

//! Component instances.
//!
//! Components live inside a [`ComponentArena`](crate::arena::ComponentArena)
//! and are addressed by [`ComponentKey`], a generational slot key. The arena
//! hands out shared references only; every mutation goes through arena
//! methods so lifecycle rules are enforced in one place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use slotmap::new_key_type;

use crate::def::ComponentDef;
use crate::descriptor::DefDescriptor;
use crate::provider::ValueExpr;
use crate::scope::LookupScope;

new_key_type! {
    /// Generational arena key. A key is never valid again once its slot is
    /// freed, so keys double as stable identities.
    pub struct ComponentKey;
}

/// Monotonic, never-reused identity shown to users and the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u64);

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Reserved while its definition is being fetched.
    Pending,
    Live,
    Destroyed,
}

impl LifecycleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Live => "live",
            Self::Destroyed => "destroyed",
        }
    }
}

/// A component instance.
#[derive(Debug, Clone)]
pub struct Component {
    pub(crate) key: ComponentKey,
    pub(crate) global_id: GlobalId,
    pub(crate) descriptor: DefDescriptor,
    pub(crate) def: Option<Arc<ComponentDef>>,
    pub(crate) attributes: BTreeMap<String, ValueExpr>,
    pub(crate) state: LifecycleState,
    pub(crate) local_id: Option<String>,
    pub(crate) parent: Option<ComponentKey>,
    pub(crate) body: Vec<ComponentKey>,
    pub(crate) scope: LookupScope,
}

impl Component {
    #[must_use]
    pub fn key(&self) -> ComponentKey {
        self.key
    }

    #[must_use]
    pub fn global_id(&self) -> GlobalId {
        self.global_id
    }

    #[must_use]
    pub fn descriptor(&self) -> &DefDescriptor {
        &self.descriptor
    }

    /// `None` while pending.
    #[must_use]
    pub fn def(&self) -> Option<&ComponentDef> {
        self.def.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == LifecycleState::Live
    }

    #[must_use]
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    #[must_use]
    pub fn parent(&self) -> Option<ComponentKey> {
        self.parent
    }

    #[must_use]
    pub fn body(&self) -> &[ComponentKey] {
        &self.body
    }

    #[must_use]
    pub fn scope(&self) -> &LookupScope {
        &self.scope
    }

    /// Raw (unresolved) attribute expression.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&ValueExpr> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &ValueExpr)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }
}
