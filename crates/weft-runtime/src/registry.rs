#![forbid(unsafe_code)]

//! Local cache of component definitions.
//!
//! The factory consults the registry first; a miss costs a server round
//! trip, after which the fetched definition is cached here.

use std::collections::HashMap;
use std::sync::Arc;

use weft_core::{ComponentDef, DefDescriptor};

#[derive(Debug, Clone, Default)]
pub struct DefRegistry {
    defs: HashMap<DefDescriptor, Arc<ComponentDef>>,
}

impl DefRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `def`, replacing any previous definition with the same
    /// descriptor.
    pub fn register(&mut self, def: impl Into<Arc<ComponentDef>>) -> Arc<ComponentDef> {
        let def = def.into();
        tracing::trace!(message = "registry.register", descriptor = %def.descriptor);
        self.defs.insert(def.descriptor.clone(), Arc::clone(&def));
        def
    }

    /// Cache `def` only if nothing is registered under its descriptor.
    /// Returns whether it was inserted.
    pub fn register_if_absent(&mut self, def: &Arc<ComponentDef>) -> bool {
        if self.defs.contains_key(&def.descriptor) {
            return false;
        }
        tracing::trace!(message = "registry.register", descriptor = %def.descriptor);
        self.defs.insert(def.descriptor.clone(), Arc::clone(def));
        true
    }

    #[must_use]
    pub fn get(&self, descriptor: &DefDescriptor) -> Option<Arc<ComponentDef>> {
        self.defs.get(descriptor).cloned()
    }

    #[must_use]
    pub fn contains(&self, descriptor: &DefDescriptor) -> bool {
        self.defs.contains_key(descriptor)
    }

    pub fn remove(&mut self, descriptor: &DefDescriptor) -> Option<Arc<ComponentDef>> {
        self.defs.remove(descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
