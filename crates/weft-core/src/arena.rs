#![forbid(unsafe_code)]

//! Generational component arena.
//!
//! Every component lives in one slot of a [`SlotMap`]. Destruction is
//! immediate and synchronous but does not free the slot: the component is
//! flipped to [`LifecycleState::Destroyed`] and its attributes are dropped,
//! leaving a tombstone. [`ComponentArena::sweep`] frees tombstones at the
//! end of a scheduling turn, which bumps the slot generation so the old key
//! can never alias a later component.
//!
//! Keys of the most recently freed components are remembered together with
//! their descriptor, so a late key-based lookup still fails with a
//! [`DestroyedReferenceError`] naming the right definition. The graveyard is
//! a bounded FIFO; keys evicted from it report as unknown. References never
//! depend on it since they carry their owner's descriptor.
//!
//! # Invariants
//!
//! 1. A [`GlobalId`] is assigned once and never reused.
//! 2. Only `Live` components resolve values.
//! 3. Destroying a component destroys its body, detaches it from its
//!    parent's body and scope, and is a no-op the second time.
//! 4. [`ComponentArena::find`] never returns a component that is not `Live`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use slotmap::SlotMap;

use crate::component::{Component, ComponentKey, GlobalId, LifecycleState};
use crate::def::ComponentDef;
use crate::descriptor::DefDescriptor;
use crate::error::{DestroyedReferenceError, ResolveError};
use crate::path::{ATTRIBUTE_PROVIDER, PropertyRef};
use crate::provider::{AttributeProvider, AttributeReference, ValueExpr};
use crate::scope::LookupScope;

/// Default bound on chained provider lookups.
pub const DEFAULT_MAX_RESOLVE_DEPTH: usize = 16;

/// Default number of freed keys whose descriptor is remembered.
pub const DEFAULT_GRAVEYARD_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct ComponentArena {
    slots: SlotMap<ComponentKey, Component>,
    graveyard: HashMap<ComponentKey, DefDescriptor>,
    burial_order: VecDeque<ComponentKey>,
    graveyard_capacity: usize,
    next_global: u64,
    max_depth: usize,
}

impl Default for ComponentArena {
    fn default() -> Self {
        Self::new()
    }
}

fn destroyed(function: &'static str, argument: String, descriptor: DefDescriptor) -> ResolveError {
    ResolveError::Destroyed(DestroyedReferenceError {
        function,
        arguments: vec![argument],
        descriptor,
    })
}

fn not_container(segment: &str, path: &PropertyRef) -> ResolveError {
    ResolveError::NotAContainer {
        segment: segment.to_string(),
        path: path.to_string(),
    }
}

impl ComponentArena {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            graveyard: HashMap::new(),
            burial_order: VecDeque::new(),
            graveyard_capacity: DEFAULT_GRAVEYARD_CAPACITY,
            next_global: 0,
            max_depth: DEFAULT_MAX_RESOLVE_DEPTH,
        }
    }

    /// Bound chained provider lookups (cycle guard).
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Bound how many freed keys keep their descriptor.
    #[must_use]
    pub fn with_graveyard_capacity(mut self, capacity: usize) -> Self {
        self.graveyard_capacity = capacity;
        self.evict_buried();
        self
    }

    fn bury(&mut self, key: ComponentKey, descriptor: DefDescriptor) {
        if self.graveyard_capacity == 0 {
            return;
        }
        if self.graveyard.insert(key, descriptor).is_none() {
            self.burial_order.push_back(key);
        }
        self.evict_buried();
    }

    fn evict_buried(&mut self) {
        while self.burial_order.len() > self.graveyard_capacity {
            if let Some(oldest) = self.burial_order.pop_front() {
                self.graveyard.remove(&oldest);
            }
        }
    }

    /// Freed keys whose descriptor is still remembered.
    #[must_use]
    pub fn graveyard_len(&self) -> usize {
        self.graveyard.len()
    }

    fn alloc(
        &mut self,
        descriptor: DefDescriptor,
        def: Option<Arc<ComponentDef>>,
        attributes: BTreeMap<String, ValueExpr>,
        state: LifecycleState,
        local_id: Option<String>,
    ) -> ComponentKey {
        self.next_global += 1;
        let global_id = GlobalId(self.next_global);
        self.slots.insert_with_key(|key| Component {
            key,
            global_id,
            descriptor,
            def,
            attributes,
            state,
            local_id,
            parent: None,
            body: Vec::new(),
            scope: LookupScope::new(),
        })
    }

    fn with_defaults(
        def: &ComponentDef,
        mut attributes: BTreeMap<String, ValueExpr>,
    ) -> BTreeMap<String, ValueExpr> {
        for attr in &def.attributes {
            if let Some(default) = &attr.default
                && !attributes.contains_key(&attr.name)
            {
                attributes.insert(attr.name.clone(), ValueExpr::from_json(default.clone()));
            }
        }
        attributes
    }

    /// Create a `Live` component from a known definition.
    pub fn instantiate(
        &mut self,
        def: Arc<ComponentDef>,
        attributes: BTreeMap<String, ValueExpr>,
        local_id: Option<String>,
    ) -> ComponentKey {
        let attributes = Self::with_defaults(&def, attributes);
        let descriptor = def.descriptor.clone();
        let key = self.alloc(
            descriptor.clone(),
            Some(def),
            attributes,
            LifecycleState::Live,
            local_id,
        );
        tracing::debug!(
            message = "component.create",
            descriptor = %descriptor,
            global_id = %self.slots[key].global_id,
        );
        key
    }

    /// Reserve a `Pending` slot for a component whose definition is not yet
    /// available.
    pub fn reserve(&mut self, descriptor: DefDescriptor, local_id: Option<String>) -> ComponentKey {
        self.alloc(
            descriptor,
            None,
            BTreeMap::new(),
            LifecycleState::Pending,
            local_id,
        )
    }

    /// Promote a reserved slot to `Live`.
    ///
    /// # Errors
    ///
    /// Fails with [`ResolveError::Destroyed`] if the reservation was
    /// destroyed or discarded meanwhile.
    pub fn complete(
        &mut self,
        key: ComponentKey,
        def: Arc<ComponentDef>,
        attributes: BTreeMap<String, ValueExpr>,
    ) -> Result<(), ResolveError> {
        let argument = def.descriptor.to_string();
        if !self.slots.contains_key(key) {
            let descriptor = self
                .graveyard
                .get(&key)
                .cloned()
                .unwrap_or_else(|| def.descriptor.clone());
            return Err(destroyed("complete", argument, descriptor));
        }
        let Some(component) = self.slots.get_mut(key) else {
            return Err(ResolveError::UnknownComponent);
        };
        match component.state {
            LifecycleState::Pending => {
                component.attributes = Self::with_defaults(&def, attributes);
                component.descriptor = def.descriptor.clone();
                component.def = Some(def);
                component.state = LifecycleState::Live;
                tracing::debug!(
                    message = "component.create",
                    descriptor = %component.descriptor,
                    global_id = %component.global_id,
                );
                Ok(())
            }
            LifecycleState::Live => Ok(()),
            LifecycleState::Destroyed => {
                Err(destroyed("complete", argument, component.descriptor.clone()))
            }
        }
    }

    /// Drop a reservation that will never complete. The slot is freed
    /// immediately since nothing could have observed it.
    pub fn discard(&mut self, key: ComponentKey) -> bool {
        match self.slots.get(key).map(Component::state) {
            Some(LifecycleState::Pending | LifecycleState::Destroyed) => {
                if let Some(component) = self.slots.remove(key) {
                    self.bury(key, component.descriptor);
                }
                true
            }
            _ => false,
        }
    }

    /// The component in `key`, including tombstones not yet swept.
    #[must_use]
    pub fn get(&self, key: ComponentKey) -> Option<&Component> {
        self.slots.get(key)
    }

    /// Lifecycle state; swept keys report `Destroyed`.
    #[must_use]
    pub fn state(&self, key: ComponentKey) -> Option<LifecycleState> {
        match self.slots.get(key) {
            Some(c) => Some(c.state),
            None if self.graveyard.contains_key(&key) => Some(LifecycleState::Destroyed),
            None => None,
        }
    }

    #[must_use]
    pub fn is_live(&self, key: ComponentKey) -> bool {
        self.state(key) == Some(LifecycleState::Live)
    }

    #[must_use]
    pub fn descriptor_of(&self, key: ComponentKey) -> Option<&DefDescriptor> {
        self.slots
            .get(key)
            .map(Component::descriptor)
            .or_else(|| self.graveyard.get(&key))
    }

    /// The attribute provider bound to `key`.
    #[must_use]
    pub fn provider(&self, key: ComponentKey) -> Option<AttributeProvider> {
        self.descriptor_of(key)
            .map(|d| AttributeProvider::new(key, d.clone()))
    }

    /// Build a lazy reference to `path` on `key`.
    ///
    /// # Errors
    ///
    /// Fails for malformed paths, unknown keys, and destroyed components.
    pub fn reference(&self, key: ComponentKey, path: &str) -> Result<AttributeReference, ResolveError> {
        let path = PropertyRef::parse(path)?;
        let provider = self.provider(key).ok_or(ResolveError::UnknownComponent)?;
        if self.state(key) == Some(LifecycleState::Destroyed) {
            return Err(destroyed(
                "getReference",
                path.to_string(),
                provider.descriptor().clone(),
            ));
        }
        Ok(AttributeReference::new(provider, path))
    }

    /// Resolve `path` (e.g. `v.stringAttribute`) on `key`.
    ///
    /// # Errors
    ///
    /// See [`AttributeProvider::get`].
    pub fn get_value(&self, key: ComponentKey, path: &str) -> Result<Value, ResolveError> {
        let path = PropertyRef::parse(path)?;
        let provider = self.provider(key).ok_or(ResolveError::UnknownComponent)?;
        provider.get(self, &path)
    }

    /// First-error view of [`ComponentArena::collect_through`].
    pub(crate) fn resolve_through(
        &self,
        provider: &AttributeProvider,
        path: &PropertyRef,
        depth: usize,
    ) -> Result<Value, ResolveError> {
        let mut errors = Vec::new();
        let value = self.collect_through(provider, path, depth, &mut errors);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    /// Resolve `path` through `provider`, pushing one error per failing
    /// reference site reached, including sites inside the attribute's own
    /// value. Failed sites read as `null`. Once a chain hits the depth bound
    /// its remaining nested sites are skipped, so a cycle is reported once.
    pub(crate) fn collect_through(
        &self,
        provider: &AttributeProvider,
        path: &PropertyRef,
        depth: usize,
        errors: &mut Vec<ResolveError>,
    ) -> Value {
        if depth > 0 && matches!(errors.last(), Some(ResolveError::CycleDetected { .. })) {
            return Value::Null;
        }
        match self.walk(provider, path, depth, errors) {
            Ok(value) => value,
            Err(err) => {
                errors.push(err);
                Value::Null
            }
        }
    }

    fn walk(
        &self,
        provider: &AttributeProvider,
        path: &PropertyRef,
        depth: usize,
        errors: &mut Vec<ResolveError>,
    ) -> Result<Value, ResolveError> {
        if depth > self.max_depth {
            return Err(ResolveError::CycleDetected {
                depth,
                path: path.to_string(),
            });
        }
        if path.provider() != ATTRIBUTE_PROVIDER {
            return Err(ResolveError::UnknownProvider {
                provider: path.provider().to_string(),
                path: path.to_string(),
            });
        }
        let Some(component) = self.slots.get(provider.owner()) else {
            return Err(destroyed(
                "get",
                path.to_string(),
                provider.descriptor().clone(),
            ));
        };
        match component.state {
            LifecycleState::Live => {}
            LifecycleState::Destroyed => {
                return Err(destroyed(
                    "get",
                    path.to_string(),
                    component.descriptor.clone(),
                ));
            }
            LifecycleState::Pending => {
                return Err(ResolveError::Pending {
                    descriptor: component.descriptor.clone(),
                });
            }
        }

        let name = path.attribute_name();
        let mut current = match component.attributes.get(name) {
            Some(expr) => {
                let before = errors.len();
                let value = expr.resolve_each_at(self, depth + 1, errors);
                if errors.len() > before {
                    return Ok(Value::Null);
                }
                value
            }
            None if component.def().is_some_and(|d| d.declares(name)) => Value::Null,
            None => {
                return Err(ResolveError::UnknownAttribute {
                    attribute: name.to_string(),
                    descriptor: component.descriptor.clone(),
                });
            }
        };

        for segment in path.sub_path() {
            current = match current {
                Value::Object(mut obj) => obj.remove(segment).unwrap_or(Value::Null),
                Value::Array(mut items) => {
                    let idx: usize = segment
                        .parse()
                        .map_err(|_| not_container(segment, path))?;
                    if idx < items.len() {
                        items.swap_remove(idx)
                    } else {
                        Value::Null
                    }
                }
                Value::Null => Value::Null,
                _ => return Err(not_container(segment, path)),
            };
        }
        Ok(current)
    }

    fn live_mut(
        &mut self,
        key: ComponentKey,
        function: &'static str,
        argument: String,
    ) -> Result<&mut Component, ResolveError> {
        let (state, descriptor) = match self.slots.get(key) {
            Some(c) => (c.state, c.descriptor.clone()),
            None => {
                return Err(match self.graveyard.get(&key) {
                    Some(d) => destroyed(function, argument, d.clone()),
                    None => ResolveError::UnknownComponent,
                });
            }
        };
        match state {
            LifecycleState::Live => self.slots.get_mut(key).ok_or(ResolveError::UnknownComponent),
            LifecycleState::Pending => Err(ResolveError::Pending { descriptor }),
            LifecycleState::Destroyed => Err(destroyed(function, argument, descriptor)),
        }
    }

    /// Assign `value` to `path`, creating intermediate maps as needed.
    ///
    /// # Errors
    ///
    /// Fails if the component is not `Live`, the path is malformed, or the
    /// path walks through a non-map value.
    pub fn set_value(
        &mut self,
        key: ComponentKey,
        path: &str,
        value: impl Into<ValueExpr>,
    ) -> Result<(), ResolveError> {
        let path = PropertyRef::parse(path)?;
        if path.provider() != ATTRIBUTE_PROVIDER {
            return Err(ResolveError::UnknownProvider {
                provider: path.provider().to_string(),
                path: path.to_string(),
            });
        }
        let value = value.into();
        let component = self.live_mut(key, "set", path.to_string())?;
        let name = path.attribute_name().to_string();

        let Some((last, parents)) = path.sub_path().split_last() else {
            component.attributes.insert(name, value);
            return Ok(());
        };
        let mut slot = component
            .attributes
            .entry(name)
            .or_insert_with(|| ValueExpr::Map(BTreeMap::new()));
        for segment in parents {
            let ValueExpr::Map(map) = slot else {
                return Err(not_container(segment, &path));
            };
            slot = map
                .entry(segment.clone())
                .or_insert_with(|| ValueExpr::Map(BTreeMap::new()));
        }
        let ValueExpr::Map(map) = slot else {
            return Err(not_container(last, &path));
        };
        map.insert(last.clone(), value);
        Ok(())
    }

    /// Append `child` to `parent`'s body, taking ownership of it.
    ///
    /// # Errors
    ///
    /// Both components must be `Live`.
    pub fn push_body(&mut self, parent: ComponentKey, child: ComponentKey) -> Result<(), ResolveError> {
        self.live_mut(child, "setParent", "body".into())?;
        self.live_mut(parent, "set", "v.body".into())?;
        self.detach(child);
        if let Some(p) = self.slots.get_mut(parent) {
            p.body.push(child);
        }
        if let Some(c) = self.slots.get_mut(child) {
            c.parent = Some(parent);
        }
        Ok(())
    }

    /// Replace `parent`'s body. Previous children that are not kept are
    /// orphaned, not destroyed.
    ///
    /// # Errors
    ///
    /// `parent` and every child must be `Live`.
    pub fn set_body(
        &mut self,
        parent: ComponentKey,
        children: Vec<ComponentKey>,
    ) -> Result<(), ResolveError> {
        for child in &children {
            self.live_mut(*child, "setParent", "body".into())?;
        }
        let previous = std::mem::take(&mut self.live_mut(parent, "set", "v.body".into())?.body);
        for old in previous {
            if let Some(c) = self.slots.get_mut(old) {
                c.parent = None;
            }
        }
        for child in children {
            self.push_body(parent, child)?;
        }
        Ok(())
    }

    fn detach(&mut self, child: ComponentKey) {
        let Some(parent) = self.slots.get_mut(child).and_then(|c| c.parent.take()) else {
            return;
        };
        if let Some(p) = self.slots.get_mut(parent) {
            p.body.retain(|k| *k != child);
        }
    }

    /// Index `child` under `alias` in `owner`'s scope.
    ///
    /// # Errors
    ///
    /// Both components must be `Live`.
    pub fn index(
        &mut self,
        owner: ComponentKey,
        alias: &str,
        child: ComponentKey,
    ) -> Result<(), ResolveError> {
        self.live_mut(child, "index", alias.to_string())?;
        self.live_mut(owner, "index", alias.to_string())?
            .scope
            .register(alias, child);
        Ok(())
    }

    /// Remove `alias` from `owner`'s scope.
    pub fn unindex(&mut self, owner: ComponentKey, alias: &str) -> Option<ComponentKey> {
        self.slots.get_mut(owner)?.scope.unregister(alias)
    }

    /// Look up `alias` in `owner`'s scope; only `Live` components are found.
    #[must_use]
    pub fn find(&self, owner: ComponentKey, alias: &str) -> Option<ComponentKey> {
        self.slots
            .get(owner)?
            .scope
            .find(alias)
            .filter(|k| self.is_live(*k))
    }

    /// Destroy `key` and its body. Returns `false` if it was already gone.
    pub fn destroy(&mut self, key: ComponentKey) -> bool {
        let parent = match self.slots.get(key) {
            Some(c) if c.state != LifecycleState::Destroyed => c.parent,
            _ => return false,
        };

        let mut stack = vec![key];
        while let Some(next) = stack.pop() {
            let Some(component) = self.slots.get_mut(next) else {
                continue;
            };
            if component.state == LifecycleState::Destroyed {
                continue;
            }
            component.state = LifecycleState::Destroyed;
            component.attributes.clear();
            component.scope.clear();
            stack.append(&mut component.body);
            tracing::debug!(
                message = "component.destroy",
                descriptor = %component.descriptor,
                global_id = %component.global_id,
            );
        }

        if let Some(p) = parent.and_then(|p| self.slots.get_mut(p)) {
            p.body.retain(|k| *k != key);
            p.scope.forget(key);
        }
        true
    }

    /// Free every tombstone. Returns the number of slots released.
    pub fn sweep(&mut self) -> usize {
        let dead: Vec<ComponentKey> = self
            .slots
            .iter()
            .filter(|(_, c)| c.state == LifecycleState::Destroyed)
            .map(|(k, _)| k)
            .collect();
        for key in &dead {
            if let Some(component) = self.slots.remove(*key) {
                self.bury(*key, component.descriptor);
            }
        }
        if !dead.is_empty() {
            tracing::trace!(message = "arena.sweep", released = dead.len());
        }
        dead.len()
    }

    /// Occupied slots, including unswept tombstones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.values().filter(|c| c.is_live()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.slots.values()
    }
}
