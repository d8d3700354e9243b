#![forbid(unsafe_code)]

//! Asynchronous component creation.
//!
//! [`Runtime::new_component_async`] reserves a `Pending` slot and returns a
//! [`Creation`] handle at once. When the definition is cached locally the
//! component goes `Live` on the next turn; otherwise a `getComponent` action
//! fetches it first. Either way `on_complete` runs exactly once on success
//! and never on failure, and a failed creation leaves nothing reachable.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use weft_core::{ComponentDef, ComponentKey, DefDescriptor, DestroyedReferenceError, ResolveError, ValueExpr};

use crate::action::{ActionBuilder, ActionDef, ActionHandle, ActionOutcome};
use crate::error::{ActionError, FetchError, Result};
use crate::runtime::Runtime;

/// What to create.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentConfig {
    pub descriptor: DefDescriptor,
    /// Alias the caller intends to index the component under.
    pub local_id: Option<String>,
    /// Initial attribute values; references are resolved lazily.
    pub attributes: BTreeMap<String, ValueExpr>,
}

impl ComponentConfig {
    #[must_use]
    pub fn new(descriptor: DefDescriptor) -> Self {
        Self {
            descriptor,
            local_id: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn local_id(mut self, alias: impl Into<String>) -> Self {
        self.local_id = Some(alias.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<ValueExpr>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreationState {
    Pending,
    Created(ComponentKey),
    Failed(FetchError),
}

/// Caller-side view of an asynchronous creation.
#[derive(Debug, Clone)]
pub struct Creation {
    descriptor: DefDescriptor,
    reserved: ComponentKey,
    fetch: Option<ActionHandle>,
    state: Rc<RefCell<CreationState>>,
}

impl Creation {
    #[must_use]
    pub fn descriptor(&self) -> &DefDescriptor {
        &self.descriptor
    }

    /// The slot reserved for the component. Not resolvable until `Created`.
    #[must_use]
    pub fn reserved_key(&self) -> ComponentKey {
        self.reserved
    }

    /// The `getComponent` action, when the definition had to be fetched.
    #[must_use]
    pub fn fetch_action(&self) -> Option<&ActionHandle> {
        self.fetch.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> CreationState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), CreationState::Pending)
    }

    #[must_use]
    pub fn key(&self) -> Option<ComponentKey> {
        match *self.state.borrow() {
            CreationState::Created(key) => Some(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<FetchError> {
        match &*self.state.borrow() {
            CreationState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }
}

type OnComplete = Box<dyn FnOnce(&mut Runtime, ComponentKey)>;

/// Shared completion path for the local and fetched branches.
struct PendingCreation {
    caller: Option<ComponentKey>,
    reserved: ComponentKey,
    config: ComponentConfig,
    state: Rc<RefCell<CreationState>>,
    on_complete: OnComplete,
}

impl PendingCreation {
    fn fail(self, rt: &mut Runtime, errors: Vec<ActionError>) -> FetchError {
        rt.components_mut().discard(self.reserved);
        let err = FetchError {
            descriptor: self.config.descriptor,
            errors,
        };
        tracing::warn!(
            message = "factory.create_failed",
            descriptor = %err.descriptor,
            errors = err.errors.len(),
        );
        *self.state.borrow_mut() = CreationState::Failed(err.clone());
        err
    }

    fn finish(self, rt: &mut Runtime, def: Arc<ComponentDef>) {
        if let Some(caller) = self.caller
            && !rt.components().is_live(caller)
        {
            let descriptor = rt
                .components()
                .descriptor_of(caller)
                .cloned()
                .unwrap_or_else(|| self.config.descriptor.clone());
            let err = ResolveError::Destroyed(DestroyedReferenceError {
                function: "newComponentAsync",
                arguments: vec![self.config.descriptor.to_string()],
                descriptor,
            });
            self.fail(rt, vec![ActionError::Abandoned(err)]);
            return;
        }
        let attributes = self.config.attributes.clone();
        if let Err(err) = rt.components_mut().complete(self.reserved, def, attributes) {
            self.fail(rt, vec![ActionError::Abandoned(err)]);
            return;
        }
        *self.state.borrow_mut() = CreationState::Created(self.reserved);
        (self.on_complete)(rt, self.reserved);
    }

    fn on_fetched(self, rt: &mut Runtime, outcome: &ActionOutcome) {
        if !outcome.is_success() {
            let err = self.fail(rt, outcome.errors.clone());
            rt.errors_mut().record(Some(outcome.id), &err);
            return;
        }
        let def = match serde_json::from_value::<ComponentDef>(outcome.return_value.clone()) {
            Ok(def) if def.descriptor == self.config.descriptor => def,
            Ok(def) => {
                let reason = format!("expected {}, got {}", self.config.descriptor, def.descriptor);
                let err = self.fail(rt, vec![invalid_response(reason)]);
                rt.errors_mut().record(Some(outcome.id), &err);
                return;
            }
            Err(err) => {
                let err = self.fail(rt, vec![invalid_response(err.to_string())]);
                rt.errors_mut().record(Some(outcome.id), &err);
                return;
            }
        };
        let def = rt.registry_mut().register(def);
        self.finish(rt, def);
    }
}

fn invalid_response(reason: String) -> ActionError {
    ActionError::InvalidResponse {
        action: ActionDef::get_component().descriptor(),
        reason,
    }
}

impl Runtime {
    /// Create a component, fetching its definition from the server if it is
    /// not cached.
    ///
    /// `on_complete` runs on a later turn once the component is `Live`. It
    /// never runs if the fetch fails or the caller is destroyed first.
    ///
    /// # Errors
    ///
    /// Only fails if the fetch action cannot be built.
    pub fn new_component_async(
        &mut self,
        caller: Option<ComponentKey>,
        config: ComponentConfig,
        on_complete: impl FnOnce(&mut Runtime, ComponentKey) + 'static,
    ) -> Result<Creation> {
        let descriptor = config.descriptor.clone();
        let reserved = self
            .components_mut()
            .reserve(descriptor.clone(), config.local_id.clone());
        let state = Rc::new(RefCell::new(CreationState::Pending));
        let cached = self.registry().get(&descriptor);
        let pending = PendingCreation {
            caller,
            reserved,
            config,
            state: Rc::clone(&state),
            on_complete: Box::new(on_complete),
        };

        let fetch = match cached {
            Some(def) => {
                tracing::debug!(message = "factory.local", descriptor = %descriptor);
                self.schedule(move |rt| pending.finish(rt, def));
                None
            }
            None => {
                tracing::debug!(message = "factory.fetch", descriptor = %descriptor);
                let mut builder = ActionBuilder::new(ActionDef::get_component())
                    .param("name", ValueExpr::literal(descriptor.to_string()))
                    .param(
                        "attributes",
                        ValueExpr::map([("values", ValueExpr::Map(pending.config.attributes.clone()))]),
                    );
                if let Some(caller) = caller {
                    builder = builder.caller(caller);
                }
                let builder = builder.on_complete(move |rt, outcome| pending.on_fetched(rt, outcome));
                match self.enqueue(builder) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        self.components_mut().discard(reserved);
                        return Err(err.into());
                    }
                }
            }
        };

        Ok(Creation {
            descriptor,
            reserved,
            fetch,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::transport::TransportError;
    use crate::wire::{WireActionResult, WireRequest, WireResponse};
    use serde_json::json;
    use std::cell::Cell;
    use weft_core::AttributeDef;

    fn button() -> DefDescriptor {
        DefDescriptor::markup("ui", "button").unwrap()
    }

    fn serving(def: serde_json::Value) -> impl FnMut(&WireRequest) -> std::result::Result<WireResponse, TransportError> {
        move |req: &WireRequest| {
            Ok(WireResponse {
                actions: req
                    .actions
                    .iter()
                    .map(|a| WireActionResult::success(a.id.clone(), def.clone()))
                    .collect(),
            })
        }
    }

    #[test]
    fn local_definition_completes_next_turn() {
        let mut rt = Runtime::new(RuntimeConfig::default(), crate::transport::OfflineTransport);
        rt.define(ComponentDef::new(button()).attribute(AttributeDef::new("label").with_default("ok")));
        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        let creation = rt
            .new_component_async(None, ComponentConfig::new(button()), move |_, _| seen.set(true))
            .unwrap();
        assert!(creation.is_pending());
        assert!(creation.fetch_action().is_none());
        assert!(!fired.get());

        rt.run_until_idle().unwrap();
        assert!(fired.get());
        let key = creation.key().unwrap();
        assert_eq!(rt.get_value(key, "v.label").unwrap(), json!("ok"));
    }

    #[test]
    fn fetched_definition_is_cached() {
        let def = json!({ "descriptor": "markup://ui:button", "attributes": [{ "name": "label" }] });
        let mut rt = Runtime::new(RuntimeConfig::default(), serving(def));
        let creation = rt
            .new_component_async(
                None,
                ComponentConfig::new(button()).attribute("label", ValueExpr::literal("go")),
                |_, _| {},
            )
            .unwrap();
        assert!(creation.fetch_action().is_some());
        rt.run_until_idle().unwrap();

        let key = creation.key().unwrap();
        assert_eq!(rt.get_value(key, "v.label").unwrap(), json!("go"));
        assert!(rt.registry().contains(&button()));
    }

    #[test]
    fn mismatched_definition_fails_creation() {
        let def = json!({ "descriptor": "markup://ui:other" });
        let mut rt = Runtime::new(RuntimeConfig::default(), serving(def));
        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        let creation = rt
            .new_component_async(None, ComponentConfig::new(button()), move |_, _| seen.set(true))
            .unwrap();
        rt.run_until_idle().unwrap();

        assert!(!fired.get());
        let err = creation.error().unwrap();
        assert!(matches!(err.errors[0], ActionError::InvalidResponse { .. }));
        assert!(rt.components().get(creation.reserved_key()).is_none());
    }

    #[test]
    fn destroyed_caller_never_sees_completion() {
        let mut rt = Runtime::new(RuntimeConfig::default(), crate::transport::OfflineTransport);
        let parent = rt.instantiate(ComponentDef::new(DefDescriptor::markup("ui", "panel").unwrap()));
        rt.define(ComponentDef::new(button()));
        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        let creation = rt
            .new_component_async(Some(parent), ComponentConfig::new(button()), move |_, _| seen.set(true))
            .unwrap();
        rt.destroy(parent);
        rt.run_until_idle().unwrap();

        assert!(!fired.get());
        let err = creation.error().unwrap();
        assert_eq!(err.errors.len(), 1);
        match &err.errors[0] {
            ActionError::Abandoned(ResolveError::Destroyed(destroyed)) => {
                assert_eq!(destroyed.function, "newComponentAsync");
                assert_eq!(destroyed.descriptor.to_string(), "markup://ui:panel");
            }
            other => panic!("expected an abandoned creation, got {other:?}"),
        }
        assert!(rt.errors().is_empty());
        assert!(rt.components().get(creation.reserved_key()).is_none());
    }

    #[test]
    fn destroyed_reservation_abandons_creation() {
        let mut rt = Runtime::new(RuntimeConfig::default(), crate::transport::OfflineTransport);
        rt.define(ComponentDef::new(button()));
        let creation = rt
            .new_component_async(None, ComponentConfig::new(button()), |_, _| {})
            .unwrap();
        rt.destroy(creation.reserved_key());
        rt.run_until_idle().unwrap();

        let err = creation.error().unwrap();
        assert!(matches!(
            &err.errors[0],
            ActionError::Abandoned(r) if r.is_destroyed()
        ));
    }
}
