#![forbid(unsafe_code)]

//! Scripted definition server.
//!
//! Answers `getComponent` with the definitions it was seeded with and echoes
//! the parameters of every other action as its return value. Requests are
//! serialized to a JSON body and decoded again before they are answered, so
//! anything that survives the trip is what a real server would have seen.
//!
//! The server is a cheap handle: clones share state, so a test can keep one
//! clone for inspection after handing the other to the runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use weft_core::ComponentDef;
use weft_runtime::{
    ActionDef, Transport, TransportError, WireAction, WireActionResult, WireRequest, WireResponse,
};

#[derive(Debug, Default)]
struct ServerState {
    defs: HashMap<String, Value>,
    failures: HashMap<String, String>,
    unavailable: Option<String>,
    bodies: Vec<String>,
}

impl ServerState {
    fn answer(&self, action: &WireAction) -> WireActionResult {
        if let Some(message) = self.failures.get(&action.descriptor) {
            return WireActionResult::error(action.id.clone(), message.clone());
        }
        if action.descriptor != ActionDef::get_component().descriptor() {
            return WireActionResult::success(action.id.clone(), Value::Object(action.params.clone()));
        }
        let name = action.params.get("name").and_then(Value::as_str).unwrap_or_default();
        match self.defs.get(name) {
            Some(def) => WireActionResult::success(action.id.clone(), def.clone()),
            None => WireActionResult::error(action.id.clone(), format!("No COMPONENT named {name} found")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionServer {
    inner: Rc<RefCell<ServerState>>,
}

impl DefinitionServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a definition to serve for `getComponent`.
    #[must_use]
    pub fn serve(self, def: &ComponentDef) -> Self {
        self.add_definition(def);
        self
    }

    pub fn add_definition(&self, def: &ComponentDef) {
        match serde_json::to_value(def) {
            Ok(json) => {
                self.inner.borrow_mut().defs.insert(def.descriptor.to_string(), json);
            }
            Err(err) => tracing::warn!(message = "server.seed_failed", error = %err),
        }
    }

    /// Answer every action with descriptor `action` with an error.
    pub fn fail_action(&self, action: &ActionDef, message: impl Into<String>) {
        self.inner
            .borrow_mut()
            .failures
            .insert(action.descriptor(), message.into());
    }

    /// Fail whole exchanges at the transport level; `None` restores service.
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.inner.borrow_mut().unavailable = reason;
    }

    /// Every request received, decoded from its JSON body.
    #[must_use]
    pub fn requests(&self) -> Vec<WireRequest> {
        self.inner
            .borrow()
            .bodies
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }

    /// Raw request bodies, in arrival order.
    #[must_use]
    pub fn bodies(&self) -> Vec<String> {
        self.inner.borrow().bodies.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.inner.borrow().bodies.len()
    }
}

fn malformed(err: &serde_json::Error) -> TransportError {
    TransportError::Malformed(err.to_string())
}

impl Transport for DefinitionServer {
    fn exchange(&mut self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        let body = request.to_json().map_err(|e| malformed(&e))?;
        let mut state = self.inner.borrow_mut();
        state.bodies.push(body.clone());
        if let Some(reason) = &state.unavailable {
            return Err(TransportError::Unavailable(reason.clone()));
        }

        let decoded: WireRequest = serde_json::from_str(&body).map_err(|e| malformed(&e))?;
        tracing::debug!(
            message = "server.exchange",
            batch_id = decoded.batch_id,
            actions = decoded.actions.len(),
        );
        let response = WireResponse {
            actions: decoded.actions.iter().map(|a| state.answer(a)).collect(),
        };
        let body = serde_json::to_string(&response).map_err(|e| malformed(&e))?;
        WireResponse::from_json(&body).map_err(|e| malformed(&e))
    }
}
