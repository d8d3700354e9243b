#![forbid(unsafe_code)]

//! Actions: queued RPC-like calls.
//!
//! # State machine
//!
//! ```text
//! Created ──enqueue──▶ Queued ──drain──▶ Sent ──response──▶ Completed
//!                                         │  └──response──▶ Errored
//!                                         └──encode fail──▶ Errored
//! ```
//!
//! Actions are sent as a unit per batch but complete individually. The
//! caller keeps an [`ActionHandle`] that shares the action's status, so the
//! outcome stays readable after the runtime drops the action itself.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use weft_core::{ComponentKey, ValueExpr};

use crate::error::ActionError;
use crate::runtime::Runtime;

/// Action identity, printed as `<n>;a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};a", self.0)
    }
}

impl FromStr for ActionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_suffix(";a").unwrap_or(s).parse().map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    pub required: bool,
}

/// The server-side definition an action invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDef {
    controller: String,
    name: String,
    params: Vec<ParamDef>,
}

impl ActionDef {
    #[must_use]
    pub fn new(controller: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            name: name.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            required: true,
        });
        self
    }

    #[must_use]
    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            required: false,
        });
        self
    }

    /// Definition of the built-in component fetch.
    #[must_use]
    pub fn get_component() -> Self {
        Self::new("ComponentController", "getComponent")
            .required("name")
            .optional("attributes")
    }

    #[must_use]
    pub fn controller(&self) -> &str {
        &self.controller
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    /// Qualified descriptor sent on the wire.
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("action://{}/{}", self.controller, self.name)
    }

    fn validate(&self, params: &BTreeMap<String, ValueExpr>) -> Result<(), ActionError> {
        let invalid = |reason: String| ActionError::InvalidParams {
            action: self.descriptor(),
            reason,
        };
        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !params.contains_key(&p.name))
        {
            return Err(invalid(format!("missing required parameter {:?}", missing.name)));
        }
        if let Some(extra) = params
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(invalid(format!("undeclared parameter {extra:?}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    Created,
    Queued,
    Sent,
    Completed,
    Errored,
}

impl ActionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Queued)
                | (Self::Queued, Self::Sent)
                | (Self::Sent, Self::Completed)
                | (Self::Sent, Self::Errored)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

/// Final result of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub id: ActionId,
    pub state: ActionState,
    pub return_value: Value,
    pub errors: Vec<ActionError>,
}

impl ActionOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == ActionState::Completed
    }
}

#[derive(Debug)]
struct ActionStatus {
    state: ActionState,
    return_value: Value,
    errors: Vec<ActionError>,
}

/// Caller-side view of an action.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    id: ActionId,
    status: Rc<RefCell<ActionStatus>>,
}

impl ActionHandle {
    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ActionState {
        self.status.borrow().state
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<ActionError> {
        self.status.borrow().errors.clone()
    }

    /// The outcome once the action reached a terminal state.
    #[must_use]
    pub fn outcome(&self) -> Option<ActionOutcome> {
        let status = self.status.borrow();
        status.state.is_terminal().then(|| ActionOutcome {
            id: self.id,
            state: status.state,
            return_value: status.return_value.clone(),
            errors: status.errors.clone(),
        })
    }
}

pub type ActionCallback = Box<dyn FnOnce(&mut Runtime, &ActionOutcome)>;

/// Builder for an [`Action`]; the runtime assigns the id.
pub struct ActionBuilder {
    def: Arc<ActionDef>,
    params: BTreeMap<String, ValueExpr>,
    caller: Option<ComponentKey>,
    callback: Option<ActionCallback>,
}

impl ActionBuilder {
    #[must_use]
    pub fn new(def: impl Into<Arc<ActionDef>>) -> Self {
        Self {
            def: def.into(),
            params: BTreeMap::new(),
            caller: None,
            callback: None,
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ValueExpr>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The component on whose behalf the action runs.
    #[must_use]
    pub fn caller(mut self, key: ComponentKey) -> Self {
        self.caller = Some(key);
        self
    }

    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce(&mut Runtime, &ActionOutcome) + 'static) -> Self {
        self.callback = Some(Box::new(f));
        self
    }

    pub(crate) fn build(self, id: ActionId) -> Result<Action, ActionError> {
        self.def.validate(&self.params)?;
        Ok(Action {
            id,
            def: self.def,
            params: self.params,
            caller: self.caller,
            status: Rc::new(RefCell::new(ActionStatus {
                state: ActionState::Created,
                return_value: Value::Null,
                errors: Vec::new(),
            })),
            callback: self.callback,
        })
    }
}

/// A unit of RPC work.
pub struct Action {
    id: ActionId,
    def: Arc<ActionDef>,
    params: BTreeMap<String, ValueExpr>,
    caller: Option<ComponentKey>,
    status: Rc<RefCell<ActionStatus>>,
    callback: Option<ActionCallback>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("def", &self.def.descriptor())
            .field("state", &self.state())
            .field("params", &self.params)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl Action {
    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    #[must_use]
    pub fn def(&self) -> &ActionDef {
        &self.def
    }

    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, ValueExpr> {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ValueExpr> {
        self.params.get(name)
    }

    #[must_use]
    pub fn caller(&self) -> Option<ComponentKey> {
        self.caller
    }

    #[must_use]
    pub fn state(&self) -> ActionState {
        self.status.borrow().state
    }

    #[must_use]
    pub fn handle(&self) -> ActionHandle {
        ActionHandle {
            id: self.id,
            status: Rc::clone(&self.status),
        }
    }

    /// True if any parameter references `key`.
    #[must_use]
    pub fn references(&self, key: ComponentKey) -> bool {
        self.params.values().any(|p| p.references_component(key))
    }

    /// Move to `next`; illegal transitions are refused and logged.
    pub(crate) fn transition(&self, next: ActionState) -> bool {
        let mut status = self.status.borrow_mut();
        if !status.state.can_transition_to(next) {
            tracing::warn!(
                message = "action.illegal_transition",
                action_id = %self.id,
                from = status.state.as_str(),
                to = next.as_str(),
            );
            return false;
        }
        status.state = next;
        true
    }

    pub(crate) fn succeed(&self, return_value: Value) -> bool {
        if !self.transition(ActionState::Completed) {
            return false;
        }
        self.status.borrow_mut().return_value = return_value;
        true
    }

    pub(crate) fn fail(&self, errors: Vec<ActionError>) -> bool {
        if !self.transition(ActionState::Errored) {
            return false;
        }
        self.status.borrow_mut().errors = errors;
        true
    }

    pub(crate) fn take_callback(&mut self) -> Option<ActionCallback> {
        self.callback.take()
    }
}
