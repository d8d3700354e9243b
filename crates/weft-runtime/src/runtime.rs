#![forbid(unsafe_code)]

//! Single-threaded cooperative runtime.
//!
//! All work runs as turns popped from one FIFO queue: creation completions,
//! batch receipts, and anything scheduled by user code. At the end of every
//! turn the action queue is drained into a batch (when
//! [`RuntimeConfig::flush_at_turn_end`] is set) and destroyed components are
//! swept.
//!
//! # Flush ordering
//!
//! ```text
//! drain ─▶ pre-send observers ─▶ mark Sent ─▶ encode ─▶ (next turn) exchange
//!                                                          ─▶ post-send observers
//!                                                          ─▶ action callbacks
//! ```
//!
//! Pre-send observers run strictly before any reference in the batch is
//! resolved, so a component they destroy is already `Destroyed` when the
//! encoder reaches it. Nothing in a flush can panic or return an error:
//! encode and transport failures are attached to the affected actions and
//! recorded in the [`ErrorSink`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use weft_core::{AttributeReference, ComponentArena, ComponentDef, ComponentKey, ResolveError, ValueExpr};

use crate::action::{Action, ActionBuilder, ActionHandle, ActionState};
use crate::config::RuntimeConfig;
use crate::encoder::Encoder;
use crate::error::{ActionError, Result, RuntimeError};
use crate::queue::{ActionQueue, Batch, BatchId, CallbackHandle, SendContext, SendPhase};
use crate::registry::DefRegistry;
use crate::sink::ErrorSink;
use crate::transport::Transport;
use crate::wire::{WireRequest, WireState};

pub type Turn = Box<dyn FnOnce(&mut Runtime)>;

/// A batch between encoding and response.
struct InFlight {
    batch: Batch,
    request: WireRequest,
}

pub struct Runtime {
    config: RuntimeConfig,
    components: ComponentArena,
    registry: DefRegistry,
    queue: ActionQueue,
    in_flight: VecDeque<InFlight>,
    turns: VecDeque<Turn>,
    transport: Box<dyn Transport>,
    errors: ErrorSink,
    turns_run: u64,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("components", &self.components.len())
            .field("queue", &self.queue)
            .field("in_flight", &self.in_flight.len())
            .field("turns", &self.turns.len())
            .field("errors", &self.errors.len())
            .finish()
    }
}

impl Runtime {
    #[must_use]
    pub fn new(config: RuntimeConfig, transport: impl Transport + 'static) -> Self {
        let components = ComponentArena::new()
            .with_max_depth(config.max_resolve_depth)
            .with_graveyard_capacity(config.graveyard_capacity);
        Self {
            config,
            components,
            registry: DefRegistry::new(),
            queue: ActionQueue::new(),
            in_flight: VecDeque::new(),
            turns: VecDeque::new(),
            transport: Box::new(transport),
            errors: ErrorSink::new(),
            turns_run: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn components(&self) -> &ComponentArena {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentArena {
        &mut self.components
    }

    #[must_use]
    pub fn registry(&self) -> &DefRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DefRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut ActionQueue {
        &mut self.queue
    }

    #[must_use]
    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorSink {
        &mut self.errors
    }

    /// Turns executed since construction.
    #[must_use]
    pub fn turns_run(&self) -> u64 {
        self.turns_run
    }

    // --- components -------------------------------------------------------

    /// Cache a definition locally.
    pub fn define(&mut self, def: impl Into<Arc<ComponentDef>>) -> Arc<ComponentDef> {
        self.registry.register(def)
    }

    /// Cache a definition given as JSON, as a server would return it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidDefinition`] if `json` is not a definition.
    pub fn define_json(&mut self, json: &str) -> Result<Arc<ComponentDef>> {
        let def: ComponentDef = serde_json::from_str(json)?;
        Ok(self.registry.register(def))
    }

    /// Synchronously create a `Live` component with default attributes.
    ///
    /// `def` is cached only when no definition with its descriptor is
    /// registered yet; use [`Runtime::define`] to replace one.
    pub fn instantiate(&mut self, def: impl Into<Arc<ComponentDef>>) -> ComponentKey {
        let def = def.into();
        self.registry.register_if_absent(&def);
        self.components.instantiate(def, BTreeMap::new(), None)
    }

    /// Destroy `key` immediately. In-flight references to it fail at encode
    /// time.
    pub fn destroy(&mut self, key: ComponentKey) -> bool {
        self.components.destroy(key)
    }

    #[must_use]
    pub fn find(&self, owner: ComponentKey, alias: &str) -> Option<ComponentKey> {
        self.components.find(owner, alias)
    }

    /// Index `child` under `alias` in `owner`'s scope.
    ///
    /// # Errors
    ///
    /// Both components must be `Live`.
    pub fn index(&mut self, owner: ComponentKey, alias: &str, child: ComponentKey) -> Result<()> {
        Ok(self.components.index(owner, alias, child)?)
    }

    /// # Errors
    ///
    /// Both components must be `Live`.
    pub fn push_body(&mut self, parent: ComponentKey, child: ComponentKey) -> Result<()> {
        Ok(self.components.push_body(parent, child)?)
    }

    /// # Errors
    ///
    /// See [`ComponentArena::get_value`].
    pub fn get_value(&self, key: ComponentKey, path: &str) -> std::result::Result<Value, ResolveError> {
        self.components.get_value(key, path)
    }

    /// # Errors
    ///
    /// See [`ComponentArena::set_value`].
    pub fn set_value(
        &mut self,
        key: ComponentKey,
        path: &str,
        value: impl Into<ValueExpr>,
    ) -> std::result::Result<(), ResolveError> {
        self.components.set_value(key, path, value)
    }

    /// # Errors
    ///
    /// See [`ComponentArena::reference`].
    pub fn reference(
        &self,
        key: ComponentKey,
        path: &str,
    ) -> std::result::Result<AttributeReference, ResolveError> {
        self.components.reference(key, path)
    }

    // --- actions ----------------------------------------------------------

    /// Build an action without queueing it.
    ///
    /// # Errors
    ///
    /// Fails if the parameters do not match the action definition.
    pub fn create_action(&mut self, builder: ActionBuilder) -> std::result::Result<Action, ActionError> {
        self.queue.create(builder)
    }

    /// Build and queue an action; it is sent with the next batch.
    ///
    /// # Errors
    ///
    /// Fails if the parameters do not match the action definition.
    pub fn enqueue(&mut self, builder: ActionBuilder) -> std::result::Result<ActionHandle, ActionError> {
        let action = self.queue.create(builder)?;
        Ok(self.queue.enqueue(action))
    }

    pub fn enqueue_action(&mut self, action: Action) -> ActionHandle {
        self.queue.enqueue(action)
    }

    #[must_use]
    pub fn are_actions_complete(&self, handles: &[ActionHandle]) -> bool {
        handles.iter().all(ActionHandle::is_complete)
    }

    pub fn register_pre_post_send(
        &mut self,
        pre: impl FnMut(&mut SendContext<'_>, &[Action]) + 'static,
        post: impl FnMut(&mut SendContext<'_>, &[Action]) + 'static,
    ) -> CallbackHandle {
        self.queue.register_pre_post_send(pre, post)
    }

    pub fn remove_callback(&mut self, handle: CallbackHandle) -> bool {
        self.queue.remove_callback(handle)
    }

    // --- scheduling -------------------------------------------------------

    /// Append a turn to the run queue.
    pub fn schedule(&mut self, turn: impl FnOnce(&mut Runtime) + 'static) {
        self.turns.push_back(Box::new(turn));
    }

    /// True when no turn is waiting and nothing would be flushed.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.turns.is_empty() && (!self.config.flush_at_turn_end || self.queue.is_empty())
    }

    /// Run one turn. Returns `false` if there was nothing to do.
    pub fn run_turn(&mut self) -> bool {
        if let Some(turn) = self.turns.pop_front() {
            self.turns_run += 1;
            turn(self);
        } else if !(self.config.flush_at_turn_end && !self.queue.is_empty()) {
            return false;
        }
        self.end_turn();
        true
    }

    /// Run turns until idle.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::TurnBudgetExceeded`] if work keeps arriving past
    /// [`RuntimeConfig::turn_budget`] turns.
    pub fn run_until_idle(&mut self) -> Result<usize> {
        let mut ran = 0;
        while !self.is_idle() {
            if ran >= self.config.turn_budget {
                tracing::warn!(message = "runtime.budget_exceeded", budget = self.config.turn_budget);
                return Err(RuntimeError::TurnBudgetExceeded {
                    budget: self.config.turn_budget,
                });
            }
            self.run_turn();
            ran += 1;
        }
        Ok(ran)
    }

    fn end_turn(&mut self) {
        if self.config.flush_at_turn_end {
            self.flush();
        }
        if self.config.sweep_destroyed {
            self.components.sweep();
        }
    }

    fn run_observers(&mut self, phase: SendPhase, batch: &Batch) {
        let mut observers = self.queue.take_observers();
        if observers.is_empty() {
            return;
        }
        let mut removals = Vec::new();
        for (handle, observer) in &mut observers {
            let Some(f) = observer.for_phase(phase) else {
                continue;
            };
            let mut ctx = SendContext {
                handle: *handle,
                phase,
                batch: batch.id(),
                components: &mut self.components,
                queue: &mut self.queue,
                errors: &self.errors,
                removals: &mut removals,
            };
            f(&mut ctx, batch.actions());
        }
        self.queue.restore_observers(observers, &removals);
    }

    /// Drain the queue into one batch and encode it. The response is handled
    /// on a later turn. Returns `None` if nothing was queued.
    pub fn flush(&mut self) -> Option<BatchId> {
        let mut batch = self.queue.drain()?;
        let id = batch.id();
        let span = tracing::debug_span!("weft.flush", batch_id = id.0, actions = batch.len());
        let _enter = span.enter();

        self.run_observers(SendPhase::PreSend, &batch);

        for action in batch.actions() {
            action.transition(ActionState::Sent);
        }

        let encoded = Encoder::new(&self.components).encode(&batch);
        for (action_id, failures) in encoded.failures {
            let mut errors = Vec::with_capacity(failures.len());
            for failure in failures {
                match &failure {
                    ResolveError::Destroyed(d) => tracing::error!(
                        message = "encode.failed",
                        action_id = %action_id,
                        descriptor = %d.descriptor,
                        path = %d.arguments.join(","),
                        error = %failure,
                    ),
                    _ => tracing::error!(
                        message = "encode.failed",
                        action_id = %action_id,
                        error = %failure,
                    ),
                }
                self.errors.record(Some(action_id), &failure);
                errors.push(ActionError::Encode(failure));
            }
            if let Some(action) = batch.action_mut(action_id) {
                action.fail(errors);
            }
        }

        if self.config.log_wire_payloads
            && let Ok(body) = encoded.request.to_json()
        {
            tracing::debug!(message = "wire.request", body = %body);
        }

        self.in_flight.push_back(InFlight {
            batch,
            request: encoded.request,
        });
        self.schedule(Runtime::receive);
        Some(id)
    }

    /// Exchange the oldest in-flight batch and settle its actions.
    fn receive(&mut self) {
        let Some(InFlight { mut batch, request }) = self.in_flight.pop_front() else {
            return;
        };

        if !request.is_empty() {
            match self.transport.exchange(&request) {
                Ok(response) => {
                    for action in batch.actions().iter().filter(|a| a.state() == ActionState::Sent) {
                        let wire_id = action.id().to_string();
                        match response.result_for(&wire_id) {
                            Some(result) if result.state == WireState::Success => {
                                action.succeed(result.return_value.clone());
                            }
                            Some(result) => {
                                let errors: Vec<ActionError> = if result.errors.is_empty() {
                                    vec![ActionError::Server {
                                        message: "unknown error".into(),
                                    }]
                                } else {
                                    result
                                        .errors
                                        .iter()
                                        .map(|m| ActionError::Server { message: m.clone() })
                                        .collect()
                                };
                                for err in &errors {
                                    self.errors.report(Some(action.id()), err);
                                }
                                action.fail(errors);
                            }
                            None => {
                                let err = ActionError::MissingResponse { id: action.id() };
                                self.errors.report(Some(action.id()), &err);
                                action.fail(vec![err]);
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        message = "transport.failed",
                        batch_id = batch.id().0,
                        error = %err,
                    );
                    for action in batch.actions().iter().filter(|a| a.state() == ActionState::Sent) {
                        let err = ActionError::Transport(err.clone());
                        self.errors.record(Some(action.id()), &err);
                        action.fail(vec![err]);
                    }
                }
            }
        }

        self.run_observers(SendPhase::PostSend, &batch);

        for action in &mut batch.actions {
            let Some(callback) = action.take_callback() else {
                continue;
            };
            let Some(outcome) = action.handle().outcome() else {
                continue;
            };
            callback(self, &outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDef;
    use crate::transport::{OfflineTransport, TransportError};
    use crate::wire::{WireActionResult, WireResponse};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::Mutex;
    use tracing::Subscriber;
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use weft_core::{AttributeDef, DefDescriptor};

    fn echo_server(req: &WireRequest) -> std::result::Result<WireResponse, TransportError> {
        Ok(WireResponse {
            actions: req
                .actions
                .iter()
                .map(|a| WireActionResult::success(a.id.clone(), Value::Object(a.params.clone())))
                .collect(),
        })
    }

    fn echo() -> ActionDef {
        ActionDef::new("Test", "echo").required("value")
    }

    fn source_def() -> ComponentDef {
        ComponentDef::new(DefDescriptor::markup("test", "source").unwrap())
            .attribute(AttributeDef::new("label").with_default("hello"))
    }

    #[test]
    fn end_of_turn_flush_and_receive() {
        let mut rt = Runtime::new(RuntimeConfig::default(), echo_server);
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        rt.schedule(move |rt| {
            rt.enqueue(
                ActionBuilder::new(echo())
                    .param("value", json!(7))
                    .on_complete(move |_, outcome| *sink.borrow_mut() = Some(outcome.clone())),
            )
            .unwrap();
        });
        let turns = rt.run_until_idle().unwrap();
        assert_eq!(turns, 2);
        let outcome = seen.borrow().clone().unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.return_value, json!({ "value": 7 }));
    }

    #[test]
    fn queue_is_left_alone_without_turn_end_flush() {
        let mut rt = Runtime::new(
            RuntimeConfig::default().with_flush_at_turn_end(false),
            echo_server,
        );
        let handle = rt
            .enqueue(ActionBuilder::new(echo()).param("value", json!(1)))
            .unwrap();
        assert!(rt.is_idle());
        assert_eq!(rt.run_until_idle().unwrap(), 0);
        assert_eq!(handle.state(), ActionState::Queued);

        rt.flush().unwrap();
        assert_eq!(handle.state(), ActionState::Sent);
        rt.run_until_idle().unwrap();
        assert_eq!(handle.state(), ActionState::Completed);
    }

    #[test]
    fn pre_send_destroy_fails_only_the_referencing_action() {
        let mut rt = Runtime::new(RuntimeConfig::default(), echo_server);
        let live = rt.instantiate(source_def());
        let doomed = rt.instantiate(source_def());
        let ok = rt
            .enqueue(ActionBuilder::new(echo()).param("value", rt.reference(live, "v.label").unwrap()))
            .unwrap();
        let bad = rt
            .enqueue(ActionBuilder::new(echo()).param("value", rt.reference(doomed, "v.label").unwrap()))
            .unwrap();
        rt.register_pre_post_send(move |ctx, _| {
            ctx.destroy(doomed);
        }, |_, _| {});

        rt.run_until_idle().unwrap();
        assert_eq!(ok.state(), ActionState::Completed);
        assert_eq!(bad.state(), ActionState::Errored);
        assert_eq!(rt.errors().for_action(bad.id()).len(), 1);
        assert!(rt.errors().for_action(ok.id()).is_empty());
        assert_eq!(
            rt.errors().entries()[0].message,
            "Invalid component tried calling function [get] with arguments [v.label], markup://test:source"
        );
    }

    #[test]
    fn live_resolution_error_fails_only_its_action() {
        let mut rt = Runtime::new(RuntimeConfig::default(), echo_server);
        let source = rt.instantiate(source_def());
        let ok = rt
            .enqueue(ActionBuilder::new(echo()).param("value", rt.reference(source, "v.label").unwrap()))
            .unwrap();
        let bad = rt
            .enqueue(ActionBuilder::new(echo()).param(
                "value",
                ValueExpr::list([
                    rt.reference(source, "v.undeclared").unwrap().into(),
                    rt.reference(source, "v.label.deeper").unwrap().into(),
                ]),
            ))
            .unwrap();

        rt.run_until_idle().unwrap();
        assert_eq!(ok.state(), ActionState::Completed);
        assert_eq!(bad.state(), ActionState::Errored);
        let errors = bad.errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            ActionError::Encode(ResolveError::UnknownAttribute { attribute, .. }) if attribute == "undeclared"
        ));
        assert!(matches!(&errors[1], ActionError::Encode(ResolveError::NotAContainer { .. })));
        assert_eq!(rt.errors().len(), 2);
        assert_eq!(rt.errors().for_action(bad.id()).len(), 2);
        assert!(rt.errors().for_action(ok.id()).is_empty());
        assert!(rt.components().is_live(source));
    }

    #[test]
    fn instantiate_does_not_replace_a_defined_definition() {
        let mut rt = Runtime::new(RuntimeConfig::default(), OfflineTransport);
        let defined = rt.define(source_def());
        let variant = ComponentDef::new(DefDescriptor::markup("test", "source").unwrap())
            .attribute(AttributeDef::new("other"));
        let key = rt.instantiate(variant);

        assert_eq!(rt.registry().get(&defined.descriptor), Some(Arc::clone(&defined)));
        assert!(rt.get_value(key, "v.other").is_ok());
        assert!(rt.get_value(key, "v.label").is_err());

        let fresh = ComponentDef::new(DefDescriptor::markup("test", "fresh").unwrap());
        rt.instantiate(fresh.clone());
        assert!(rt.registry().contains(&fresh.descriptor));
    }

    #[test]
    fn observer_enqueue_lands_in_next_batch() {
        let mut rt = Runtime::new(RuntimeConfig::default().with_flush_at_turn_end(false), echo_server);
        let batches = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&batches);
        let follow_up = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&follow_up);
        rt.register_pre_post_send(
            move |ctx, actions| {
                log.borrow_mut().push(actions.len());
                if slot.borrow().is_none() {
                    let h = ctx
                        .enqueue(ActionBuilder::new(echo()).param("value", json!("late")))
                        .unwrap();
                    *slot.borrow_mut() = Some(h);
                }
            },
            |_, _| {},
        );
        rt.enqueue(ActionBuilder::new(echo()).param("value", json!(1))).unwrap();
        rt.flush().unwrap();
        assert_eq!(*batches.borrow(), vec![1]);
        assert_eq!(rt.queue().len(), 1);

        rt.flush().unwrap();
        assert_eq!(*batches.borrow(), vec![1, 1]);
        rt.run_until_idle().unwrap();
        assert!(follow_up.borrow().as_ref().unwrap().is_complete());
    }

    #[test]
    fn remove_self_takes_effect_after_pass() {
        let mut rt = Runtime::new(RuntimeConfig::default(), echo_server);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        rt.queue_mut().on_pre_send(move |ctx, _| {
            counter.set(counter.get() + 1);
            ctx.remove_self();
        });
        assert_eq!(rt.queue().observer_count(), 1);
        rt.enqueue(ActionBuilder::new(echo()).param("value", json!(1))).unwrap();
        rt.run_until_idle().unwrap();
        rt.enqueue(ActionBuilder::new(echo()).param("value", json!(2))).unwrap();
        rt.run_until_idle().unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(rt.queue().observer_count(), 0);
    }

    #[test]
    fn transport_failure_errors_every_sent_action() {
        let mut rt = Runtime::new(RuntimeConfig::default(), OfflineTransport);
        let a = rt.enqueue(ActionBuilder::new(echo()).param("value", json!(1))).unwrap();
        let b = rt.enqueue(ActionBuilder::new(echo()).param("value", json!(2))).unwrap();
        rt.run_until_idle().unwrap();
        for h in [&a, &b] {
            assert_eq!(h.state(), ActionState::Errored);
            assert!(matches!(h.errors()[0], ActionError::Transport(_)));
        }
        assert_eq!(rt.errors().len(), 2);
    }

    #[test]
    fn missing_result_is_an_error() {
        let mut rt = Runtime::new(
            RuntimeConfig::default(),
            |_: &WireRequest| -> std::result::Result<WireResponse, TransportError> {
                Ok(WireResponse::default())
            },
        );
        let h = rt.enqueue(ActionBuilder::new(echo()).param("value", json!(1))).unwrap();
        rt.run_until_idle().unwrap();
        assert!(matches!(h.errors()[0], ActionError::MissingResponse { .. }));
    }

    #[test]
    fn empty_request_skips_transport() {
        let exchanged = Rc::new(Cell::new(0));
        let count = Rc::clone(&exchanged);
        let mut rt = Runtime::new(RuntimeConfig::default(), move |req: &WireRequest| {
            count.set(count.get() + 1);
            echo_server(req)
        });
        let source = rt.instantiate(source_def());
        let h = rt
            .enqueue(ActionBuilder::new(echo()).param("value", rt.reference(source, "v.label").unwrap()))
            .unwrap();
        rt.destroy(source);
        rt.run_until_idle().unwrap();
        assert_eq!(h.state(), ActionState::Errored);
        assert_eq!(exchanged.get(), 0);
    }

    #[test]
    fn runaway_turns_hit_the_budget() {
        fn respawn(rt: &mut Runtime) {
            rt.schedule(respawn);
        }
        let mut rt = Runtime::new(RuntimeConfig::default().with_turn_budget(5), OfflineTransport);
        rt.schedule(respawn);
        assert!(matches!(
            rt.run_until_idle(),
            Err(RuntimeError::TurnBudgetExceeded { budget: 5 })
        ));
    }

    #[test]
    fn define_json_rejects_garbage() {
        let mut rt = Runtime::new(RuntimeConfig::default(), OfflineTransport);
        let def = rt
            .define_json(r#"{ "descriptor": "markup://ui:label", "attributes": [{ "name": "text" }] }"#)
            .unwrap();
        assert!(rt.registry().contains(&def.descriptor));
        assert!(matches!(
            rt.define_json(r#"{ "descriptor": "nonsense" }"#),
            Err(RuntimeError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn are_actions_complete_tracks_handles() {
        let mut rt = Runtime::new(RuntimeConfig::default(), echo_server);
        let a = rt.enqueue(ActionBuilder::new(echo()).param("value", json!(1))).unwrap();
        let b = rt.enqueue(ActionBuilder::new(echo()).param("value", json!(2))).unwrap();
        let handles = [a, b];
        assert!(!rt.are_actions_complete(&handles));
        rt.run_until_idle().unwrap();
        assert!(rt.are_actions_complete(&handles));
    }

    #[derive(Default)]
    struct EncodeTraceState {
        failures: Vec<(Option<String>, Option<String>)>,
        saw_flush_span: bool,
    }

    struct EncodeTraceCapture {
        state: Arc<Mutex<EncodeTraceState>>,
    }

    impl<S> Layer<S> for EncodeTraceCapture
    where
        S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::Id,
            _ctx: Context<'_, S>,
        ) {
            if attrs.metadata().name() == "weft.flush" {
                self.state.lock().expect("trace lock").saw_flush_span = true;
            }
        }

        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            #[derive(Default)]
            struct Fields {
                message: Option<String>,
                descriptor: Option<String>,
                path: Option<String>,
            }
            impl tracing::field::Visit for Fields {
                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "message" {
                        self.message = Some(value.to_string());
                    }
                }

                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    let text = format!("{value:?}").trim_matches('"').to_string();
                    match field.name() {
                        "message" => self.message = Some(text),
                        "descriptor" => self.descriptor = Some(text),
                        "path" => self.path = Some(text),
                        _ => {}
                    }
                }
            }
            let mut fields = Fields::default();
            event.record(&mut fields);
            if fields.message.as_deref() == Some("encode.failed") {
                self.state
                    .lock()
                    .expect("trace lock")
                    .failures
                    .push((fields.descriptor, fields.path));
            }
        }
    }

    #[test]
    fn encode_failure_emits_event_per_site() {
        let state = Arc::new(Mutex::new(EncodeTraceState::default()));
        let subscriber = tracing_subscriber::registry().with(EncodeTraceCapture {
            state: Arc::clone(&state),
        });
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut rt = Runtime::new(RuntimeConfig::default(), echo_server);
        let source = rt.instantiate(source_def());
        let r1 = rt.reference(source, "v.label").unwrap();
        let r2 = rt.reference(source, "v.label").unwrap();
        rt.enqueue(
            ActionBuilder::new(echo()).param("value", ValueExpr::list([r1.into(), r2.into()])),
        )
        .unwrap();
        rt.destroy(source);
        rt.run_until_idle().unwrap();

        let snapshot = state.lock().expect("trace lock");
        assert!(snapshot.saw_flush_span, "expected weft.flush span");
        assert_eq!(snapshot.failures.len(), 2);
        for (descriptor, path) in &snapshot.failures {
            assert_eq!(descriptor.as_deref(), Some("markup://test:source"));
            assert_eq!(path.as_deref(), Some("v.label"));
        }
    }
}
