#![forbid(unsafe_code)]

//! Reference scenarios.
//!
//! # Destroy race
//!
//! A host component creates a receiver from a cached definition and indexes
//! it as `receiverCmp`. The receiver then asks for a `displayMap` whose
//! definition only the server has; the config of that map references the
//! receiver's `v.stringAttribute` at several sites. A pre-send observer
//! waits for the `getComponent` action carrying the map's descriptor,
//! destroys the receiver, and removes itself. Encoding then fails once per
//! reference site and the creation never completes.
//!
//! # Batch isolation
//!
//! Two unrelated actions share a batch. One references a live component,
//! the other a component destroyed after queueing. Exactly one completes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use weft_core::{
    AttributeDef, ComponentDef, ComponentKey, DefDescriptor, DescriptorError, ResolveError,
    ValueExpr,
};
use weft_runtime::{
    ActionBuilder, ActionDef, ActionHandle, ComponentConfig, Creation, Runtime, RuntimeConfig,
    RuntimeError,
};

use crate::server::DefinitionServer;
use crate::wait::{WaitError, wait_for};

pub const HOST: &str = "markup://loadLevelTest:newCmpHalfLoad";
pub const RECEIVER: &str = "markup://loadLevelTest:newCmpWithValueProvider";
pub const DISPLAY_MAP: &str = "markup://loadLevelTest:displayMap";
pub const RECEIVER_ALIAS: &str = "receiverCmp";
pub const DISPLAY_MAP_ALIAS: &str = "displayMap";

/// What the encoder reports for each reference to the destroyed receiver.
pub const DESTROYED_RECEIVER_ERROR: &str = "Invalid component tried calling function [get] with arguments [v.stringAttribute], markup://loadLevelTest:newCmpWithValueProvider";

const MAX_TURNS: usize = 64;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("waiting for {what}: {source}")]
    Wait {
        what: &'static str,
        #[source]
        source: WaitError,
    },
}

fn descriptor(raw: &str) -> Result<DefDescriptor, ScenarioError> {
    Ok(DefDescriptor::parse(raw)?)
}

fn host_def() -> Result<ComponentDef, ScenarioError> {
    Ok(ComponentDef::new(descriptor(HOST)?).attribute(AttributeDef::new("body")))
}

fn receiver_def() -> Result<ComponentDef, ScenarioError> {
    Ok(ComponentDef::new(descriptor(RECEIVER)?)
        .attribute(AttributeDef::new("stringAttribute").with_default("receiver string")))
}

fn display_map_def() -> Result<ComponentDef, ScenarioError> {
    Ok(ComponentDef::new(descriptor(DISPLAY_MAP)?).attribute(AttributeDef::new("map")))
}

/// Builder for the destroy-race scenario.
#[derive(Debug, Clone)]
pub struct RaceScenario {
    config: RuntimeConfig,
    reference_sites: usize,
    destroy_before_send: bool,
}

impl Default for RaceScenario {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            reference_sites: 2,
            destroy_before_send: true,
        }
    }
}

/// State left behind by a scenario run, for assertions.
pub struct RaceOutcome {
    pub runtime: Runtime,
    pub server: DefinitionServer,
    pub host: ComponentKey,
    pub receiver: ComponentKey,
    pub creation: Creation,
    pub fetch: Option<ActionHandle>,
    /// Whether the pre-send observer found the fetch and destroyed the
    /// receiver.
    pub destroyed_in_pre_send: bool,
    /// Whether the display map's `on_complete` ran.
    pub completed: bool,
}

impl RaceScenario {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// How many times the display map's config references the receiver.
    #[must_use]
    pub fn reference_sites(mut self, sites: usize) -> Self {
        self.reference_sites = sites;
        self
    }

    /// Install the destroying observer (default) or let the fetch proceed.
    #[must_use]
    pub fn destroy_before_send(mut self, enabled: bool) -> Self {
        self.destroy_before_send = enabled;
        self
    }

    /// Run to idle.
    ///
    /// # Errors
    ///
    /// Fails if the scenario cannot be set up; the race itself never
    /// produces an `Err`.
    pub fn run(self) -> Result<RaceOutcome, ScenarioError> {
        let server = DefinitionServer::new().serve(&display_map_def()?);
        let mut rt = Runtime::new(self.config, server.clone());
        rt.define(receiver_def()?);
        let host = rt.instantiate(host_def()?);

        // Receiver: cached definition, indexed into the host on completion.
        rt.new_component_async(
            Some(host),
            ComponentConfig::new(descriptor(RECEIVER)?).local_id(RECEIVER_ALIAS),
            move |rt, receiver| {
                let indexed = rt
                    .components_mut()
                    .set_body(host, vec![receiver])
                    .and_then(|()| rt.components_mut().index(host, RECEIVER_ALIAS, receiver));
                if let Err(err) = indexed {
                    tracing::warn!(message = "scenario.index_failed", error = %err);
                }
            },
        )?;
        wait_for(&mut rt, MAX_TURNS, |rt| rt.find(host, RECEIVER_ALIAS).is_some())
            .map_err(|source| ScenarioError::Wait {
                what: "receiver creation",
                source,
            })?;
        let receiver = rt
            .find(host, RECEIVER_ALIAS)
            .ok_or(ResolveError::UnknownComponent)?;

        let destroyed = Rc::new(Cell::new(false));
        let fetch_seen = Rc::new(RefCell::new(None::<ActionHandle>));
        if self.destroy_before_send {
            let destroyed = Rc::clone(&destroyed);
            let fetch_seen = Rc::clone(&fetch_seen);
            rt.queue_mut().on_pre_send(move |ctx, actions| {
                let found = actions.iter().find(|a| {
                    a.def().name() == "getComponent"
                        && a.param("name").and_then(ValueExpr::as_str) == Some(DISPLAY_MAP)
                });
                if let Some(action) = found {
                    ctx.destroy(receiver);
                    ctx.remove_self();
                    *fetch_seen.borrow_mut() = Some(action.handle());
                    destroyed.set(true);
                }
            });
        }

        // The receiver's controller: create a display map whose config
        // points back at the receiver.
        let mut config = ComponentConfig::new(descriptor(DISPLAY_MAP)?).local_id(DISPLAY_MAP_ALIAS);
        let mut map: Vec<(String, ValueExpr)> = Vec::with_capacity(self.reference_sites);
        for i in 0..self.reference_sites {
            map.push((format!("site{i}"), rt.reference(receiver, "v.stringAttribute")?.into()));
        }
        config = config.attribute("map", ValueExpr::map(map));

        let completed = Rc::new(Cell::new(false));
        let done = Rc::clone(&completed);
        let creation = rt.new_component_async(Some(receiver), config, move |rt, map| {
            done.set(true);
            let attached = rt
                .components_mut()
                .push_body(receiver, map)
                .and_then(|()| rt.components_mut().index(receiver, DISPLAY_MAP_ALIAS, map));
            if let Err(err) = attached {
                tracing::warn!(message = "scenario.attach_failed", error = %err);
            }
        })?;

        rt.run_until_idle()?;

        let fetch = fetch_seen.borrow_mut().take().or_else(|| creation.fetch_action().cloned());
        Ok(RaceOutcome {
            runtime: rt,
            server,
            host,
            receiver,
            creation,
            fetch,
            destroyed_in_pre_send: destroyed.get(),
            completed: completed.get(),
        })
    }
}

/// State left behind by the batch-isolation scenario.
pub struct IsolationOutcome {
    pub runtime: Runtime,
    pub server: DefinitionServer,
    pub live: ActionHandle,
    pub doomed: ActionHandle,
}

/// Queue one action referencing a live component and one referencing a
/// component that is destroyed before the batch is drained, then run to
/// idle.
///
/// # Errors
///
/// Fails only if the scenario cannot be set up.
pub fn isolation(config: RuntimeConfig) -> Result<IsolationOutcome, ScenarioError> {
    let server = DefinitionServer::new();
    let mut rt = Runtime::new(config, server.clone());
    let stable = rt.instantiate(receiver_def()?);
    let doomed_cmp = rt.instantiate(receiver_def()?);
    let echo = ActionDef::new("IsolationController", "echo").required("value");

    let live = rt
        .enqueue(
            ActionBuilder::new(echo.clone())
                .param("value", rt.reference(stable, "v.stringAttribute")?),
        )
        .map_err(RuntimeError::from)?;
    let doomed = rt
        .enqueue(
            ActionBuilder::new(echo)
                .param("value", ValueExpr::list([
                    ValueExpr::literal(Value::from("prefix")),
                    rt.reference(doomed_cmp, "v.stringAttribute")?.into(),
                ])),
        )
        .map_err(RuntimeError::from)?;
    rt.destroy(doomed_cmp);
    rt.run_until_idle()?;

    Ok(IsolationOutcome {
        runtime: rt,
        server,
        live,
        doomed,
    })
}
