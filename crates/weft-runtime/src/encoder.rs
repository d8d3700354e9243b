#![forbid(unsafe_code)]

//! Batch encoding.
//!
//! Parameters are frozen when the batch forms, but attribute references
//! inside them are resolved here, immediately before transmission. That is
//! the point where a component destroyed after its action was queued is
//! noticed.
//!
//! # Failure containment
//!
//! Every reference site is resolved independently. A failing site yields one
//! [`ResolveError`] (no deduplication) and the walk continues, so an action
//! referencing a destroyed component twice reports two errors. An action
//! with any failed site is left out of the request; the rest of the batch is
//! encoded as usual. Nothing escapes [`Encoder::encode`] as an `Err`.

use weft_core::{ComponentArena, ResolveError};

use crate::action::{Action, ActionId};
use crate::queue::Batch;
use crate::wire::{WireAction, WireRequest};

/// Result of encoding one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    /// Request containing the actions that encoded cleanly, in batch order.
    pub request: WireRequest,
    /// Per-action resolution failures, in batch order.
    pub failures: Vec<(ActionId, Vec<ResolveError>)>,
}

impl EncodedBatch {
    /// Total failed reference sites across the batch.
    #[must_use]
    pub fn failed_sites(&self) -> usize {
        self.failures.iter().map(|(_, errs)| errs.len()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Encoder<'a> {
    components: &'a ComponentArena,
}

impl<'a> Encoder<'a> {
    #[must_use]
    pub fn new(components: &'a ComponentArena) -> Self {
        Self { components }
    }

    /// Encode one action.
    ///
    /// # Errors
    ///
    /// Returns every failed reference site of the action.
    pub fn encode_action(&self, action: &Action) -> Result<WireAction, Vec<ResolveError>> {
        let mut errors = Vec::new();
        let params = action
            .params()
            .iter()
            .map(|(name, expr)| (name.clone(), expr.resolve_each(self.components, &mut errors)))
            .collect();
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(WireAction {
            id: action.id().to_string(),
            descriptor: action.def().descriptor(),
            calling_descriptor: action
                .caller()
                .and_then(|k| self.components.descriptor_of(k))
                .map(ToString::to_string),
            params,
        })
    }

    /// Encode a whole batch, containing failures per action.
    #[must_use]
    pub fn encode(&self, batch: &Batch) -> EncodedBatch {
        let mut actions = Vec::with_capacity(batch.len());
        let mut failures = Vec::new();
        for action in batch.actions() {
            match self.encode_action(action) {
                Ok(wire) => actions.push(wire),
                Err(errors) => {
                    tracing::debug!(
                        message = "encode.action_failed",
                        action_id = %action.id(),
                        sites = errors.len(),
                    );
                    failures.push((action.id(), errors));
                }
            }
        }
        EncodedBatch {
            request: WireRequest {
                batch_id: batch.id().0,
                actions,
            },
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionBuilder, ActionDef};
    use crate::queue::ActionQueue;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use weft_core::{AttributeDef, ComponentDef, DefDescriptor, ValueExpr};

    fn source_def() -> Arc<ComponentDef> {
        Arc::new(
            ComponentDef::new(DefDescriptor::markup("test", "source").unwrap())
                .attribute(AttributeDef::new("label").with_default("hello")),
        )
    }

    fn echo() -> ActionDef {
        ActionDef::new("Test", "echo").required("value")
    }

    #[test]
    fn literal_and_live_reference_params_encode() {
        let mut arena = ComponentArena::new();
        let source = arena.instantiate(source_def(), BTreeMap::new(), None);
        let mut queue = ActionQueue::new();
        let reference = arena.reference(source, "v.label").unwrap();
        let action = queue
            .create(
                ActionBuilder::new(echo())
                    .param("value", ValueExpr::map([("a", ValueExpr::literal(1)), ("b", reference.into())]))
                    .caller(source),
            )
            .unwrap();
        queue.enqueue(action);
        let batch = queue.drain().unwrap();

        let encoded = Encoder::new(&arena).encode(&batch);
        assert!(encoded.failures.is_empty());
        let wire = &encoded.request.actions[0];
        assert_eq!(wire.params["value"], json!({ "a": 1, "b": "hello" }));
        assert_eq!(wire.calling_descriptor.as_deref(), Some("markup://test:source"));
    }

    #[test]
    fn one_error_per_reference_site() {
        let mut arena = ComponentArena::new();
        let source = arena.instantiate(source_def(), BTreeMap::new(), None);
        let r1 = arena.reference(source, "v.label").unwrap();
        let r2 = arena.reference(source, "v.label").unwrap();
        let mut queue = ActionQueue::new();
        let action = queue
            .create(
                ActionBuilder::new(echo())
                    .param("value", ValueExpr::list([r1.into(), ValueExpr::literal("x"), r2.into()])),
            )
            .unwrap();
        let id = action.id();
        queue.enqueue(action);
        let batch = queue.drain().unwrap();

        arena.destroy(source);
        let encoded = Encoder::new(&arena).encode(&batch);
        assert!(encoded.request.is_empty());
        assert_eq!(encoded.failures.len(), 1);
        assert_eq!(encoded.failures[0].0, id);
        assert_eq!(encoded.failed_sites(), 2);
        assert!(encoded.failures[0].1.iter().all(ResolveError::is_destroyed));
    }
}
