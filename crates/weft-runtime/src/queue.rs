#![forbid(unsafe_code)]

//! The action queue and its send observers.
//!
//! Queued actions accumulate until a drain point; everything queued at that
//! moment forms exactly one [`Batch`]. Observers registered with
//! [`ActionQueue::register_pre_post_send`] see the complete batch immediately
//! before encoding and again after the response arrives.
//!
//! # Invariants
//!
//! 1. Observers receive the batch as an immutable slice. They may destroy
//!    components or enqueue new actions through [`SendContext`], but cannot
//!    add, drop, or reorder actions of the batch they observe.
//! 2. Actions enqueued while observers run land in the next batch.
//! 3. Observers run in registration order. Removals requested during a pass
//!    take effect once the pass ends.

use std::collections::BTreeMap;

use weft_core::{ComponentArena, ComponentKey};

use crate::action::{Action, ActionBuilder, ActionHandle, ActionId, ActionState};
use crate::error::ActionError;
use crate::sink::ErrorSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

/// Registration handle for a send observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(u64);

/// The actions selected for one transmission cycle.
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    pub(crate) actions: Vec<Action>,
}

impl Batch {
    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        self.actions.iter_mut().find(|a| a.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    PreSend,
    PostSend,
}

pub type SendObserver = Box<dyn FnMut(&mut SendContext<'_>, &[Action])>;

#[derive(Default)]
pub(crate) struct Observer {
    pre: Option<SendObserver>,
    post: Option<SendObserver>,
}

impl Observer {
    pub(crate) fn for_phase(&mut self, phase: SendPhase) -> Option<&mut SendObserver> {
        match phase {
            SendPhase::PreSend => self.pre.as_mut(),
            SendPhase::PostSend => self.post.as_mut(),
        }
    }
}

pub(crate) type ObserverMap = BTreeMap<CallbackHandle, Observer>;

/// What an observer may touch while it runs.
pub struct SendContext<'a> {
    pub(crate) handle: CallbackHandle,
    pub(crate) phase: SendPhase,
    pub(crate) batch: BatchId,
    pub(crate) components: &'a mut ComponentArena,
    pub(crate) queue: &'a mut ActionQueue,
    pub(crate) errors: &'a ErrorSink,
    pub(crate) removals: &'a mut Vec<CallbackHandle>,
}

impl SendContext<'_> {
    /// Handle of the observer being invoked.
    #[must_use]
    pub fn handle(&self) -> CallbackHandle {
        self.handle
    }

    #[must_use]
    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    #[must_use]
    pub fn batch_id(&self) -> BatchId {
        self.batch
    }

    #[must_use]
    pub fn components(&self) -> &ComponentArena {
        self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentArena {
        self.components
    }

    #[must_use]
    pub fn errors(&self) -> &ErrorSink {
        self.errors
    }

    /// Destroy a component immediately.
    pub fn destroy(&mut self, key: ComponentKey) -> bool {
        self.components.destroy(key)
    }

    /// Enqueue a new action; it will be part of the next batch.
    ///
    /// # Errors
    ///
    /// Fails if the parameters do not match the action definition.
    pub fn enqueue(&mut self, builder: ActionBuilder) -> Result<ActionHandle, ActionError> {
        let action = self.queue.create(builder)?;
        Ok(self.queue.enqueue(action))
    }

    /// Deregister this observer after the current pass.
    pub fn remove_self(&mut self) {
        self.removals.push(self.handle);
    }

    /// Deregister any observer after the current pass.
    pub fn remove_callback(&mut self, handle: CallbackHandle) {
        self.removals.push(handle);
    }
}

/// Collects queued actions and owns the send observers.
#[derive(Default)]
pub struct ActionQueue {
    pending: Vec<Action>,
    observers: ObserverMap,
    next_action: u64,
    next_batch: u64,
    next_handle: u64,
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.pending.len())
            .field("observers", &self.observers.len())
            .field("next_action", &self.next_action)
            .field("next_batch", &self.next_batch)
            .finish()
    }
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an action in the `Created` state with a fresh id.
    ///
    /// # Errors
    ///
    /// Fails if the parameters do not match the action definition.
    pub fn create(&mut self, builder: ActionBuilder) -> Result<Action, ActionError> {
        self.next_action += 1;
        builder.build(ActionId(self.next_action))
    }

    /// Queue a `Created` action.
    pub fn enqueue(&mut self, action: Action) -> ActionHandle {
        let handle = action.handle();
        if action.transition(ActionState::Queued) {
            tracing::trace!(
                message = "action.enqueue",
                action_id = %action.id(),
                descriptor = %action.def().descriptor(),
            );
            self.pending.push(action);
        }
        handle
    }

    #[must_use]
    pub fn pending(&self) -> &[Action] {
        &self.pending
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every queued action as one batch.
    pub(crate) fn drain(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        self.next_batch += 1;
        let batch = Batch {
            id: BatchId(self.next_batch),
            actions: std::mem::take(&mut self.pending),
        };
        tracing::debug!(
            message = "queue.drain",
            batch_id = batch.id.0,
            actions = batch.actions.len(),
        );
        Some(batch)
    }

    fn register(&mut self, observer: Observer) -> CallbackHandle {
        self.next_handle += 1;
        let handle = CallbackHandle(self.next_handle);
        self.observers.insert(handle, observer);
        handle
    }

    /// Install a pre-send and a post-send observer under one handle.
    pub fn register_pre_post_send(
        &mut self,
        pre: impl FnMut(&mut SendContext<'_>, &[Action]) + 'static,
        post: impl FnMut(&mut SendContext<'_>, &[Action]) + 'static,
    ) -> CallbackHandle {
        self.register(Observer {
            pre: Some(Box::new(pre)),
            post: Some(Box::new(post)),
        })
    }

    pub fn on_pre_send(
        &mut self,
        pre: impl FnMut(&mut SendContext<'_>, &[Action]) + 'static,
    ) -> CallbackHandle {
        self.register(Observer {
            pre: Some(Box::new(pre)),
            post: None,
        })
    }

    pub fn on_post_send(
        &mut self,
        post: impl FnMut(&mut SendContext<'_>, &[Action]) + 'static,
    ) -> CallbackHandle {
        self.register(Observer {
            pre: None,
            post: Some(Box::new(post)),
        })
    }

    /// Deregister an observer. Returns `false` for unknown handles.
    pub fn remove_callback(&mut self, handle: CallbackHandle) -> bool {
        self.observers.remove(&handle).is_some()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn take_observers(&mut self) -> ObserverMap {
        std::mem::take(&mut self.observers)
    }

    /// Put observers back after a pass, keeping any registered meanwhile and
    /// applying requested removals.
    pub(crate) fn restore_observers(&mut self, mut taken: ObserverMap, removals: &[CallbackHandle]) {
        taken.append(&mut self.observers);
        for handle in removals {
            taken.remove(handle);
        }
        self.observers = taken;
    }
}
