#![forbid(unsafe_code)]

//! Action batching, encoding, and asynchronous component creation.
//!
//! [`Runtime`] owns the component arena, the action queue, and a
//! [`Transport`]. Everything runs on one thread as a sequence of turns; see
//! [`runtime`] for the flush ordering.

pub mod action;
pub mod config;
pub mod encoder;
pub mod error;
pub mod factory;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod sink;
pub mod transport;
pub mod wire;

pub use action::{
    Action, ActionBuilder, ActionCallback, ActionDef, ActionHandle, ActionId, ActionOutcome,
    ActionState, ParamDef,
};
pub use config::RuntimeConfig;
pub use encoder::{EncodedBatch, Encoder};
pub use error::{ActionError, FetchError, Result, RuntimeError};
pub use factory::{ComponentConfig, Creation, CreationState};
pub use queue::{ActionQueue, Batch, BatchId, CallbackHandle, SendContext, SendObserver, SendPhase};
pub use registry::DefRegistry;
pub use runtime::{Runtime, Turn};
pub use sink::{ErrorSink, ReportedError};
pub use transport::{OfflineTransport, Transport, TransportError};
pub use wire::{WireAction, WireActionResult, WireRequest, WireResponse, WireState};
