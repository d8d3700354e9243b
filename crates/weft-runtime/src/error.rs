use thiserror::Error;
use weft_core::{DefDescriptor, ResolveError};

use crate::action::ActionId;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Why a single action ended in the `Errored` state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// One reference site in the parameters could not be resolved.
    #[error(transparent)]
    Encode(#[from] ResolveError),

    #[error("server error: {message}")]
    Server { message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no response for action {id}")]
    MissingResponse { id: ActionId },

    #[error("invalid parameters for {action}: {reason}")]
    InvalidParams { action: String, reason: String },

    #[error("invalid response for {action}: {reason}")]
    InvalidResponse { action: String, reason: String },

    /// The caller of a creation, or the reserved component itself, was
    /// destroyed before the component went `Live`.
    #[error("creation abandoned: {0}")]
    Abandoned(ResolveError),
}

/// A component definition could not be obtained from the server.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to fetch definition {descriptor} ({} error(s))", .errors.len())]
pub struct FetchError {
    pub descriptor: DefDescriptor,
    pub errors: Vec<ActionError>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("turn budget of {budget} exhausted before the runtime went idle")]
    TurnBudgetExceeded { budget: usize },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("invalid definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
}
