#![forbid(unsafe_code)]

//! Error reporting sink.
//!
//! Errors contained inside the runtime (encode failures, transport failures,
//! failed fetches) are recorded here with the action they belong to, and
//! logged at ERROR. Tests and monitors query the sink instead of parsing
//! logs.

use std::fmt::Display;

use crate::action::ActionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    /// The action the error is attributed to, if any.
    pub action: Option<ActionId>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    entries: Vec<ReportedError>,
}

impl ErrorSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log at ERROR.
    pub fn report(&mut self, action: Option<ActionId>, error: &dyn Display) {
        let message = error.to_string();
        match action {
            Some(id) => tracing::error!(message = "runtime.error", action_id = %id, error = %message),
            None => tracing::error!(message = "runtime.error", error = %message),
        }
        self.entries.push(ReportedError { action, message });
    }

    /// Record without logging, for callers that already emitted a more
    /// specific event.
    pub fn record(&mut self, action: Option<ActionId>, error: &dyn Display) {
        self.entries.push(ReportedError {
            action,
            message: error.to_string(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[ReportedError] {
        &self.entries
    }

    /// Number of recorded errors whose message equals `message`.
    #[must_use]
    pub fn count(&self, message: &str) -> usize {
        self.entries.iter().filter(|e| e.message == message).count()
    }

    #[must_use]
    pub fn for_action(&self, id: ActionId) -> Vec<&ReportedError> {
        self.entries.iter().filter(|e| e.action == Some(id)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&mut self) -> Vec<ReportedError> {
        std::mem::take(&mut self.entries)
    }
}
