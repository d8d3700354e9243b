use thiserror::Error;
use weft_harness::ScenarioError;

pub type Result<T> = std::result::Result<T, DemoError>;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scenario setup failed: {0}")]
    Scenario(#[from] ScenarioError),

    /// The scenario ran but did not behave as specified.
    #[error("scenario {scenario} diverged: {message}")]
    Diverged {
        scenario: &'static str,
        message: String,
    },
}

impl DemoError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Diverged { .. } => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn diverged(scenario: &'static str, message: impl Into<String>) -> Self {
        Self::Diverged {
            scenario,
            message: message.into(),
        }
    }
}
