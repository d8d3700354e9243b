//! Scenario reports, printed as text or JSON.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;
use weft_runtime::{ActionHandle, ErrorSink};

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub id: String,
    pub label: &'static str,
    pub state: &'static str,
    pub errors: Vec<String>,
}

impl ActionReport {
    #[must_use]
    pub fn from_handle(label: &'static str, handle: &ActionHandle) -> Self {
        Self {
            id: handle.id().to_string(),
            label,
            state: handle.state().as_str(),
            errors: handle.errors().iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub action: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: &'static str,
    /// Request bodies as the server received them.
    pub requests: Vec<Value>,
    pub actions: Vec<ActionReport>,
    pub errors: Vec<ErrorReport>,
    pub details: BTreeMap<&'static str, String>,
}

impl ScenarioReport {
    #[must_use]
    pub fn new(scenario: &'static str) -> Self {
        Self {
            scenario,
            requests: Vec::new(),
            actions: Vec::new(),
            errors: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    /// Attach request bodies; unparsable bodies are kept as strings.
    #[must_use]
    pub fn requests(mut self, bodies: Vec<String>) -> Self {
        self.requests = bodies
            .into_iter()
            .map(|body| serde_json::from_str(&body).unwrap_or(Value::String(body)))
            .collect();
        self
    }

    #[must_use]
    pub fn action(mut self, label: &'static str, handle: &ActionHandle) -> Self {
        self.actions.push(ActionReport::from_handle(label, handle));
        self
    }

    #[must_use]
    pub fn errors(mut self, sink: &ErrorSink) -> Self {
        self.errors = sink
            .entries()
            .iter()
            .map(|e| ErrorReport {
                action: e.action.map(|id| id.to_string()),
                message: e.message.clone(),
            })
            .collect();
        self
    }

    #[must_use]
    pub fn detail(mut self, key: &'static str, value: impl ToString) -> Self {
        self.details.insert(key, value.to_string());
        self
    }

    /// Write the report to `out`.
    ///
    /// # Errors
    ///
    /// Fails on I/O or serialization errors.
    pub fn write(&self, out: &mut impl Write, json: bool) -> Result<()> {
        if json {
            serde_json::to_writer_pretty(&mut *out, self)?;
            writeln!(out)?;
            return Ok(());
        }

        writeln!(out, "== {} ==", self.scenario)?;
        for (key, value) in &self.details {
            writeln!(out, "{key}: {value}")?;
        }
        writeln!(out, "requests: {}", self.requests.len())?;
        for body in &self.requests {
            writeln!(out, "  {body}")?;
        }
        writeln!(out, "actions:")?;
        for action in &self.actions {
            writeln!(out, "  {} [{}] {}", action.id, action.label, action.state)?;
            for err in &action.errors {
                writeln!(out, "    - {err}")?;
            }
        }
        writeln!(out, "reported errors: {}", self.errors.len())?;
        for err in &self.errors {
            let action = err.action.as_deref().unwrap_or("-");
            writeln!(out, "  {action}: {}", err.message)?;
        }
        Ok(())
    }

    /// Print to stdout.
    ///
    /// # Errors
    ///
    /// See [`ScenarioReport::write`].
    pub fn print(&self, json: bool) -> Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.write(&mut lock, json)
    }
}
