#![forbid(unsafe_code)]

//! Wire format for action batches.
//!
//! Request:
//!
//! ```json
//! { "batchId": 3,
//!   "actions": [{ "id": "7;a",
//!                 "descriptor": "action://ComponentController/getComponent",
//!                 "callingDescriptor": "markup://ui:receiver",
//!                 "params": { "name": "markup://ui:displayMap" } }] }
//! ```
//!
//! Response:
//!
//! ```json
//! { "actions": [{ "id": "7;a", "state": "SUCCESS", "returnValue": {}, "error": [] }] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub batch_id: u64,
    pub actions: Vec<WireAction>,
}

impl WireRequest {
    /// Serialize to the request body.
    ///
    /// # Errors
    ///
    /// Only fails if a parameter value cannot be represented as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAction {
    pub id: String,
    pub descriptor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling_descriptor: Option<String>,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireState {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireActionResult {
    pub id: String,
    pub state: WireState,
    #[serde(default)]
    pub return_value: Value,
    #[serde(default, rename = "error")]
    pub errors: Vec<String>,
}

impl WireActionResult {
    #[must_use]
    pub fn success(id: impl Into<String>, return_value: Value) -> Self {
        Self {
            id: id.into(),
            state: WireState::Success,
            return_value,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: WireState::Error,
            return_value: Value::Null,
            errors: vec![message.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub actions: Vec<WireActionResult>,
}

impl WireResponse {
    /// Parse a response body.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or unknown action states.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    #[must_use]
    pub fn result_for(&self, id: &str) -> Option<&WireActionResult> {
        self.actions.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case_and_skips_missing_caller() {
        let request = WireRequest {
            batch_id: 1,
            actions: vec![WireAction {
                id: "1;a".into(),
                descriptor: "action://C/a".into(),
                calling_descriptor: None,
                params: Map::new(),
            }],
        };
        let value: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "batchId": 1, "actions": [{ "id": "1;a", "descriptor": "action://C/a", "params": {} }] })
        );
    }

    #[test]
    fn response_parses_states_and_errors() {
        let response = WireResponse::from_json(
            r#"{"actions":[
                {"id":"1;a","state":"SUCCESS","returnValue":{"x":1}},
                {"id":"2;a","state":"ERROR","error":["boom"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(response.result_for("1;a").unwrap().return_value, json!({ "x": 1 }));
        let failed = response.result_for("2;a").unwrap();
        assert_eq!(failed.state, WireState::Error);
        assert_eq!(failed.errors, vec!["boom".to_string()]);
        assert!(response.result_for("3;a").is_none());
        assert!(WireResponse::from_json(r#"{"actions":[{"id":"1;a","state":"MAYBE"}]}"#).is_err());
    }
}
