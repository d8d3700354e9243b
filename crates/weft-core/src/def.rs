#![forbid(unsafe_code)]

//! Component definitions.
//!
//! A definition names the attributes a component declares and their default
//! values. Definitions arrive either from the local registry or as the
//! return value of a server fetch, so they deserialize from JSON:
//!
//! ```json
//! {
//!   "descriptor": "markup://loadLevelTest:displayMap",
//!   "attributes": [
//!     { "name": "map" },
//!     { "name": "title", "default": "untitled" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::DefDescriptor;

/// A declared attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl AttributeDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// The definition a component is instantiated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub descriptor: DefDescriptor,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

impl ComponentDef {
    #[must_use]
    pub fn new(descriptor: DefDescriptor) -> Self {
        Self {
            descriptor,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(mut self, attr: AttributeDef) -> Self {
        self.attributes.push(attr);
        self
    }

    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    #[must_use]
    pub fn attribute_def(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
