//! Opaque per-Area cursor ("storage variable").
//!
//! The engine stores and hands back whatever the Action handler returned;
//! it never looks inside. Handlers decode it into their own typed state
//! with [`Cursor::decode`] and encode the next value with [`Cursor::encode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured document owned by the Action handler of one Area.
///
/// A fresh Area starts with an empty object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(Value);

impl Default for Cursor {
    fn default() -> Self {
        Self(Value::Object(Default::default()))
    }
}

impl Cursor {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn encode<T: Serialize>(state: &T) -> serde_json::Result<Self> {
        serde_json::to_value(state).map(Self)
    }

    /// Decodes the handler's state. `None` means the cursor was never
    /// initialised (empty object or null) or holds another shape, in which
    /// case the handler starts over from "now".
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        serde_json::from_value(self.0.clone()).ok()
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(Self)
    }
}
