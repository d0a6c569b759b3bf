//! DAW bridge request/response envelope
//!
//! Requests go out as compact JSON objects:
//!
//! ```json
//! {"type":"set","path":"song","name":"tempo","args":[128.0],"callback_id":"c1"}
//! ```
//!
//! `args` is omitted when empty and `callback_id` when absent. Responses are
//! `{"success":bool,"value":?,"error":?,"callback_id":?}`; a reply that does
//! not parse is reported as no reply at all, so callers handle it exactly like
//! a lost message.

mod path;
mod value;

pub use path::{paths, BridgePath};
pub use value::{BridgeValue, Note};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Get,
    Set,
    Call,
    Observe,
    Unobserve,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Get => "get",
            RequestKind::Set => "set",
            RequestKind::Call => "call",
            RequestKind::Observe => "observe",
            RequestKind::Unobserve => "unobserve",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub path: BridgePath,
    /// Property or method name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<BridgeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
}

impl BridgeRequest {
    pub fn new(kind: RequestKind, path: BridgePath, name: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            name: name.into(),
            args: Vec::new(),
            callback_id: None,
        }
    }

    pub fn get_property(path: BridgePath, property: impl Into<String>) -> Self {
        Self::new(RequestKind::Get, path, property)
    }

    pub fn set_property(
        path: BridgePath,
        property: impl Into<String>,
        value: impl Into<BridgeValue>,
    ) -> Self {
        let mut req = Self::new(RequestKind::Set, path, property);
        req.args.push(value.into());
        req
    }

    pub fn call_method(path: BridgePath, method: impl Into<String>, args: Vec<BridgeValue>) -> Self {
        let mut req = Self::new(RequestKind::Call, path, method);
        req.args = args;
        req
    }

    pub fn observe(path: BridgePath, property: impl Into<String>) -> Self {
        Self::new(RequestKind::Observe, path, property)
    }

    pub fn unobserve(path: BridgePath, property: impl Into<String>) -> Self {
        Self::new(RequestKind::Unobserve, path, property)
    }

    pub fn with_callback_id(mut self, id: impl Into<String>) -> Self {
        self.callback_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<BridgeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
}

impl BridgeResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_value(value: impl Into<BridgeValue>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_callback_id(mut self, id: impl Into<String>) -> Self {
        self.callback_id = Some(id.into());
        self
    }
}

pub fn serialize_request(request: &BridgeRequest) -> Result<String, BridgeError> {
    Ok(serde_json::to_string(request)?)
}

/// Parse a reply. Returns `None` for anything that is not a JSON object.
///
/// Field-level problems are tolerated the way the bridge peer expects: a
/// missing or non-boolean `success` reads as `false`, a `null` or
/// unrepresentable `value` is dropped, and non-string `error`/`callback_id`
/// fields are ignored.
pub fn deserialize_response(input: &str) -> Option<BridgeResponse> {
    let obj = match serde_json::from_str::<Value>(input).ok()? {
        Value::Object(obj) => obj,
        _ => return None,
    };

    let string_field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_owned);

    Some(BridgeResponse {
        success: obj.get("success").and_then(Value::as_bool).unwrap_or(false),
        value: obj
            .get("value")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        error: string_field("error"),
        callback_id: string_field("callback_id"),
    })
}

/// Peer side: parse an incoming request envelope.
pub fn deserialize_request(input: &str) -> Result<BridgeRequest, BridgeError> {
    Ok(serde_json::from_str(input)?)
}

/// Peer side: render a reply envelope.
pub fn serialize_response(response: &BridgeResponse) -> Result<String, BridgeError> {
    Ok(serde_json::to_string(response)?)
}

/// Render notes for clip note operations: `[{pitch,start,duration,velocity,muted}, ...]`.
pub fn serialize_notes(notes: &[Note]) -> Result<String, BridgeError> {
    Ok(serde_json::to_string(notes)?)
}
