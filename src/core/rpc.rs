//! JSON-RPC 2.0 message model.
//!
//! The bridge treats message content as opaque: `params`, `result`, `error`
//! and any other fields live in a flattened map so that value content
//! round-trips unchanged. Only `jsonrpc`, `id` and `method` are inspected,
//! which is exactly what classification needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::jsonrpc;
use crate::core::errors::ProxyError;

/// One JSON-RPC 2.0 frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,
    /// `None` means the field was absent. An explicit `"id": null` (seen on
    /// error responses) is kept as `Some(Value::Null)` so it round-trips.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Frame classification per JSON-RPC 2.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
}

impl Message {
    /// Parse one frame from raw bytes, validating the JSON-RPC shape.
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let msg: Message = serde_json::from_str(raw)
            .map_err(|e| ProxyError::MalformedFrame(e.to_string()))?;
        msg.kind()?;
        Ok(msg)
    }

    /// Serialise as compact JSON (no trailing newline).
    pub fn to_json(&self) -> Result<String, ProxyError> {
        serde_json::to_string(self).map_err(|e| ProxyError::MalformedFrame(e.to_string()))
    }

    /// Classify the frame, rejecting ambiguous or ill-typed shapes.
    pub fn kind(&self) -> Result<MessageKind, ProxyError> {
        if self.jsonrpc != jsonrpc::VERSION {
            return Err(ProxyError::SchemaViolation(format!(
                "jsonrpc must be \"2.0\", got {:?}",
                self.jsonrpc
            )));
        }

        if let Some(id) = &self.id {
            let valid = match id {
                Value::String(_) => true,
                Value::Number(n) => n.is_i64() || n.is_u64(),
                // Null ids appear on error responses from real servers.
                Value::Null => self.method.is_none(),
                _ => false,
            };
            if !valid {
                return Err(ProxyError::SchemaViolation(format!(
                    "id must be a string or integer, got {id}"
                )));
            }
        }

        if self.method.is_some() {
            return Ok(if self.id.is_some() {
                MessageKind::Request
            } else {
                MessageKind::Notification
            });
        }

        // No method: must be a response carrying exactly one of result/error.
        let has_result = self.rest.contains_key("result");
        let has_error = self.rest.contains_key("error");
        match (self.id.is_some(), has_result, has_error) {
            (true, true, false) | (true, false, true) => Ok(MessageKind::Response),
            (true, true, true) => Err(ProxyError::SchemaViolation(
                "response carries both result and error".to_string(),
            )),
            (true, false, false) => Err(ProxyError::SchemaViolation(
                "response carries neither result nor error".to_string(),
            )),
            (false, _, _) => Err(ProxyError::SchemaViolation(
                "frame has neither method nor id".to_string(),
            )),
        }
    }

    /// Key used to pair a response to the request that produced it.
    pub fn id_key(&self) -> Option<String> {
        self.id.as_ref().map(|id| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Result<Message, ProxyError> {
        Message::parse(&v.to_string())
    }

    #[test]
    fn classifies_request() {
        let msg = parse(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert_eq!(msg.kind().unwrap(), MessageKind::Request);
    }

    #[test]
    fn classifies_notification() {
        let msg =
            parse(json!({"jsonrpc": "2.0", "method": "log", "params": {"m": "hi"}})).unwrap();
        assert_eq!(msg.kind().unwrap(), MessageKind::Notification);
    }

    #[test]
    fn classifies_response_with_string_id() {
        let msg = parse(json!({"jsonrpc": "2.0", "id": "a-1", "result": {}})).unwrap();
        assert_eq!(msg.kind().unwrap(), MessageKind::Response);
    }

    #[test]
    fn rejects_wrong_version() {
        let err = parse(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"})).unwrap_err();
        assert!(matches!(err, ProxyError::SchemaViolation(_)));
    }

    #[test]
    fn rejects_result_and_error_together() {
        let err =
            parse(json!({"jsonrpc": "2.0", "id": 1, "result": {}, "error": {}})).unwrap_err();
        assert!(matches!(err, ProxyError::SchemaViolation(_)));
    }

    #[test]
    fn rejects_boolean_id() {
        let err = parse(json!({"jsonrpc": "2.0", "id": true, "method": "ping"})).unwrap_err();
        assert!(matches!(err, ProxyError::SchemaViolation(_)));
    }

    #[test]
    fn rejects_fractional_id() {
        let err = parse(json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"})).unwrap_err();
        assert!(matches!(err, ProxyError::SchemaViolation(_)));
    }

    #[test]
    fn accepts_null_id_on_error_response() {
        let msg = parse(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "parse error"}
        }))
        .unwrap();
        assert_eq!(msg.kind().unwrap(), MessageKind::Response);
    }

    #[test]
    fn null_id_round_trips() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "parse error"}
        });
        let msg = parse(raw.clone()).unwrap();
        let back: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn rejects_non_json_bytes() {
        let err = Message::parse("not json at all").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedFrame(_)));
    }

    #[test]
    fn roundtrip_preserves_id_and_payload() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 42,
            "result": {"pid": 1234, "nested": [1, 2, {"k": "v"}]}
        });
        let msg = parse(raw.clone()).unwrap();
        let back: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn roundtrip_preserves_unknown_fields() {
        let raw = json!({
            "jsonrpc": "2.0",
            "method": "x",
            "params": {"a": 1},
            "_meta": {"trace": "t1"}
        });
        let msg = parse(raw.clone()).unwrap();
        let back: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn id_key_distinguishes_string_from_number() {
        let a = parse(json!({"jsonrpc": "2.0", "id": 1, "method": "m"})).unwrap();
        let b = parse(json!({"jsonrpc": "2.0", "id": "1", "method": "m"})).unwrap();
        assert_ne!(a.id_key(), b.id_key());
    }
}
