//! Message envelope and common body fields.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{error::RpcError, ERROR};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed message body: {0}")]
    Body(#[source] serde_json::Error),

    #[error("message body must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A single message exchanged between nodes.
///
/// The body is kept as JSON so that each handler parses it into its own
/// payload type exactly once; the common header is validated by [`Message::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub src: String,
    pub dest: String,
    pub body: Value,
}

/// Reserved body fields shared by every message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyHeader {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
}

impl Message {
    pub fn new(src: impl Into<String>, dest: impl Into<String>, body: Value) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            body,
        }
    }

    /// Parse one line of input, validating the envelope and the body header.
    pub fn decode(line: &str) -> Result<Self, CodecError> {
        let msg: Message = serde_json::from_str(line).map_err(CodecError::Envelope)?;
        msg.header()?;
        Ok(msg)
    }

    /// Serialize to a single line (no trailing newline).
    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    pub fn header(&self) -> Result<BodyHeader, CodecError> {
        if !self.body.is_object() {
            return Err(CodecError::NotAnObject(json_kind(&self.body)));
        }
        BodyHeader::deserialize(&self.body).map_err(CodecError::Body)
    }

    /// The body `type` tag, or an empty string when absent.
    pub fn kind(&self) -> &str {
        self.body.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(Value::as_u64)
    }

    /// Correlation id of the request this message answers; `0` counts as absent.
    pub fn in_reply_to(&self) -> Option<u64> {
        self.body
            .get("in_reply_to")
            .and_then(Value::as_u64)
            .filter(|id| *id != 0)
    }

    pub fn is_error(&self) -> bool {
        self.kind() == ERROR
    }

    /// Parse the body into a typed payload. Failures are reported as
    /// malformed-request errors so they can be sent back to the requester.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        T::deserialize(&self.body).map_err(|e| {
            RpcError::malformed_request(format!("invalid {} body: {}", self.kind(), e))
        })
    }

    /// The error carried by this body, if it is an error reply.
    pub fn rpc_error(&self) -> Option<RpcError> {
        if !self.is_error() {
            return None;
        }
        Some(
            RpcError::deserialize(&self.body)
                .unwrap_or_else(|e| RpcError::crash(format!("unreadable error body: {}", e))),
        )
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}: {}", self.src, self.dest, self.body)
    }
}

/// Serialize a payload into a body object and stamp the correlation fields.
pub fn encode_body<T: Serialize + ?Sized>(
    payload: &T,
    msg_id: Option<u64>,
    in_reply_to: Option<u64>,
) -> Result<Value, CodecError> {
    let value = serde_json::to_value(payload).map_err(CodecError::Encode)?;
    let mut body: Map<String, Value> = match value {
        Value::Object(map) => map,
        other => return Err(CodecError::NotAnObject(json_kind(&other))),
    };
    if let Some(id) = msg_id {
        body.insert("msg_id".to_string(), Value::from(id));
    }
    if let Some(id) = in_reply_to {
        body.insert("in_reply_to".to_string(), Value::from(id));
    }
    Ok(Value::Object(body))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
