//! RPC error codes and the error reply body.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::ERROR;

/// Error codes understood by Maelstrom clients and services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The requested operation could not be completed in time.
    Timeout,
    /// The requested operation is not supported by this node.
    NotSupported,
    /// The operation could not be performed right now; safe to retry.
    TemporarilyUnavailable,
    /// The request was malformed.
    MalformedRequest,
    /// Indefinite failure; the operation may or may not have taken place.
    Crash,
    /// Definite failure; the operation did not take place.
    Abort,
    KeyDoesNotExist,
    KeyAlreadyExists,
    /// A compare-and-swap precondition did not hold.
    PreconditionFailed,
    TxnConflict,
    /// Any code outside the table above.
    Other(i64),
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::Timeout => 0,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::KeyDoesNotExist => 20,
            ErrorCode::KeyAlreadyExists => 21,
            ErrorCode::PreconditionFailed => 22,
            ErrorCode::TxnConflict => 30,
            ErrorCode::Other(code) => *code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ErrorCode::Timeout,
            10 => ErrorCode::NotSupported,
            11 => ErrorCode::TemporarilyUnavailable,
            12 => ErrorCode::MalformedRequest,
            13 => ErrorCode::Crash,
            14 => ErrorCode::Abort,
            20 => ErrorCode::KeyDoesNotExist,
            21 => ErrorCode::KeyAlreadyExists,
            22 => ErrorCode::PreconditionFailed,
            30 => ErrorCode::TxnConflict,
            other => ErrorCode::Other(other),
        }
    }

    /// Definite errors guarantee the operation did not take place.
    pub fn is_definite(&self) -> bool {
        !matches!(
            self,
            ErrorCode::Timeout | ErrorCode::Crash | ErrorCode::Other(_)
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Timeout => f.write_str("Timeout"),
            ErrorCode::NotSupported => f.write_str("NotSupported"),
            ErrorCode::TemporarilyUnavailable => f.write_str("TemporarilyUnavailable"),
            ErrorCode::MalformedRequest => f.write_str("MalformedRequest"),
            ErrorCode::Crash => f.write_str("Crash"),
            ErrorCode::Abort => f.write_str("Abort"),
            ErrorCode::KeyDoesNotExist => f.write_str("KeyDoesNotExist"),
            ErrorCode::KeyAlreadyExists => f.write_str("KeyAlreadyExists"),
            ErrorCode::PreconditionFailed => f.write_str("PreconditionFailed"),
            ErrorCode::TxnConflict => f.write_str("TxnConflict"),
            ErrorCode::Other(code) => write!(f, "ErrorCode<{}>", code),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(ErrorCode::from_code)
    }
}

/// An error carried in a reply body.
///
/// Serializes as `{"type": "error", "code": <int>, "text": <string>}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("RPCError({code}, {text:?})")]
pub struct RpcError {
    pub code: ErrorCode,
    pub text: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    code: ErrorCode,
    #[serde(default)]
    text: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn timeout(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, text)
    }

    pub fn not_supported(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, text)
    }

    pub fn temporarily_unavailable(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::TemporarilyUnavailable, text)
    }

    pub fn malformed_request(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRequest, text)
    }

    pub fn crash(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::Crash, text)
    }

    pub fn abort(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::Abort, text)
    }

    pub fn key_does_not_exist(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::KeyDoesNotExist, text)
    }

    pub fn precondition_failed(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionFailed, text)
    }
}

impl Serialize for RpcError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorBody {
            kind: ERROR.to_string(),
            code: self.code,
            text: self.text.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RpcError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let body = ErrorBody::deserialize(deserializer)?;
        Ok(RpcError::new(body.code, body.text))
    }
}
