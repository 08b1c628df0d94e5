//! Node runtime error types.
//!
//! Errors fall into three groups:
//! - Fatal: malformed input, missing handler, broken input stream. These end
//!   [`crate::node::Node::run`].
//! - Application: [`RpcError`] and [`StoreError`], reported to the requester
//!   with their own code.
//! - Unclassified: anything else a handler returns, reported as `crash`.

use std::time::Duration;

use maelstrom_mesh::StoreError;
use maelstrom_protocol::{CodecError, ErrorCode, RpcError};
use thiserror::Error;

pub type NodeResult<T> = Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("No handler for message type {kind:?}: {line}")]
    NoHandler { kind: String, line: String },

    #[error("Duplicate message handler for {0:?}")]
    DuplicateHandler(String),

    #[error("Node has not received init yet")]
    NotInitialized,

    #[error("Node {0} is already initialized")]
    AlreadyInitialized(String),

    #[error("RPC to {dest} timed out after {after:?}")]
    Timeout { dest: String, after: Duration },

    #[error("RPC to {0} was cancelled before a reply arrived")]
    Cancelled(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    /// The error reply a requester should see, or `None` for unclassified
    /// failures, which are reported as `crash`.
    pub fn rpc_error(&self) -> Option<RpcError> {
        match self {
            NodeError::Rpc(err) => Some(err.clone()),
            NodeError::Store(err) => Some(err.to_rpc_error()),
            NodeError::Timeout { .. } => Some(RpcError::timeout(self.to_string())),
            NodeError::Cancelled(_) => Some(RpcError::abort(self.to_string())),
            NodeError::AlreadyInitialized(_) | NodeError::NotInitialized => {
                Some(RpcError::malformed_request(self.to_string()))
            }
            _ => None,
        }
    }

    /// Convert into the error reply body, falling back to `crash`.
    pub fn into_rpc_error(self) -> RpcError {
        self.rpc_error()
            .unwrap_or_else(|| RpcError::crash(self.to_string()))
    }

    /// Errors that must stop the transport loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Codec(_) | NodeError::NoHandler { .. } | NodeError::Io(_)
        )
    }
}

/// Code carried by `err`, if it maps to an error reply.
pub fn error_code(err: &NodeError) -> Option<ErrorCode> {
    err.rpc_error().map(|e| e.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_errors_keep_their_code() {
        let err = NodeError::from(RpcError::not_supported("nope"));
        assert_eq!(error_code(&err), Some(ErrorCode::NotSupported));

        let store = NodeError::from(StoreError::KeyNotFound("counter-n1".to_string()));
        assert_eq!(error_code(&store), Some(ErrorCode::KeyDoesNotExist));
    }

    #[test]
    fn test_unclassified_errors_become_crash() {
        let err = NodeError::from(anyhow::anyhow!("boom"));
        assert_eq!(error_code(&err), None);

        let reply = err.into_rpc_error();
        assert_eq!(reply.code, ErrorCode::Crash);
        assert_eq!(reply.text, "boom");
    }

    #[test]
    fn test_timeouts_and_cancellation() {
        let timeout = NodeError::Timeout {
            dest: "lin-kv".to_string(),
            after: Duration::from_millis(500),
        };
        assert_eq!(error_code(&timeout), Some(ErrorCode::Timeout));
        assert_eq!(
            error_code(&NodeError::Cancelled("lin-kv".to_string())),
            Some(ErrorCode::Abort)
        );
    }

    #[test]
    fn test_fatal_classification() {
        let no_handler = NodeError::NoHandler {
            kind: "echo".to_string(),
            line: "{}".to_string(),
        };
        assert!(no_handler.is_fatal());
        assert!(!NodeError::from(RpcError::crash("x")).is_fatal());
    }
}
