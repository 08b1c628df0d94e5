//! Compare-and-swap store seam.

use async_trait::async_trait;
use maelstrom_protocol::{ErrorCode, RpcError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Key does not exist: {0}")]
    KeyNotFound(String),

    /// The stored value was not the expected one; the caller should re-read
    #[error("Precondition failed for {key}: expected {expected}, found {actual:?}")]
    PreconditionFailed {
        key: String,
        expected: i64,
        actual: Option<i64>,
    },

    #[error("Gave up on {key} after {attempts} compare-and-swap attempts")]
    RetriesExhausted { key: String, attempts: u32 },

    /// Any other failure reported by the store or its transport
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl StoreError {
    /// Wire representation used when this error is reported to a client.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            StoreError::KeyNotFound(_) => RpcError::new(ErrorCode::KeyDoesNotExist, self.to_string()),
            StoreError::PreconditionFailed { .. } => {
                RpcError::new(ErrorCode::PreconditionFailed, self.to_string())
            }
            StoreError::RetriesExhausted { .. } => {
                RpcError::new(ErrorCode::TemporarilyUnavailable, self.to_string())
            }
            StoreError::Rpc(err) => err.clone(),
        }
    }
}

/// An integer key-value store with an atomic compare-and-swap.
///
/// Implemented by the in-memory [`crate::KvStore`] and by RPC clients of an
/// external key-value service.
#[async_trait]
pub trait CasStore: Send + Sync {
    /// Current value of `key`, or `None` when the key has never been written.
    async fn read(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Unconditionally set `key` to `value`.
    async fn write(&self, key: &str, value: i64) -> StoreResult<()>;

    /// Set `key` to `new` only if it currently holds `expected`.
    ///
    /// With `create_if_missing`, an absent key is created holding `new`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: i64,
        new: i64,
        create_if_missing: bool,
    ) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_wire_codes() {
        assert_eq!(
            StoreError::KeyNotFound("k".to_string()).to_rpc_error().code,
            ErrorCode::KeyDoesNotExist
        );
        assert_eq!(
            StoreError::PreconditionFailed {
                key: "k".to_string(),
                expected: 1,
                actual: Some(2),
            }
            .to_rpc_error()
            .code,
            ErrorCode::PreconditionFailed
        );
        assert_eq!(
            StoreError::RetriesExhausted {
                key: "k".to_string(),
                attempts: 3,
            }
            .to_rpc_error()
            .code,
            ErrorCode::TemporarilyUnavailable
        );

        let passthrough = RpcError::new(ErrorCode::TxnConflict, "conflict");
        assert_eq!(
            StoreError::Rpc(passthrough.clone()).to_rpc_error(),
            passthrough
        );
    }
}
