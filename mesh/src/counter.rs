//! Grow-only counter replicated through compare-and-swap
//!
//! Each node owns exactly one key, `counter-<node_id>`, and only ever advances
//! it with a compare-and-swap against the value it last read. Nodes never write
//! each other's keys, so the only contention on a key comes from concurrent
//! adds on the owning node. The cluster total is the sum of every node's key
//! at read time.

use std::time::Duration;

use maelstrom_protocol::RpcError;
use tracing::{debug, warn};

use crate::store::{CasStore, StoreError, StoreResult};

/// Key owned by `node_id`.
pub fn counter_key(node_id: &str) -> String {
    format!("counter-{}", node_id)
}

/// How an add reacts to a lost compare-and-swap race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasRetryPolicy {
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for CasRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_millis(100),
        }
    }
}

impl CasRetryPolicy {
    /// Retry immediately and without limit.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// delay = min(base_delay * 2^(attempt-1), max_delay)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Counter view of one node over a [`CasStore`].
#[derive(Debug, Clone)]
pub struct GCounter<S> {
    store: S,
    node_id: String,
    retry: CasRetryPolicy,
}

impl<S: CasStore> GCounter<S> {
    pub fn new(store: S, node_id: impl Into<String>) -> Self {
        Self {
            store,
            node_id: node_id.into(),
            retry: CasRetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: CasRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Add `delta` to this node's key and return the committed value.
    ///
    /// Loops read → compute → compare-and-swap. A precondition failure means
    /// another add on this node won the race, so the cycle starts over; any
    /// other error ends the add without retrying.
    pub async fn add(&self, delta: i64) -> StoreResult<i64> {
        let key = counter_key(&self.node_id);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let current = self.store.read(&key).await?.unwrap_or(0);
            let next = current.checked_add(delta).ok_or_else(|| {
                StoreError::Rpc(RpcError::abort(format!(
                    "adding {} to {} overflows {}",
                    delta, current, key
                )))
            })?;

            match self.store.compare_and_swap(&key, current, next, true).await {
                Ok(()) => {
                    debug!(key = %key, from = current, to = next, attempt, "Counter add committed");
                    return Ok(next);
                }
                Err(StoreError::PreconditionFailed { actual, .. }) => {
                    if self.retry.exhausted(attempt) {
                        warn!(key = %key, attempt, "Counter add out of compare-and-swap attempts");
                        return Err(StoreError::RetriesExhausted { key, attempts: attempt });
                    }
                    let delay = self.retry.calculate_backoff(attempt);
                    debug!(
                        key = %key,
                        expected = current,
                        actual = ?actual,
                        attempt,
                        ?delay,
                        "Counter compare-and-swap lost a race, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Counter add failed");
                    return Err(e);
                }
            }
        }
    }

    /// Sum of every peer's key; keys never written count as zero.
    ///
    /// A failed read of any single key fails the whole read, and so does a
    /// total outside `i64`.
    pub async fn read<I, T>(&self, peers: I) -> StoreResult<i64>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut total: i64 = 0;
        for peer in peers {
            let key = counter_key(peer.as_ref());
            let value = self.store.read(&key).await?.unwrap_or(0);
            total = total.checked_add(value).ok_or_else(|| {
                StoreError::Rpc(RpcError::abort(format!(
                    "counter total overflows at {} ({} + {})",
                    key, total, value
                )))
            })?;
        }
        Ok(total)
    }

    /// Value of this node's own key.
    pub async fn local_value(&self) -> StoreResult<i64> {
        Ok(self
            .store
            .read(&counter_key(&self.node_id))
            .await?
            .unwrap_or(0))
    }
}
