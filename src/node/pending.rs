//! Pending reply callbacks keyed by correlation id.

use std::collections::HashMap;

use futures::future::BoxFuture;
use maelstrom_protocol::Message;
use parking_lot::Mutex;

use crate::error::NodeResult;

/// Continuation run once, on its own task, when the matching reply arrives.
pub type ReplyCallback = Box<dyn FnOnce(Message) -> BoxFuture<'static, NodeResult<()>> + Send>;

struct PendingTable {
    last_msg_id: u64,
    callbacks: HashMap<u64, ReplyCallback>,
}

/// Correlation table for outstanding requests.
///
/// Ids are allocated and callbacks registered under one lock, so ids are
/// strictly increasing, never reused, and a reply can never observe an id
/// before its callback exists.
pub struct PendingCallbacks {
    inner: Mutex<PendingTable>,
}

impl PendingCallbacks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PendingTable {
                last_msg_id: 0,
                callbacks: HashMap::new(),
            }),
        }
    }

    /// Allocate the next `msg_id` and register `callback` under it.
    pub fn register(&self, callback: ReplyCallback) -> u64 {
        let mut table = self.inner.lock();
        table.last_msg_id += 1;
        let msg_id = table.last_msg_id;
        table.callbacks.insert(msg_id, callback);
        msg_id
    }

    /// Remove and return the callback for `msg_id`. Returns `None` for unknown
    /// ids and for ids whose callback was already taken.
    pub fn take(&self, msg_id: u64) -> Option<ReplyCallback> {
        self.inner.lock().callbacks.remove(&msg_id)
    }

    /// Drop the callback for a request that never made it onto the wire.
    pub fn cancel(&self, msg_id: u64) -> bool {
        self.take(msg_id).is_some()
    }

    pub fn contains(&self, msg_id: u64) -> bool {
        self.inner.lock().callbacks.contains_key(&msg_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures::FutureExt;
    use serde_json::json;

    use super::*;
    use crate::error::NodeError;

    fn counting_callback(calls: Arc<AtomicUsize>) -> ReplyCallback {
        Box::new(move |_msg| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, NodeError>(())
            }
            .boxed()
        })
    }

    #[test]
    fn test_ids_strictly_increase() {
        let pending = PendingCallbacks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let ids: Vec<u64> = (0..5)
            .map(|_| pending.register(counting_callback(calls.clone())))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        // Taking callbacks never frees ids for reuse.
        pending.take(5);
        assert_eq!(pending.register(counting_callback(calls)), 6);
    }

    #[tokio::test]
    async fn test_take_is_exactly_once() {
        let pending = PendingCallbacks::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = pending.register(counting_callback(calls.clone()));

        let callback = pending.take(id).unwrap();
        assert!(pending.take(id).is_none());
        assert!(pending.is_empty());

        callback(Message::new("n2", "n1", json!({"type": "echo_ok", "in_reply_to": id})))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_and_cancelled_ids() {
        let pending = PendingCallbacks::new();
        assert!(pending.take(42).is_none());

        let id = pending.register(counting_callback(Arc::new(AtomicUsize::new(0))));
        assert!(pending.contains(id));
        assert!(pending.cancel(id));
        assert!(!pending.cancel(id));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_concurrent_registration_yields_unique_ids() {
        let pending = Arc::new(PendingCallbacks::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pending = pending.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| pending.register(counting_callback(calls.clone())))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 2000);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&2000));
    }
}
