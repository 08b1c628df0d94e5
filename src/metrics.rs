//! Runtime counters for a running node.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Counters updated by the transport loop and request dispatch.
pub struct NodeMetrics {
    // Transport
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,

    // Replies to our own requests
    rpcs_sent: AtomicU64,
    replies_matched: AtomicU64,
    replies_dropped: AtomicU64,

    // Request handling
    active_handlers: AtomicU64,
    error_replies: AtomicU64,
    crashes: AtomicU64,

    // Requests handled per message type
    handled_by_kind: DashMap<String, u64>,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            rpcs_sent: AtomicU64::new(0),
            replies_matched: AtomicU64::new(0),
            replies_dropped: AtomicU64::new(0),
            active_handlers: AtomicU64::new(0),
            error_replies: AtomicU64::new(0),
            crashes: AtomicU64::new(0),
            handled_by_kind: DashMap::new(),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_sent(&self) {
        self.rpcs_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A reply found its callback.
    pub fn record_reply_matched(&self) {
        self.replies_matched.fetch_add(1, Ordering::Relaxed);
    }

    /// A reply arrived for an id with no callback (late, duplicate or unknown).
    pub fn record_reply_dropped(&self) {
        self.replies_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_start(&self, kind: &str) {
        self.active_handlers.fetch_add(1, Ordering::Relaxed);
        *self.handled_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_handler_end(&self) {
        self.active_handlers.fetch_sub(1, Ordering::Relaxed);
    }

    /// An error reply with an application code.
    pub fn record_error_reply(&self) {
        self.error_replies.fetch_add(1, Ordering::Relaxed);
    }

    /// An unclassified handler failure, reported as `crash`.
    pub fn record_crash(&self) {
        self.crashes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handled(&self, kind: &str) -> u64 {
        self.handled_by_kind.get(kind).map(|count| *count).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            rpcs_sent: self.rpcs_sent.load(Ordering::Relaxed),
            replies_matched: self.replies_matched.load(Ordering::Relaxed),
            replies_dropped: self.replies_dropped.load(Ordering::Relaxed),
            active_handlers: self.active_handlers.load(Ordering::Relaxed),
            error_replies: self.error_replies.load(Ordering::Relaxed),
            crashes: self.crashes.load(Ordering::Relaxed),
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}

/// Point-in-time copy of [`NodeMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub rpcs_sent: u64,
    pub replies_matched: u64,
    pub replies_dropped: u64,
    pub active_handlers: u64,
    pub error_replies: u64,
    pub crashes: u64,
}
