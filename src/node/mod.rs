//! Node runtime: identity, handler dispatch, request/response correlation and
//! the input loop.
//!
//! A [`Node`] is a cheap handle over shared state. Handlers receive a clone and
//! may send, reply and issue RPCs concurrently with each other; every incoming
//! request runs on its own task.

mod handler;
mod pending;
mod transport;

use std::{
    fmt,
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use futures::FutureExt;
use maelstrom_protocol::{encode_body, init::InitPayload, Message, RpcError, INIT};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader},
    sync::oneshot,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::{
    handler::{Handler, HandlerRegistry},
    pending::{PendingCallbacks, ReplyCallback},
    transport::OutputSink,
};
use crate::{
    error::{NodeError, NodeResult},
    metrics::NodeMetrics,
};

/// Default deadline for [`Node::call`].
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(1000);

/// Cluster identity assigned by `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    /// Every node in the cluster, this one included
    pub peer_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub rpc_timeout: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

/// Collects handlers and options before the node starts reading input.
#[derive(Debug, Default)]
pub struct NodeBuilder {
    handlers: HandlerRegistry,
    options: NodeOptions,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: NodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.options.rpc_timeout = timeout;
        self
    }

    /// Register `handler` for messages of type `kind`.
    ///
    /// A handler registered for `init` runs after the node has adopted its
    /// identity and before `init_ok` is sent.
    pub fn handle<H: Handler>(self, kind: impl Into<String>, handler: H) -> NodeResult<Self> {
        self.handle_shared(kind, Arc::new(handler))
    }

    /// Register one shared handler instance, typically for several types.
    pub fn handle_shared(
        mut self,
        kind: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> NodeResult<Self> {
        self.handlers.register(kind, handler)?;
        Ok(self)
    }

    pub fn build<W>(self, output: W) -> Node
    where
        W: AsyncWrite + Send + 'static,
    {
        Node {
            inner: Arc::new(NodeInner {
                identity: OnceLock::new(),
                handlers: self.handlers,
                pending: PendingCallbacks::new(),
                output: OutputSink::new(output),
                options: self.options,
                metrics: NodeMetrics::new(),
            }),
        }
    }
}

struct NodeInner {
    identity: OnceLock<NodeIdentity>,
    handlers: HandlerRegistry,
    pending: PendingCallbacks,
    output: OutputSink,
    options: NodeOptions,
    metrics: NodeMetrics,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

enum Route {
    Init,
    Handler(Arc<dyn Handler>),
}

impl Node {
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    /// Adopt a cluster identity. Only the first call succeeds.
    pub fn init(&self, id: impl Into<String>, peer_ids: Vec<String>) -> NodeResult<()> {
        let identity = NodeIdentity {
            id: id.into(),
            peer_ids,
        };
        self.inner.identity.set(identity).map_err(|_| {
            let current = self
                .inner
                .identity
                .get()
                .map(|identity| identity.id.clone())
                .unwrap_or_default();
            NodeError::AlreadyInitialized(current)
        })
    }

    pub fn identity(&self) -> NodeResult<&NodeIdentity> {
        self.inner.identity.get().ok_or(NodeError::NotInitialized)
    }

    pub fn id(&self) -> NodeResult<&str> {
        Ok(self.identity()?.id.as_str())
    }

    pub fn peer_ids(&self) -> NodeResult<&[String]> {
        Ok(self.identity()?.peer_ids.as_slice())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.identity.get().is_some()
    }

    pub fn options(&self) -> &NodeOptions {
        &self.inner.options
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.inner.metrics
    }

    /// Number of RPCs still waiting for a reply.
    pub fn pending_rpcs(&self) -> usize {
        self.inner.pending.len()
    }

    /// Fire-and-forget message with no correlation id.
    pub async fn send<T: Serialize + ?Sized>(&self, dest: &str, body: &T) -> NodeResult<()> {
        let body = encode_body(body, None, None)?;
        self.send_body(dest, body).await
    }

    /// Answer `request`, stamping `in_reply_to` with its `msg_id`.
    ///
    /// Requests that carry no `msg_id` expect no answer and get none.
    pub async fn reply<T: Serialize + ?Sized>(&self, request: &Message, body: &T) -> NodeResult<()> {
        let Some(msg_id) = request.msg_id() else {
            debug!(src = %request.src, kind = request.kind(), "Request has no msg_id, not replying");
            return Ok(());
        };
        let body = encode_body(body, None, Some(msg_id))?;
        self.send_body(&request.src, body).await
    }

    /// Send a request and run `callback` on its own task when the reply
    /// arrives. Returns the allocated `msg_id`.
    ///
    /// The callback runs at most once. If no reply ever arrives it never runs;
    /// there is no timeout at this level.
    pub async fn rpc<T, F, Fut>(&self, dest: &str, body: &T, callback: F) -> NodeResult<u64>
    where
        T: Serialize + ?Sized,
        F: FnOnce(Message) -> Fut + Send + 'static,
        Fut: Future<Output = NodeResult<()>> + Send + 'static,
    {
        let callback: ReplyCallback = Box::new(move |reply| callback(reply).boxed());
        let msg_id = self.inner.pending.register(callback);

        let body = match encode_body(body, Some(msg_id), None) {
            Ok(body) => body,
            Err(e) => {
                self.inner.pending.cancel(msg_id);
                return Err(e.into());
            }
        };
        if let Err(e) = self.send_body(dest, body).await {
            self.inner.pending.cancel(msg_id);
            return Err(e);
        }

        self.inner.metrics.record_rpc_sent();
        Ok(msg_id)
    }

    /// Send a request and wait for its reply, bounded by the configured RPC
    /// timeout. Error replies come back as [`NodeError::Rpc`].
    pub async fn call<T: Serialize + ?Sized>(&self, dest: &str, body: &T) -> NodeResult<Message> {
        self.call_with_timeout(dest, body, self.inner.options.rpc_timeout)
            .await
    }

    pub async fn call_with_timeout<T: Serialize + ?Sized>(
        &self,
        dest: &str,
        body: &T,
        timeout: Duration,
    ) -> NodeResult<Message> {
        let waiting = self.await_reply(dest, body, std::future::pending());
        match tokio::time::timeout(timeout, waiting).await {
            Ok(result) => result,
            Err(_) => {
                debug!(dest, ?timeout, "RPC timed out");
                Err(NodeError::Timeout {
                    dest: dest.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Send a request and wait for its reply until `cancel` fires.
    ///
    /// Giving up does not retract the request: a reply arriving later still
    /// consumes the registered callback, which then discards it.
    pub async fn call_until<T: Serialize + ?Sized>(
        &self,
        dest: &str,
        body: &T,
        cancel: &CancellationToken,
    ) -> NodeResult<Message> {
        self.await_reply(dest, body, cancel.cancelled()).await
    }

    /// Register a rendezvous for the reply and wait on it, or on `cancel`.
    async fn await_reply<T, C>(&self, dest: &str, body: &T, cancel: C) -> NodeResult<Message>
    where
        T: Serialize + ?Sized,
        C: Future<Output = ()>,
    {
        let (tx, rx) = oneshot::channel();
        self.rpc(dest, body, move |reply| async move {
            // The caller may have stopped waiting.
            let _ = tx.send(reply);
            Ok::<_, NodeError>(())
        })
        .await?;

        let reply = tokio::select! {
            biased;
            reply = rx => reply.map_err(|_| NodeError::Cancelled(dest.to_string()))?,
            _ = cancel => {
                debug!(dest, "RPC cancelled");
                return Err(NodeError::Cancelled(dest.to_string()));
            }
        };

        match reply.rpc_error() {
            Some(err) => Err(err.into()),
            None => Ok(reply),
        }
    }

    async fn send_body(&self, dest: &str, body: Value) -> NodeResult<()> {
        let src = self
            .inner
            .identity
            .get()
            .map(|identity| identity.id.clone())
            .unwrap_or_default();
        let msg = Message::new(src, dest, body);
        debug!(dest, body = %msg.body, "Sending");

        match self.inner.output.write_message(&msg).await {
            Ok(()) => {
                self.inner.metrics.record_sent();
                Ok(())
            }
            Err(e) => {
                self.inner.metrics.record_send_failure();
                Err(e)
            }
        }
    }

    /// Read messages from `input` until it ends, dispatching each on its own
    /// task. Returns once every in-flight handler and callback has finished.
    ///
    /// Malformed input and requests with no registered handler are fatal and
    /// end the loop with an error; in-flight tasks are aborted.
    pub async fn run<R>(&self, input: R) -> NodeResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(input).lines();
        let mut tasks: JoinSet<()> = JoinSet::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let msg = match Message::decode(line) {
                Ok(msg) => msg,
                Err(e) => {
                    error!(error = %e, line, "Malformed input");
                    return Err(e.into());
                }
            };
            self.inner.metrics.record_received();
            debug!(src = %msg.src, body = %msg.body, "Received");

            if let Some(reply_to) = msg.in_reply_to() {
                match self.inner.pending.take(reply_to) {
                    Some(callback) => {
                        self.inner.metrics.record_reply_matched();
                        tasks.spawn(async move {
                            if let Err(e) = callback(msg).await {
                                warn!(in_reply_to = reply_to, error = %e, "Reply callback failed");
                            }
                        });
                    }
                    None => {
                        self.inner.metrics.record_reply_dropped();
                        debug!(in_reply_to = reply_to, src = %msg.src, "Ignoring reply with no pending callback");
                    }
                }
            } else {
                let route = if msg.kind() == INIT {
                    Route::Init
                } else if let Some(handler) = self.inner.handlers.get(msg.kind()) {
                    Route::Handler(handler)
                } else {
                    error!(kind = msg.kind(), line, "No handler for message type");
                    return Err(NodeError::NoHandler {
                        kind: msg.kind().to_string(),
                        line: line.to_string(),
                    });
                };

                let node = self.clone();
                tasks.spawn(async move { node.dispatch(route, msg).await });
            }

            while let Some(joined) = tasks.try_join_next() {
                log_join_result(joined);
            }
        }

        debug!(in_flight = tasks.len(), "Input closed, waiting for in-flight tasks");
        while let Some(joined) = tasks.join_next().await {
            log_join_result(joined);
        }
        info!(metrics = ?self.inner.metrics.snapshot(), "Node stopped");
        Ok(())
    }

    async fn dispatch(self, route: Route, msg: Message) {
        let kind = msg.kind().to_string();
        self.inner.metrics.record_handler_start(&kind);

        let result = match route {
            Route::Init => self.handle_init(&msg).await,
            Route::Handler(handler) => handler.handle(self.clone(), msg.clone()).await,
        };
        self.inner.metrics.record_handler_end();

        let Err(err) = result else {
            return;
        };
        let reply = match err.rpc_error() {
            Some(reply) => {
                self.inner.metrics.record_error_reply();
                debug!(kind = %kind, src = %msg.src, error = %reply, "Handler returned an error");
                reply
            }
            None => {
                self.inner.metrics.record_crash();
                error!(kind = %kind, src = %msg.src, error = %err, "Handler failed");
                RpcError::crash(err.to_string())
            }
        };
        if let Err(e) = self.reply(&msg, &reply).await {
            error!(kind = %kind, error = %e, "Failed to send error reply");
        }
    }

    async fn handle_init(&self, msg: &Message) -> NodeResult<()> {
        let InitPayload::Init { node_id, node_ids } = msg.payload::<InitPayload>()? else {
            return Err(RpcError::malformed_request("expected an init request").into());
        };
        self.init(node_id, node_ids)?;

        if let Some(handler) = self.inner.handlers.get(INIT) {
            handler.handle(self.clone(), msg.clone()).await?;
        }

        let identity = self.identity()?;
        info!(id = %identity.id, peers = identity.peer_ids.len(), "Node initialized");
        self.reply(msg, &InitPayload::InitOk).await
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.inner.identity.get())
            .field("handlers", &self.inner.handlers)
            .field("options", &self.inner.options)
            .field("pending_rpcs", &self.inner.pending.len())
            .finish()
    }
}

fn log_join_result(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Message task panicked");
        }
    }
}
