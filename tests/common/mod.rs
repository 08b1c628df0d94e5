//! Common test utilities: a node driven over in-memory pipes, with an optional
//! in-process stand-in for a Maelstrom KV service.

#![allow(dead_code)]

use std::{collections::VecDeque, sync::Once, time::Duration};

use maelstrom_mesh::KvStore;
use maelstrom_node::{Node, NodeBuilder, NodeResult};
use maelstrom_protocol::{encode_body, kv::KvPayload, Message, RpcError};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines},
    task::JoinHandle,
};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// How long to wait for a message the test expects.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::WARN.into())
                    .from_env_lossy(),
            )
            .try_init();
    });
}

/// Behaviour of the simulated KV service.
#[derive(Debug, Clone)]
pub enum KvMode {
    /// Answer from the in-memory store
    Serve,
    /// Answer every request with this error
    Fail(RpcError),
    /// Never answer
    Silent,
}

struct KvService {
    name: String,
    store: KvStore,
    mode: KvMode,
}

pub struct NodeHarness {
    pub node: Node,
    node_id: String,
    input: Option<DuplexStream>,
    output: Lines<BufReader<DuplexStream>>,
    backlog: VecDeque<Message>,
    kv: Option<KvService>,
    next_msg_id: u64,
    task: JoinHandle<NodeResult<()>>,
}

impl NodeHarness {
    pub fn start(builder: NodeBuilder) -> Self {
        init_test_logging();
        let (input, node_input) = tokio::io::duplex(64 * 1024);
        let (node_output, output) = tokio::io::duplex(64 * 1024);

        let node = builder.build(node_output);
        let runner = node.clone();
        let task = tokio::spawn(async move { runner.run(node_input).await });

        Self {
            node,
            node_id: "n1".to_string(),
            input: Some(input),
            output: BufReader::new(output).lines(),
            backlog: VecDeque::new(),
            kv: None,
            next_msg_id: 0,
            task,
        }
    }

    /// Answer requests addressed to `service` from `store`.
    pub fn with_kv(mut self, service: &str, store: KvStore) -> Self {
        self.kv = Some(KvService {
            name: service.to_string(),
            store,
            mode: KvMode::Serve,
        });
        self
    }

    pub fn set_kv_mode(&mut self, mode: KvMode) {
        if let Some(kv) = self.kv.as_mut() {
            kv.mode = mode;
        }
    }

    /// Run the init handshake and assert it succeeded.
    pub async fn init(&mut self, id: &str, node_ids: &[&str]) {
        self.node_id = id.to_string();
        let reply = self
            .request("c0", json!({"type": "init", "node_id": id, "node_ids": node_ids}))
            .await;
        assert_eq!(reply.kind(), "init_ok", "unexpected init reply: {}", reply);
    }

    pub async fn send_line(&mut self, line: &str) {
        let input = self.input.as_mut().expect("input already closed");
        input.write_all(line.as_bytes()).await.unwrap();
        input.write_all(b"\n").await.unwrap();
        input.flush().await.unwrap();
    }

    pub async fn send_message(&mut self, msg: &Message) {
        let line = msg.encode().unwrap();
        self.send_line(&line).await;
    }

    /// Deliver `body` to the node from `src`, as is.
    pub async fn send(&mut self, src: &str, body: Value) {
        let msg = Message::new(src, self.node_id.clone(), body);
        self.send_message(&msg).await;
    }

    /// Send `body` from `src` with a fresh `msg_id` and return that id.
    pub async fn send_request(&mut self, src: &str, mut body: Value) -> u64 {
        self.next_msg_id += 1;
        let msg_id = self.next_msg_id;
        body["msg_id"] = json!(msg_id);
        self.send(src, body).await;
        msg_id
    }

    /// Send a request and wait for the reply addressed back to `src`.
    pub async fn request(&mut self, src: &str, body: Value) -> Message {
        let msg_id = self.send_request(src, body).await;
        self.recv_reply(src, msg_id).await
    }

    pub async fn recv_reply(&mut self, src: &str, msg_id: u64) -> Message {
        self.recv_matching(|m| m.dest == src && m.in_reply_to() == Some(msg_id))
            .await
    }

    /// Next message from the node, KV traffic excluded.
    pub async fn recv(&mut self) -> Message {
        if let Some(msg) = self.backlog.pop_front() {
            return msg;
        }
        self.read_wire(RECV_TIMEOUT)
            .await
            .expect("no message from node before timeout")
    }

    /// First message satisfying `pred`; others are kept for later calls.
    pub async fn recv_matching<F>(&mut self, pred: F) -> Message
    where
        F: Fn(&Message) -> bool,
    {
        if let Some(pos) = self.backlog.iter().position(&pred) {
            return self.backlog.remove(pos).unwrap();
        }
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = self
                .read_wire(remaining)
                .await
                .expect("no matching message from node before timeout");
            if pred(&msg) {
                return msg;
            }
            self.backlog.push_back(msg);
        }
    }

    /// Collect everything the node sends within `wait`.
    pub async fn collect_for(&mut self, wait: Duration) -> Vec<Message> {
        let mut out: Vec<Message> = self.backlog.drain(..).collect();
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return out;
            }
            match self.read_wire(remaining).await {
                Some(msg) => out.push(msg),
                None => return out,
            }
        }
    }

    /// Close input, wait for the node to stop and return its result along
    /// with everything it wrote after the last receive.
    pub async fn finish(mut self) -> (NodeResult<()>, Vec<Message>) {
        self.input.take();
        let result = tokio::time::timeout(RECV_TIMEOUT, &mut self.task)
            .await
            .expect("node did not stop after input closed")
            .expect("node task panicked");

        // Output reaches EOF once every handle to the node is gone.
        let Self {
            node,
            mut output,
            mut backlog,
            ..
        } = self;
        drop(node);
        while let Ok(Ok(Some(line))) = tokio::time::timeout(RECV_TIMEOUT, output.next_line()).await {
            backlog.push_back(Message::decode(&line).unwrap());
        }
        (result, backlog.into_iter().collect())
    }

    /// Read the next non-KV message, answering KV requests along the way.
    /// Returns `None` on timeout or end of output.
    async fn read_wire(&mut self, wait: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let line = tokio::time::timeout_at(deadline, self.output.next_line())
                .await
                .ok()?
                .expect("read node output")?;
            let msg = Message::decode(&line).expect("node wrote a malformed line");

            let kv_reply = match &self.kv {
                Some(kv) if msg.dest == kv.name => Some(kv.answer(&msg)),
                _ => None,
            };
            match kv_reply {
                Some(Some(reply)) => self.send_message(&reply).await,
                Some(None) => {}
                None => return Some(msg),
            }
        }
    }
}

impl KvService {
    fn answer(&self, msg: &Message) -> Option<Message> {
        let in_reply_to = msg.msg_id();
        let body = match &self.mode {
            KvMode::Silent => return None,
            KvMode::Fail(err) => body_of(err, in_reply_to),
            KvMode::Serve => self.serve(msg, in_reply_to),
        };
        Some(Message::new(self.name.clone(), msg.src.clone(), body))
    }

    fn serve(&self, msg: &Message, in_reply_to: Option<u64>) -> Value {
        let key_of = |key: &Value| key.as_str().unwrap_or_default().to_string();
        match msg.payload::<KvPayload>() {
            Ok(KvPayload::Read { key }) => match self.store.get(&key_of(&key)) {
                Some(value) => body_of(&KvPayload::ReadOk { value: json!(value) }, in_reply_to),
                None => body_of(&RpcError::key_does_not_exist("key does not exist"), in_reply_to),
            },
            Ok(KvPayload::Write { key, value }) => {
                self.store.insert(key_of(&key), value.as_i64().unwrap());
                body_of(&KvPayload::WriteOk, in_reply_to)
            }
            Ok(KvPayload::Cas {
                key,
                from,
                to,
                create_if_not_exists,
            }) => match self.store.swap(
                &key_of(&key),
                from.as_i64().unwrap(),
                to.as_i64().unwrap(),
                create_if_not_exists,
            ) {
                Ok(()) => body_of(&KvPayload::CasOk, in_reply_to),
                Err(e) => body_of(&e.to_rpc_error(), in_reply_to),
            },
            _ => body_of(&RpcError::not_supported("unsupported KV request"), in_reply_to),
        }
    }
}

fn body_of<T: Serialize>(payload: &T, in_reply_to: Option<u64>) -> Value {
    encode_body(payload, None, in_reply_to).unwrap()
}

/// Error code of an error reply.
pub fn error_code_of(msg: &Message) -> i64 {
    assert_eq!(msg.kind(), "error", "expected an error reply, got {}", msg);
    msg.body["code"].as_i64().unwrap()
}
