//! Maelstrom wire protocol definitions.
//!
//! Every message on the wire is one JSON object per line:
//! `{"src": <node>, "dest": <node>, "body": {...}}`. The body always carries a
//! `type` tag and may carry `msg_id` / `in_reply_to` for correlation. This crate
//! provides:
//! - [`Message`] and [`BodyHeader`]: the envelope and its common body fields
//! - [`RpcError`] and [`ErrorCode`]: the error body shared by every service
//! - Typed, internally tagged payload enums for each workload

pub mod broadcast;
pub mod counter;
pub mod error;
pub mod init;
pub mod kv;
pub mod message;
pub mod unique_ids;

pub use error::{ErrorCode, RpcError};
pub use message::{encode_body, BodyHeader, CodecError, Message};

/// Message type reserved for the init handshake.
pub const INIT: &str = "init";

/// Message type carried by error replies.
pub const ERROR: &str = "error";
