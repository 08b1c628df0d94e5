//! Broadcast workload payloads.

use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A broadcast value as it travels on the wire.
///
/// Identity is numeric: `1`, `1.0` and `1e0` are the same value. The wire
/// text of whichever representation arrived first is kept for reads and
/// forwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastValue(Number);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ValueKey {
    Int(i128),
    Float(u64),
}

/// Integral values below this magnitude fold into [`ValueKey::Int`].
const INTEGRAL_LIMIT: f64 = 1e38;

impl BroadcastValue {
    pub fn as_number(&self) -> &Number {
        &self.0
    }

    fn key(&self) -> ValueKey {
        if let Some(i) = self.0.as_i64() {
            return ValueKey::Int(i128::from(i));
        }
        if let Some(u) = self.0.as_u64() {
            return ValueKey::Int(i128::from(u));
        }
        let f = self.0.as_f64().unwrap_or(f64::NAN);
        if f.fract() == 0.0 && f.abs() < INTEGRAL_LIMIT {
            ValueKey::Int(f as i128)
        } else {
            ValueKey::Float(f.to_bits())
        }
    }
}

impl PartialEq for BroadcastValue {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BroadcastValue {}

impl Hash for BroadcastValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for BroadcastValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Number> for BroadcastValue {
    fn from(n: Number) -> Self {
        Self(n)
    }
}

impl From<i64> for BroadcastValue {
    fn from(n: i64) -> Self {
        Self(Number::from(n))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastPayload {
    /// Accept a value and gossip it to this node's neighbors
    Broadcast { message: BroadcastValue },
    BroadcastOk,
    /// Return every value this node has accepted
    Read,
    ReadOk { messages: Vec<BroadcastValue> },
    /// Neighbor assignment for every node in the cluster
    Topology {
        topology: BTreeMap<String, Vec<String>>,
    },
    TopologyOk,
}
