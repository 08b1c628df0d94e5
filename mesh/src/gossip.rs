//! Gossip broadcast state
//!
//! Tracks which values this node has accepted and who it forwards them to.
//! A value is accepted (and fanned out) at most once; later deliveries of the
//! same value are duplicates.

use std::{
    collections::{BTreeMap, HashSet},
    hash::Hash,
};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Result of offering a value to [`GossipState::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// First delivery: forward to these neighbors
    Fresh { neighbors: Vec<String> },
    /// Already accepted earlier; nothing to forward
    Duplicate,
}

impl Acceptance {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Acceptance::Fresh { .. })
    }
}

#[derive(Debug)]
struct Accepted<V> {
    seen: HashSet<V>,
    log: Vec<V>,
}

/// Dedup set, accepted-value log and neighbor list for one node.
///
/// The seen-set and the log share a lock so that check-and-insert is atomic:
/// concurrent deliveries of one value yield exactly one [`Acceptance::Fresh`].
#[derive(Debug)]
pub struct GossipState<V> {
    accepted: Mutex<Accepted<V>>,
    neighbors: RwLock<Vec<String>>,
}

impl<V> GossipState<V>
where
    V: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            accepted: Mutex::new(Accepted {
                seen: HashSet::new(),
                log: Vec::new(),
            }),
            neighbors: RwLock::new(Vec::new()),
        }
    }

    /// Record `value` if unseen and report where it must be forwarded.
    ///
    /// The neighbor list is captured at acceptance time, so a later topology
    /// change does not affect a fan-out already decided.
    pub fn accept(&self, value: V) -> Acceptance {
        {
            let mut accepted = self.accepted.lock();
            if !accepted.seen.insert(value.clone()) {
                return Acceptance::Duplicate;
            }
            accepted.log.push(value);
        }
        Acceptance::Fresh {
            neighbors: self.neighbors.read().clone(),
        }
    }

    pub fn contains(&self, value: &V) -> bool {
        self.accepted.lock().seen.contains(value)
    }

    /// Copy of every accepted value, in acceptance order.
    pub fn snapshot(&self) -> Vec<V> {
        self.accepted.lock().log.clone()
    }

    pub fn len(&self) -> usize {
        self.accepted.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the neighbor list wholesale.
    pub fn set_neighbors(&self, neighbors: Vec<String>) {
        debug!(?neighbors, "Replacing gossip neighbors");
        *self.neighbors.write() = neighbors;
    }

    pub fn neighbors(&self) -> Vec<String> {
        self.neighbors.read().clone()
    }
}

impl<V> Default for GossipState<V>
where
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Extract this node's neighbor list from a cluster-wide topology.
pub fn neighbors_for(topology: &BTreeMap<String, Vec<String>>, node_id: &str) -> Option<Vec<String>> {
    topology.get(node_id).cloned()
}
