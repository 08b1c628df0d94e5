//! Internal tests module
//!
//! Concurrency properties of the gossip state and the counter that need many
//! tasks hammering shared state at once.
