//! Minimal sharded key-value store.
//!
//! Independent storage nodes each own an in-memory map made durable by an
//! append-only log; a stateless proxy hashes keys onto a fixed node list and
//! forwards requests. Each module covers one concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for node and proxy modes.
//! - [`store`] is the concurrent in-memory map, repopulated by log replay.
//! - [`wal`] is the append-only durability log: record format, append,
//!   and lenient-or-strict replay.
//! - [`router`] maps a key to a shard index with a portable FNV-1a hash.
//! - [`node`] wires the store and log behind the node HTTP surface, with the
//!   log mutex serializing the append-then-apply write path.
//! - [`proxy`] forwards each keyed request to its shard's node and relays
//!   the response verbatim.
//!
//! Integration tests use this crate directly to run nodes and proxies
//! in-process on ephemeral ports.

pub mod cli;
pub mod node;
pub mod proxy;
pub mod router;
pub mod store;
pub mod wal;
