//! # Decree Paxos
//!
//! A single-decree Paxos state machine built to be model-checked.
//!
//! The crate deliberately contains no I/O: a [`Replica`] is a pure state
//! machine whose only outputs are the messages in its outbox, which makes
//! every execution a deterministic function of the schedule driving it.
//! The [`Cluster`] driver executes one such schedule — proposing for
//! scheduled leaders, routing messages through the step's network
//! partition, and delaying whatever the partition blocks — and asserts
//! the protocol's safety properties after every step.
//!
//! Exhaustive checking over all schedules of partitions and leader
//! elections is provided by `decree-harness`; see `tests/model.rs` for
//! the end-to-end setup.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Canonical cluster driver for model-checked runs.
pub mod cluster;

/// The four Paxos message kinds and their common envelope.
pub mod message;

/// The single-decree Paxos replica state machine.
pub mod replica;

/// Core protocol types.
pub mod types;

pub use cluster::{Cluster, SafetyViolation};
pub use message::{Message, MessageKind};
pub use replica::Replica;
pub use types::{Ballot, NodeId, Value};
