//! # Decree Harness
//!
//! A deterministic model-checking harness for protocol state machines,
//! inspired by FoundationDB's simulation testing approach.
//!
//! The harness exhaustively enumerates schedules of per-step cluster
//! states — a network [`Partition`] paired with a leader choice
//! ([`Actions`]) — and drives a user-supplied step function through each
//! schedule on a pool of worker threads. The first failing schedule is
//! written to a checksummed replay log so the exact execution can be
//! reproduced byte for byte.
//!
//! ## Key properties
//!
//! - **Deterministic enumeration**: the schedule space is walked as a
//!   little-endian counter, so the same configuration always yields the
//!   same cases in the same order.
//! - **Reproducible failures**: failing schedules are recorded as
//!   length-prefixed, CRC32C-checked records; pointing a later run at the
//!   file re-executes exactly those schedules.
//! - **First-failure convergence**: workers report at most one failure
//!   each and the dispatcher stops pulling new cases as soon as one
//!   arrives.
//!
//! ## Getting started
//!
//! ```no_run
//! use decree_harness::{CaseFailure, GeneratorBuilder, Partition, RunConfig, run};
//!
//! let builder = GeneratorBuilder::new()
//!     .replicas([1, 2, 3])
//!     .partition(Partition::from_groups(&[&[1, 2], &[3]]))
//!     .leaders([1, 3])
//!     .steps(6);
//!
//! let config = RunConfig::from_env().expect("harness configuration");
//! run("my_property", &config, builder, |case| {
//!     while let Some((partition, actions)) = case.next_step() {
//!         // Drive the system under test one step and check its
//!         // invariants here.
//!         let _ = (partition, actions);
//!     }
//!     Ok::<(), CaseFailure>(())
//! })
//! .expect("no schedule violates the property");
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Run configuration consumed from the host test framework.
pub mod config;

/// Error types for harness operations.
pub mod error;

/// Lazy enumeration of test-case schedules.
pub mod generator;

/// Per-step cluster state: reachability and leader choice.
pub mod partition;

/// Append-only replay log of failing test cases.
pub mod replay;

/// Parallel execution of generated test cases.
pub mod runner;

mod case;

pub use case::TestCase;
pub use config::RunConfig;
pub use error::{CaseFailure, ConfigError, HarnessError, HarnessResult, ReplayError};
pub use generator::{Generator, GeneratorBuilder, DEFAULT_STEP_LIMIT, MAX_STEP_STATES};
pub use partition::{Actions, NodeId, Partition};
pub use replay::{ReplayReader, ReplayWriter};
pub use runner::{run, RunSummary};
