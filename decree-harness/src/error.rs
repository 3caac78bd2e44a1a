//! Error types for harness operations.
//!
//! Errors are split by concern: [`ConfigError`] for generator and run
//! configuration problems (always fatal, surfaced before any test case
//! executes), [`ReplayError`] for replay-log I/O and decoding, and
//! [`HarnessError`] as the top-level type returned by a run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors raised while building a [`Generator`] or parsing a
/// [`RunConfig`].
///
/// These indicate a mistake in the test setup itself and abort the run
/// before any test case executes.
///
/// [`Generator`]: crate::generator::Generator
/// [`RunConfig`]: crate::config::RunConfig
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No leader schedule was declared. Call
    /// [`GeneratorBuilder::leaders`](crate::generator::GeneratorBuilder::leaders)
    /// at least once.
    #[error("no actions configured: declare leaders before building")]
    MissingActions,

    /// No network partition was declared. Call
    /// [`GeneratorBuilder::partition`](crate::generator::GeneratorBuilder::partition)
    /// at least once.
    #[error("no partitions configured: declare at least one partition before building")]
    MissingPartitions,

    /// Leaders were declared before the cluster membership was known.
    #[error("replicas must be configured before leaders")]
    LeadersBeforeReplicas,

    /// The actions x partitions product does not fit a step-state index.
    ///
    /// Replay records store step states as 16-bit indices, so the product
    /// is capped at 32767. Reduce the number of actions or partitions.
    #[error("state space too large: {count} step states (max 32767)")]
    StateSpaceTooLarge {
        /// Number of step states the configuration would produce.
        count: usize,
    },

    /// The sampling percentage is outside `1..=100`.
    #[error("sampling percent must be within 1..=100, got {got}")]
    InvalidPercent {
        /// The rejected value.
        got: u64,
    },

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnvValue {
        /// The variable that failed to parse.
        var: &'static str,
        /// The raw value found in the environment.
        value: String,
    },
}

/// Errors raised while writing or reading a replay log.
///
/// A corrupted replay is a test-level failure, not a panic: the generator
/// latches the error and enumeration halts.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// An underlying I/O operation failed.
    #[error("replay I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file ended in the middle of a record.
    #[error("replay record truncated: expected {expected} bytes, got {got}")]
    Truncated {
        /// Bytes the record header promised.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// Checksum verification failed - the record was corrupted.
    #[error("replay checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from the record header.
        expected: u32,
        /// Checksum computed from the payload.
        actual: u32,
    },

    /// A record length field exceeds the maximum payload size.
    #[error("replay record too large: {size} bytes (max {max})")]
    TooLarge {
        /// Length claimed by the record header.
        size: u32,
        /// The maximum accepted payload size.
        max: usize,
    },

    /// The payload did not decode to a well-formed test case.
    #[error("malformed replay payload: {reason}")]
    Malformed {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A decoded step-state index does not exist in the configured tables.
    ///
    /// The record passed its checksum but was produced against a different
    /// generator configuration.
    #[error("step state index {index} out of range ({count} states configured)")]
    UnknownState {
        /// The out-of-range index.
        index: i16,
        /// Number of step states the current configuration defines.
        count: usize,
    },
}

/// Failure reported by a step function for a single test case.
///
/// Carries a human-readable description of the violated property. The
/// runner pairs it with the failing [`TestCase`](crate::TestCase) and
/// records both in the replay log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CaseFailure {
    reason: String,
}

impl CaseFailure {
    /// Create a failure from a description of the violated property.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Top-level error returned by [`run`](crate::runner::run).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The generator or run configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The replay log could not be read or written.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// One or more test cases failed.
    ///
    /// Unless the run itself was driven from a replay file, the failing
    /// cases have been written to `replay` for reproduction.
    #[error("{failures} test case(s) failed")]
    CasesFailed {
        /// Number of failures observed before the run converged.
        failures: usize,
        /// Replay log holding the failing cases.
        replay: Option<PathBuf>,
    },
}

/// A type alias for `Result<T, HarnessError>`.
pub type HarnessResult<T> = Result<T, HarnessError>;
