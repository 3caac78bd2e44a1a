//! Lazy enumeration of test-case schedules.
//!
//! A [`Generator`] yields every sequence of length `step_limit` over the
//! set of *step states*, where one step state pairs an [`Actions`] entry
//! with a [`Partition`]. The step-state set is the Cartesian product of
//! the configured actions and partitions tables, and the sequence space is
//! walked with a little-endian base-`|states|` counter held on the
//! generator, so `next()` is constant-memory and trivially lockable.
//!
//! Alternative sources replace the product walk: a [`ReplayReader`] feeds
//! previously recorded schedules back in, and a Bernoulli sampler thins
//! the product walk for smoke-testing.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::case::TestCase;
use crate::error::{ConfigError, ReplayError};
use crate::partition::{Actions, NodeId, Partition};
use crate::replay::ReplayReader;

/// Schedule length used when [`GeneratorBuilder::steps`] is not called.
pub const DEFAULT_STEP_LIMIT: usize = 10;

/// Upper bound on `actions x partitions`.
///
/// Step states are stored as 16-bit indices in replay records, so the
/// product must fit a non-negative `i16`.
pub const MAX_STEP_STATES: usize = i16::MAX as usize;

/// One entry of the step-state table: indices into the actions and
/// partitions tables.
#[derive(Debug, Clone, Copy)]
struct StepState {
    actions: usize,
    partition: usize,
}

/// Immutable configuration shared by the generator and every test case it
/// hands out.
#[derive(Debug)]
pub(crate) struct StateTables {
    step_limit: usize,
    nodes: Vec<NodeId>,
    partitions: Vec<Partition>,
    actions: Vec<Actions>,
    states: Vec<StepState>,
}

impl StateTables {
    pub(crate) fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Resolve a step-state index to its (partition, actions) pair.
    pub(crate) fn state(&self, index: usize) -> (&Partition, &Actions) {
        let state = &self.states[index];
        (&self.partitions[state.partition], &self.actions[state.actions])
    }
}

/// Builder for a [`Generator`].
///
/// Options mirror the shape of the state space: cluster membership, one
/// partition per call, the leader schedule, and the step limit. Membership
/// must be declared before leaders.
///
/// # Example
///
/// ```
/// use decree_harness::{GeneratorBuilder, Partition};
///
/// let generator = GeneratorBuilder::new()
///     .replicas([1, 2, 3])
///     .partition(Partition::from_groups(&[&[1, 2], &[3]]))
///     .partition(Partition::from_groups(&[&[1, 2, 3]]))
///     .leaders([1, 3])
///     .steps(4)
///     .build()
///     .expect("valid configuration");
///
/// // 3 actions (no leader, leader 1, leader 3) x 2 partitions = 6 states.
/// assert!(generator.next().is_some());
/// ```
#[derive(Debug, Default)]
pub struct GeneratorBuilder {
    nodes: Vec<NodeId>,
    partitions: Vec<Partition>,
    actions: Vec<Actions>,
    step_limit: Option<usize>,
    replay: Option<ReplayReader>,
    sample: Option<(u64, u64)>,
    leaders_before_replicas: bool,
}

impl GeneratorBuilder {
    /// Create a builder with nothing configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cluster membership.
    pub fn replicas(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.nodes = ids.into_iter().collect();
        self
    }

    /// Append one network partition to the partitions table.
    pub fn partition(mut self, partition: Partition) -> Self {
        self.partitions.push(partition);
        self
    }

    /// Declare which nodes may be scheduled as leader.
    ///
    /// Appends the "no leader" entry plus one entry per id to the actions
    /// table. The generator must see every possible cluster state at each
    /// step, so narrowing the leader set narrows the scope of the test.
    ///
    /// Must be called after [`replicas`](GeneratorBuilder::replicas);
    /// [`build`](GeneratorBuilder::build) fails otherwise.
    pub fn leaders(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        if self.nodes.is_empty() {
            self.leaders_before_replicas = true;
        }
        self.actions.push(Actions::none());
        for id in ids {
            self.actions.push(Actions::leader(id));
        }
        self
    }

    /// Set the schedule length (default [`DEFAULT_STEP_LIMIT`]).
    pub fn steps(mut self, step_limit: usize) -> Self {
        self.step_limit = Some(step_limit);
        self
    }

    /// Enumerate recorded schedules from `reader` instead of the product.
    pub fn replay(mut self, reader: ReplayReader) -> Self {
        self.replay = Some(reader);
        self
    }

    /// Thin the product enumeration down to roughly `percent` percent of
    /// cases, selected by a Bernoulli filter seeded with `seed`.
    ///
    /// Meant for local smoke-tests; ignored when a replay source is
    /// configured. `percent` must lie within `1..=100`.
    pub fn sample(mut self, percent: u64, seed: u64) -> Self {
        self.sample = Some((percent, seed));
        self
    }

    /// Validate the configuration and construct the generator.
    pub fn build(self) -> Result<Generator, ConfigError> {
        if self.leaders_before_replicas {
            return Err(ConfigError::LeadersBeforeReplicas);
        }
        if self.actions.is_empty() {
            return Err(ConfigError::MissingActions);
        }
        if self.partitions.is_empty() {
            return Err(ConfigError::MissingPartitions);
        }
        if let Some((percent, _)) = self.sample {
            if !(1..=100).contains(&percent) {
                return Err(ConfigError::InvalidPercent { got: percent });
            }
        }

        let mut states = Vec::with_capacity(self.actions.len() * self.partitions.len());
        for actions in 0..self.actions.len() {
            for partition in 0..self.partitions.len() {
                states.push(StepState { actions, partition });
            }
        }
        if states.len() > MAX_STEP_STATES {
            return Err(ConfigError::StateSpaceTooLarge {
                count: states.len(),
            });
        }

        let step_limit = self.step_limit.unwrap_or(DEFAULT_STEP_LIMIT);
        let tables = Arc::new(StateTables {
            step_limit,
            nodes: self.nodes,
            partitions: self.partitions,
            actions: self.actions,
            states,
        });

        let source = match (self.replay, self.sample) {
            (Some(reader), _) => {
                debug!(path = %reader.path().display(), "enumerating from replay");
                Source::Replay(reader)
            }
            (None, Some((percent, seed))) if percent < 100 => {
                debug!(percent, seed, "sampling the product enumeration");
                Source::Sampled {
                    product: ProductSource::new(step_limit),
                    rng: ChaCha8Rng::seed_from_u64(seed),
                    percent,
                }
            }
            (None, _) => Source::Product(ProductSource::new(step_limit)),
        };

        debug!(
            states = tables.states.len(),
            step_limit, "generator constructed"
        );
        Ok(Generator {
            tables,
            inner: Mutex::new(GenInner {
                source,
                count: 0,
                error: None,
            }),
        })
    }
}

/// The enumeration source behind a generator.
enum Source {
    /// Little-endian counter walk over the full Cartesian product.
    Product(ProductSource),
    /// Recorded schedules read back from a replay log.
    Replay(ReplayReader),
    /// Product walk thinned by a seeded Bernoulli filter.
    Sampled {
        product: ProductSource,
        rng: ChaCha8Rng,
        percent: u64,
    },
}

/// Counter state for the product enumeration.
struct ProductSource {
    counters: Vec<i16>,
    exhausted: bool,
}

impl ProductSource {
    fn new(step_limit: usize) -> Self {
        Self {
            counters: vec![0; step_limit],
            exhausted: false,
        }
    }

    /// Snapshot the counter, then increment it in little-endian
    /// base-`nstates`. Overflow of the most significant digit exhausts the
    /// source.
    fn next(&mut self, nstates: usize) -> Option<Vec<i16>> {
        if self.exhausted {
            return None;
        }
        let snapshot = self.counters.clone();
        if self.counters.is_empty() {
            self.exhausted = true;
            return Some(snapshot);
        }
        for i in (0..self.counters.len()).rev() {
            self.counters[i] += 1;
            if (self.counters[i] as usize) < nstates {
                break;
            }
            self.counters[i] = 0;
            if i == 0 {
                self.exhausted = true;
            }
        }
        Some(snapshot)
    }
}

struct GenInner {
    source: Source,
    count: usize,
    error: Option<ReplayError>,
}

/// Thread-safe enumerator of test cases.
///
/// All state lives behind one mutex, so [`next`](Generator::next) may be
/// called from any number of workers concurrently; each returned
/// [`TestCase`] owns its own counter snapshot and is independent of the
/// generator afterwards.
pub struct Generator {
    tables: Arc<StateTables>,
    inner: Mutex<GenInner>,
}

impl Generator {
    /// Produce the next test case, or `None` once the source is exhausted.
    ///
    /// In replay mode a decode failure also ends enumeration; the failure
    /// is latched and reported by [`take_error`](Generator::take_error).
    pub fn next(&self) -> Option<TestCase> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let nstates = self.tables.states.len();
        let states = match &mut inner.source {
            Source::Product(product) => product.next(nstates),
            Source::Sampled {
                product,
                rng,
                percent,
            } => loop {
                let candidate = product.next(nstates)?;
                if rng.random_range(0..100u64) < *percent {
                    break Some(candidate);
                }
            },
            Source::Replay(reader) => {
                if inner.error.is_some() {
                    None
                } else {
                    match Self::next_replayed(reader, nstates) {
                        Ok(states) => states,
                        Err(err) => {
                            inner.error = Some(err);
                            None
                        }
                    }
                }
            }
        }?;
        inner.count += 1;
        Some(TestCase::new(Arc::clone(&self.tables), states))
    }

    /// Read one record and check every index against the configured
    /// tables. A record may pass its checksum yet come from a different
    /// configuration; treat that as a decode failure rather than panicking
    /// in the step function.
    fn next_replayed(
        reader: &ReplayReader,
        nstates: usize,
    ) -> Result<Option<Vec<i16>>, ReplayError> {
        let Some(states) = reader.read()? else {
            return Ok(None);
        };
        for &index in &states {
            if index < 0 || index as usize >= nstates {
                return Err(ReplayError::UnknownState {
                    index,
                    count: nstates,
                });
            }
        }
        Ok(Some(states))
    }

    /// Total number of test cases handed out so far.
    pub fn count(&self) -> usize {
        self.lock().count
    }

    /// Take the latched enumeration error, if any.
    ///
    /// Product enumeration never fails; replay enumeration latches its
    /// first I/O or decode error and stops.
    pub fn take_error(&self) -> Option<ReplayError> {
        self.lock().error.take()
    }

    /// The configured schedule length.
    pub fn step_limit(&self) -> usize {
        self.tables.step_limit
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GenInner> {
        // A panic while holding the lock leaves the state consistent
        // enough to keep reading; recover the guard.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
