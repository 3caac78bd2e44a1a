//! Parallel execution of generated test cases.
//!
//! The runner binds a generator to a user step function: it pulls test
//! cases onto a bounded queue, fans them out to worker threads, and
//! converges on the first failure. Failing cases are appended to a replay
//! log so the exact execution can be reproduced, unless the run was itself
//! driven from a replay file.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::channel::bounded;
use crossbeam::select;
use tracing::{error, info};

use crate::case::TestCase;
use crate::config::{ENV_REPLAY, RunConfig};
use crate::error::{CaseFailure, HarnessError, HarnessResult};
use crate::generator::GeneratorBuilder;
use crate::replay::{ReplayReader, ReplayWriter};

/// Outcome of a run in which every test case passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Test cases executed.
    pub cases: usize,
    /// Worker threads used.
    pub workers: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} test case(s) passed on {} worker(s)",
            self.cases, self.workers
        )
    }
}

/// Execute every test case the configured generator yields.
///
/// `step` is invoked once per test case, from exactly one worker at a
/// time per case; it must not touch shared state. `name` labels the run
/// and names the replay file written on failure
/// (`<name>-<unix_nanos>.test` under `config.dir`).
///
/// The dispatch loop stops pulling new cases at the first failure; workers
/// finish their current case and exit, and every failure that raced in is
/// still recorded. When `config.replay` is set the generator replays the
/// recorded schedules instead of enumerating, and nothing is rewritten.
///
/// # Errors
///
/// [`HarnessError::Config`] for invalid configuration,
/// [`HarnessError::Replay`] for replay I/O problems, and
/// [`HarnessError::CasesFailed`] when the step function reported failures.
pub fn run<F>(
    name: &str,
    config: &RunConfig,
    mut builder: GeneratorBuilder,
    step: F,
) -> HarnessResult<RunSummary>
where
    F: Fn(&mut TestCase) -> Result<(), CaseFailure> + Sync,
{
    let mut sink = match &config.replay {
        Some(path) => {
            let reader = ReplayReader::open(path)?;
            builder = builder.replay(reader);
            FailureSink::existing(path.clone())
        }
        None => {
            if config.percent < 100 {
                builder = builder.sample(config.percent, config.seed);
            }
            FailureSink::fresh(replay_path(name, config))
        }
    };

    let generator = builder.build()?;
    let workers = config.workers.max(1);
    info!("🌱 running {name} on {workers} worker(s)");

    // Both channels are bounded by the worker count: a worker sends at
    // most one failure, so no send can ever block indefinitely.
    let (case_tx, case_rx) = bounded::<TestCase>(workers);
    let (failure_tx, failure_rx) = bounded::<(CaseFailure, TestCase)>(workers);

    thread::scope(|scope| -> HarnessResult<()> {
        for _ in 0..workers {
            let case_rx = case_rx.clone();
            let failure_tx = failure_tx.clone();
            let step = &step;
            scope.spawn(move || {
                for mut case in case_rx.iter() {
                    if let Err(failure) = step(&mut case) {
                        // One failure per worker, then exit: the failure
                        // channel has exactly `workers` slots, so this
                        // send cannot deadlock the dispatcher.
                        let _ = failure_tx.send((failure, case));
                        return;
                    }
                }
            });
        }
        drop(case_rx);
        drop(failure_tx);

        while let Some(case) = generator.next() {
            select! {
                send(case_tx, case) -> enqueued => {
                    if enqueued.is_err() {
                        // Every worker has exited; their failures are
                        // drained below.
                        break;
                    }
                }
                recv(failure_rx) -> received => {
                    if let Ok((failure, case)) = received {
                        sink.record(failure, case)?;
                    }
                    break;
                }
            }
        }
        drop(case_tx);
        Ok(())
    })?;

    // Workers are joined; drain failures that raced with shutdown so
    // every independent failure lands in the replay log.
    for (failure, case) in failure_rx.try_iter() {
        sink.record(failure, case)?;
    }

    if let Some(err) = generator.take_error() {
        return Err(err.into());
    }

    let cases = generator.count();
    sink.finish(name, cases, workers)
}

/// Derive the replay file path for a fresh run.
fn replay_path(name: &str, config: &RunConfig) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    config.dir.join(format!("{name}-{nanos}.test"))
}

/// Collects failures and owns the replay-writer lifecycle.
///
/// The writer is created lazily on the first failure so a clean run never
/// touches the filesystem. When the run was launched from a replay file
/// nothing is rewritten; the source file already records the cases.
struct FailureSink {
    path: PathBuf,
    existing: bool,
    writer: Option<ReplayWriter>,
    failures: usize,
}

impl FailureSink {
    fn fresh(path: PathBuf) -> Self {
        Self {
            path,
            existing: false,
            writer: None,
            failures: 0,
        }
    }

    fn existing(path: PathBuf) -> Self {
        Self {
            path,
            existing: true,
            writer: None,
            failures: 0,
        }
    }

    fn record(&mut self, failure: CaseFailure, case: TestCase) -> HarnessResult<()> {
        self.failures += 1;
        error!("❌ test case failed: {failure}\n{case}");
        if self.existing {
            return Ok(());
        }
        if self.writer.is_none() {
            self.writer = Some(ReplayWriter::create(&self.path)?);
        }
        if let Some(writer) = &self.writer {
            writer.append(&case)?;
        }
        Ok(())
    }

    fn finish(self, name: &str, cases: usize, workers: usize) -> HarnessResult<RunSummary> {
        if self.failures == 0 {
            let summary = RunSummary { cases, workers };
            info!("✅ {name}: {summary}");
            return Ok(summary);
        }
        if let Some(writer) = self.writer {
            writer.close()?;
        }
        error!(
            "replay the failed run with: {ENV_REPLAY}={} cargo test {name}",
            self.path.display()
        );
        Err(HarnessError::CasesFailed {
            failures: self.failures,
            replay: Some(self.path),
        })
    }
}
