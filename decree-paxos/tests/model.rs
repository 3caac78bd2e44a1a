//! Model-check scenarios: drive clusters of replicas through every
//! enumerated schedule of partitions and leader elections, asserting the
//! agreement property on each step.

use decree_harness::{
    CaseFailure, GeneratorBuilder, HarnessError, Partition, RunConfig, TestCase, run,
};
use decree_paxos::Cluster;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Five replicas, two partition layouts, two schedulable leaders:
/// 3 actions x 2 partitions = 6 step states.
fn five_node_builder(steps: usize) -> GeneratorBuilder {
    GeneratorBuilder::new()
        .replicas(1..=5)
        .partition(Partition::from_groups(&[&[1, 2, 3], &[4, 5]]))
        .partition(Partition::from_groups(&[&[1, 2], &[3, 4, 5]]))
        .leaders([1, 3])
        .steps(steps)
}

fn config_in(dir: &TempDir, workers: usize) -> RunConfig {
    RunConfig {
        workers,
        dir: dir.path().to_path_buf(),
        ..RunConfig::default()
    }
}

/// The canonical step function: a fresh cluster per test case, with the
/// given quorum sizes.
fn check_agreement(
    r1_majority: usize,
    r2_majority: usize,
) -> impl Fn(&mut TestCase) -> Result<(), CaseFailure> + Sync {
    move |case: &mut TestCase| {
        let cluster = Cluster::with_majorities(case.nodes(), r1_majority, r2_majority);
        cluster.run(case)?;
        Ok(())
    }
}

#[test]
fn test_agreement_over_all_short_schedules() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");

    let summary = run(
        "agreement_short",
        &RunConfig {
            dir: dir.path().to_path_buf(),
            ..RunConfig::default()
        },
        five_node_builder(5),
        check_agreement(3, 3),
    )
    .expect("intersecting quorums never disagree");

    assert_eq!(summary.cases, 6usize.pow(5));
}

/// The full-depth sweep from the original suite. Expensive: run with
/// `cargo test --release -- --ignored`.
#[test]
#[ignore = "enumerates (3*2)^9 = 10_077_696 schedules"]
fn test_agreement_over_all_full_schedules() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");

    let summary = run(
        "agreement_full",
        &RunConfig {
            dir: dir.path().to_path_buf(),
            ..RunConfig::default()
        },
        five_node_builder(9),
        check_agreement(3, 3),
    )
    .expect("intersecting quorums never disagree");

    assert_eq!(summary.cases, 6usize.pow(9));
}

#[test]
fn test_broken_quorums_fail_and_replay_identically() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");

    // Quorums of one do not intersect, so two isolated leaders can each
    // decide their own value. The sweep must find such a schedule, record
    // it, and the recording must fail the same way when replayed.
    let err = run(
        "broken_quorums",
        &config_in(&dir, 2),
        five_node_builder(4),
        check_agreement(1, 1),
    )
    .expect_err("non-intersecting quorums must disagree somewhere");
    let (failures, replay) = match err {
        HarnessError::CasesFailed { failures, replay } => (failures, replay),
        other => panic!("expected CasesFailed, got {other}"),
    };
    assert!(failures >= 1);
    let replay = replay.expect("fresh run records its failures");
    assert!(replay.exists());

    let replay_config = RunConfig {
        workers: 2,
        replay: Some(replay.clone()),
        dir: dir.path().to_path_buf(),
        ..RunConfig::default()
    };
    let err = run(
        "broken_quorums",
        &replay_config,
        five_node_builder(4),
        check_agreement(1, 1),
    )
    .expect_err("replayed schedules disagree again");
    let reported = match err {
        HarnessError::CasesFailed { replay, .. } => replay,
        other => panic!("expected CasesFailed, got {other}"),
    };
    assert_eq!(reported, Some(replay));
}

#[test]
fn test_broken_quorums_pass_when_leaders_never_interleave() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");

    // With a single schedulable leader even broken quorums cannot
    // disagree: there is only ever one decided value.
    let builder = GeneratorBuilder::new()
        .replicas(1..=5)
        .partition(Partition::from_groups(&[&[1, 2, 3], &[4, 5]]))
        .leaders([1])
        .steps(4);
    run("single_leader", &config_in(&dir, 2), builder, check_agreement(1, 1))
        .expect("one proposer cannot disagree with itself");
}

#[test]
fn test_single_replica_learns_its_own_proposal() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");

    let builder = GeneratorBuilder::new()
        .replicas([1])
        .partition(Partition::new())
        .leaders([1])
        .steps(3);
    let summary = run(
        "single_replica",
        &config_in(&dir, 2),
        builder,
        |case: &mut TestCase| {
            let mut cluster = Cluster::with_majorities(case.nodes(), 1, 1);
            let mut proposed = false;
            while let Some((partition, actions)) = case.next_step() {
                proposed = proposed || actions.is_leader(1);
                cluster.step(partition, actions).map_err(CaseFailure::from)?;
                if proposed && cluster.learned(1).is_none() {
                    return Err(CaseFailure::new("leader step did not decide"));
                }
            }
            Ok(())
        },
    )
    .expect("a lone replica always agrees with itself");

    assert_eq!(summary.cases, 2usize.pow(3));
}
