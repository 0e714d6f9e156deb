use crate::harness::DEADLINE;
use rand::Rng;
use tsk_core::EventName;
use tsk_testkit::{HarnessConfig, ProcessEntropy, TestCase, TestSeed};

fn draws(case: &mut TestCase<'_>, n: usize) -> Vec<u64> {
    (0..n).map(|_| case.rng().gen()).collect()
}

#[test]
fn test_second_seed_takes_over_the_generator() -> anyhow::Result<()> {
    let mut case = TestCase::new("seed_takeover")?;
    let first = case.seed();
    let second = case.begin_test_seed();

    assert_ne!(first, second);
    assert_eq!(case.seed_history(), &[first, second]);

    let observed = draws(&mut case, 16);
    let mut replay = TestCase::new("seed_takeover_replay")?;
    replay.reseed(second);
    assert_eq!(draws(&mut replay, 16), observed);

    replay.reseed(first);
    assert_ne!(draws(&mut replay, 16), observed);
    Ok(())
}

#[test]
fn test_logged_seed_reproduces_random_workflow() -> anyhow::Result<()> {
    let mut first_run = TestCase::new("random_workflow")?;
    let logged: TestSeed = first_run.seed().to_string().parse()?;
    let (shape, workflow) = first_run.build_random_workflow(8)?;
    let name = first_run.random_name("fixture");

    let mut rerun = TestCase::new("random_workflow_rerun")?;
    rerun.reseed(logged);
    let (replayed_shape, _) = rerun.build_random_workflow(8)?;
    assert_eq!(replayed_shape, shape);
    assert_eq!(rerun.random_name("fixture"), name);

    let completed =
        first_run.expect_workflow_event(EventName::WorkflowCompleted, &workflow, |_| true);
    workflow.start()?;
    first_run.wait_for(&[completed], DEADLINE)?;
    assert!(workflow.is_finished());
    assert_eq!(workflow.task_ids().len(), shape.len());
    Ok(())
}

#[test]
fn test_configured_replay_seed_applies_to_first_seed_only() {
    let entropy = ProcessEntropy::from_seed(7);
    let mut config = HarnessConfig::default();
    config.seed.replay = Some(4242);

    let mut case = TestCase::with_entropy("configured_replay", &entropy, config);
    assert_eq!(case.seed(), TestSeed::new(4242));

    let next = case.begin_test_seed();
    assert_ne!(next, TestSeed::new(4242));
    assert_eq!(entropy.draws(), 1);
}

#[test]
fn test_cases_on_one_entropy_get_distinct_seeds() {
    let entropy = ProcessEntropy::from_seed(99);
    let a = TestCase::with_entropy("distinct_a", &entropy, HarnessConfig::default());
    let b = TestCase::with_entropy("distinct_b", &entropy, HarnessConfig::default());

    assert_ne!(a.seed(), b.seed());
    assert_eq!(entropy.draws(), 2);
}
