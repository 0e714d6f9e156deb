use crate::harness::{EventRecorder, DEADLINE, SHORT};
use std::thread;
use tsk_core::{EventName, TaskId};
use tsk_testkit::TestCase;

fn run_fixture(name: &str) -> anyhow::Result<(TaskId, usize)> {
    let case = TestCase::new(name)?;
    let fixture = case.build_notification_test_workflow()?;
    let recorder = EventRecorder::attach(&case.bus());
    case.expect_workflow_event(EventName::WorkflowCompleted, &fixture.workflow, |_| true);

    fixture.workflow.start()?;
    case.wait_for_expectations(DEADLINE)?;
    Ok((fixture.sink, recorder.count(EventName::TaskFinished)))
}

#[test]
fn test_concurrent_cases_see_only_their_events() -> anyhow::Result<()> {
    let handles: Vec<_> = (0..4)
        .map(|i| thread::spawn(move || run_fixture(&format!("isolated_{i}"))))
        .collect();

    let mut sinks = Vec::new();
    for handle in handles {
        let (sink, finished) = handle.join().expect("case thread panicked")?;
        assert_eq!(finished, 4);
        sinks.push(sink);
    }
    sinks.sort();
    sinks.dedup();
    assert_eq!(sinks.len(), 4);
    Ok(())
}

#[test]
fn test_expectation_on_another_case_is_never_met() -> anyhow::Result<()> {
    let observer = TestCase::new("observer")?;
    let runner = TestCase::new("runner")?;
    assert_ne!(observer.bus().id(), runner.bus().id());

    let fixture = runner.build_notification_test_workflow()?;
    let foreign = observer.expect_event(EventName::TaskFinished, fixture.sink);
    let local = runner.expect_event(EventName::TaskFinished, fixture.sink);

    fixture.workflow.start()?;
    runner.wait_for_expectations(DEADLINE)?;
    assert!(local.is_fulfilled());
    assert!(observer.wait_for_expectations(SHORT).is_err());
    assert!(!foreign.is_fulfilled());
    Ok(())
}

#[test]
fn test_bus_is_created_once_per_case() -> anyhow::Result<()> {
    let case = TestCase::new("lazy_bus")?;
    let first = case.event_bus().id();
    assert_eq!(case.event_bus().id(), first);
    assert_eq!(case.bus().id(), first);
    Ok(())
}
