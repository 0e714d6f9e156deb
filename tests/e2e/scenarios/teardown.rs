use crate::harness::DEADLINE;
use std::sync::Arc;
use tsk_core::{Event, EventBus, EventName, TaskId};
use tsk_testkit::{ExpectationState, TestCase};

#[test]
fn test_late_events_after_teardown_are_dropped() -> anyhow::Result<()> {
    let mut case = TestCase::new("late_events")?;
    let bus: Arc<EventBus> = case.bus();
    let task = TaskId::new();
    let pending = case.expect_event(EventName::TaskFinished, task);
    assert_eq!(bus.subscriber_count(), 1);

    case.teardown();
    assert!(bus.is_closed());
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(pending.state(), ExpectationState::Discarded);

    assert_eq!(bus.publish(Event::task(EventName::TaskFinished, task)), 0);
    assert!(!pending.is_fulfilled());
    Ok(())
}

#[test]
fn test_teardown_is_idempotent() -> anyhow::Result<()> {
    let mut case = TestCase::new("double_teardown")?;
    let fixture = case.build_notification_test_workflow()?;
    let done = case.expect_event(EventName::TaskFinished, fixture.sink);
    fixture.workflow.start()?;
    case.wait_for_expectations(DEADLINE)?;

    case.teardown();
    case.teardown();
    assert_eq!(done.state(), ExpectationState::Fulfilled);
    assert_eq!(done.fulfillment_count(), 1);
    Ok(())
}

#[test]
fn test_dropping_a_case_closes_its_bus() -> anyhow::Result<()> {
    let bus = {
        let case = TestCase::new("dropped")?;
        case.bus()
    };
    assert!(bus.is_closed());
    Ok(())
}
