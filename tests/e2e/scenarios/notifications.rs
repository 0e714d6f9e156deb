use crate::harness::{EventRecorder, DEADLINE, SHORT};
use std::time::Instant;
use tsk_core::{Event, EventName, Task, TaskId, Workflow};
use tsk_testkit::{ExpectationState, HarnessError, Scope, TestCase};

#[test]
fn test_subject_filter_skips_other_tasks() -> anyhow::Result<()> {
    let case = TestCase::new("subject_filter")?;
    let x = TaskId::new();
    let y = TaskId::new();
    let expectation = case.expect_event(EventName::TaskFinished, x);

    case.bus().publish(Event::task(EventName::TaskFinished, y));
    assert_eq!(expectation.state(), ExpectationState::Pending);

    case.bus().publish(Event::task(EventName::TaskFinished, x));
    case.wait_for_expectations(DEADLINE)?;
    assert_eq!(expectation.fulfilled_by().and_then(|e| e.source_task()), Some(x));
    Ok(())
}

#[test]
fn test_subject_filter_through_engine() -> anyhow::Result<()> {
    let case = TestCase::new("subject_filter_engine")?;
    let workflow = Workflow::new("ordered", case.bus());
    let y = workflow.add_task(Task::noop("y"), &[])?;
    let x = workflow.add_task(Task::noop("x"), &[y])?;
    let recorder = EventRecorder::attach(&case.bus());

    let expectation = case.expect_event(EventName::TaskFinished, x);
    workflow.start()?;
    case.wait_for_expectations(DEADLINE)?;

    assert_eq!(expectation.fulfillment_count(), 1);
    let y_finished = recorder.position(EventName::TaskFinished, y).unwrap();
    let x_finished = recorder.position(EventName::TaskFinished, x).unwrap();
    assert!(y_finished < x_finished);
    Ok(())
}

#[test]
fn test_verification_waits_for_success_code() -> anyhow::Result<()> {
    let case = TestCase::new("verification_success_code")?;
    let task = TaskId::new();
    let expectation = case.expect_event_with(EventName::TaskFinished, Scope::Task(task), |event| {
        event.payload.result_code == Some(0)
    });

    case.bus()
        .publish(Event::task(EventName::TaskFinished, task).with_result_code(2));
    assert!(!expectation.is_fulfilled());
    assert_eq!(expectation.rejection_count(), 1);

    case.bus()
        .publish(Event::task(EventName::TaskFinished, task).with_result_code(0));
    case.wait_for_expectations(DEADLINE)?;
    assert_eq!(
        expectation.fulfilled_by().map(|e| e.payload.result_code),
        Some(Some(0))
    );
    Ok(())
}

#[test]
fn test_verification_through_engine_picks_the_sink() -> anyhow::Result<()> {
    let case = TestCase::new("verification_engine")?;
    let fixture = case.build_notification_test_workflow()?;
    let sink = fixture.sink;

    let expectation = case.expect_event_with(
        EventName::TaskFinished,
        Scope::InWorkflow(fixture.id()),
        move |event| event.source_task() == Some(sink),
    );
    fixture.workflow.start()?;
    case.wait_for_expectations(DEADLINE)?;

    assert_eq!(expectation.rejection_count(), 3);
    let result = expectation
        .fulfilled_by()
        .and_then(|e| e.payload.result)
        .unwrap();
    assert_eq!(result["task"], "sink");
    assert_eq!(result["inputs"], 2);
    Ok(())
}

#[test]
fn test_unpublished_event_times_out() {
    let case = TestCase::new("never_published").unwrap();
    let fixture = case.build_notification_test_workflow().unwrap();
    let expectation = case.expect_event(EventName::TaskFailed, fixture.root);

    fixture.workflow.start().unwrap();
    let started = Instant::now();
    let err = case.wait_for_expectations(SHORT).unwrap_err();

    assert!(started.elapsed() >= SHORT);
    assert!(started.elapsed() < DEADLINE);
    match err {
        HarnessError::ExpectationTimeout { unmet, .. } => {
            assert_eq!(unmet.len(), 1);
            assert!(unmet[0].contains("task-failed"));
            assert!(unmet[0].contains(&fixture.root.to_string()));
        }
        other => panic!("expected a timeout, got {other}"),
    }
    assert_eq!(expectation.state(), ExpectationState::TimedOut);
}

#[test]
fn test_timeout_names_only_unmet_expectations() {
    let case = TestCase::new("partial_timeout").unwrap();
    let fixture = case.build_notification_test_workflow().unwrap();
    let met = case.expect_event(EventName::TaskFinished, fixture.sink);
    let unmet = case.expect_event(EventName::TaskRetried, fixture.left);

    fixture.workflow.start().unwrap();
    let err = case.wait_for_expectations(SHORT * 5).unwrap_err();

    let message = err.to_string();
    assert!(message.contains(unmet.description()));
    assert!(!message.contains(met.description()));
    assert!(met.is_fulfilled());
}

#[test]
fn test_fulfillment_is_reported_once() -> anyhow::Result<()> {
    let case = TestCase::new("idempotent")?;
    let fixture = case.build_notification_test_workflow()?;
    let any_finish = case.expect_event_in(EventName::TaskFinished, Scope::InWorkflow(fixture.id()));
    let completed =
        case.expect_workflow_event(EventName::WorkflowCompleted, &fixture.workflow, |_| true);

    fixture.workflow.start()?;
    case.wait_for(&[any_finish.clone(), completed], DEADLINE)?;

    assert_eq!(any_finish.fulfillment_count(), 1);
    assert_eq!(
        any_finish.fulfilled_by().and_then(|e| e.source_task()),
        Some(fixture.root)
    );
    case.wait_for(&[any_finish.clone()], SHORT)?;
    assert_eq!(any_finish.fulfillment_count(), 1);
    Ok(())
}

#[test]
fn test_workflow_scope_ignores_task_events() -> anyhow::Result<()> {
    let case = TestCase::new("workflow_scope")?;
    let fixture = case.build_notification_test_workflow()?;
    let from_workflow = case.expect_event_in(EventName::TaskFinished, Scope::Workflow(fixture.id()));
    let completed = case.expect_workflow_event(EventName::WorkflowCompleted, &fixture.workflow, |event| {
        event.payload.task.is_none()
    });

    fixture.workflow.start()?;
    case.wait_for(&[completed], DEADLINE)?;
    assert_eq!(from_workflow.state(), ExpectationState::Pending);
    assert_eq!(case.awaiting_count(), 1);
    Ok(())
}
