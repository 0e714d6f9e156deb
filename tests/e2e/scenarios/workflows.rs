use crate::harness::{tasks, EventRecorder, DEADLINE, SHORT};
use serde_json::json;
use std::time::Duration;
use tsk_core::{EventName, Task, TaskState, Workflow};
use tsk_testkit::{ExpectationState, Scope, TestCase};

#[test]
fn test_diamond_fans_out_then_in() -> anyhow::Result<()> {
    let case = TestCase::new("diamond_order")?;
    let fixture = case.build_notification_test_workflow()?;
    let recorder = EventRecorder::attach(&case.bus());
    case.expect_workflow_event(EventName::WorkflowCompleted, &fixture.workflow, |_| true);

    fixture.workflow.start()?;
    case.wait_for_expectations(DEADLINE)?;

    let at = |name, task| recorder.position(name, task).unwrap();
    let root_done = at(EventName::TaskFinished, fixture.root);
    for branch in [fixture.left, fixture.right] {
        assert!(root_done < at(EventName::TaskStarted, branch));
        assert!(at(EventName::TaskFinished, branch) < at(EventName::TaskStarted, fixture.sink));
    }

    let events = recorder.events();
    assert_eq!(events.first().map(|e| e.name), Some(EventName::WorkflowStarted));
    assert_eq!(events.last().map(|e| e.name), Some(EventName::WorkflowCompleted));
    assert_eq!(recorder.count(EventName::TaskFinished), 4);
    for id in fixture.task_ids() {
        assert_eq!(fixture.workflow.task_state(id), Some(TaskState::Finished));
    }
    Ok(())
}

#[test]
fn test_failed_task_is_retried_to_completion() -> anyhow::Result<()> {
    let case = TestCase::new("retry")?;
    let workflow = Workflow::new("retry", case.bus());
    let flaky = workflow.add_task(tasks::flaky("flaky", 1, 3), &[])?;
    let after = workflow.add_task(Task::noop("after"), &[flaky])?;
    let recorder = EventRecorder::attach(&case.bus());

    let failed = case.expect_event_with(EventName::TaskFailed, Scope::Task(flaky), |event| {
        event.payload.result_code == Some(3)
    });
    let reported = case.expect_workflow_event(EventName::WorkflowTaskFailed, &workflow, move |event| {
        event.payload.task == Some(flaky)
    });
    workflow.start()?;
    case.wait_for_expectations(DEADLINE)?;
    assert!(failed.is_fulfilled() && reported.is_fulfilled());
    assert_eq!(workflow.task_state(after), Some(TaskState::Pending));

    let completed = case.expect_workflow_event(EventName::WorkflowCompleted, &workflow, |_| true);
    workflow.retry_task(flaky)?;
    case.wait_for(&[completed], DEADLINE)?;

    assert_eq!(
        recorder.names_for(flaky),
        vec![
            EventName::TaskStarted,
            EventName::TaskFailed,
            EventName::TaskRetried,
            EventName::TaskStarted,
            EventName::TaskFinished,
        ]
    );
    assert_eq!(workflow.task_result(flaky).map(|v| v["attempt"].clone()), Some(json!(2)));
    assert_eq!(workflow.task_state(after), Some(TaskState::Finished));
    Ok(())
}

#[test]
fn test_cancel_reports_every_open_task() -> anyhow::Result<()> {
    let case = TestCase::new("cancel")?;
    let workflow = Workflow::new("cancel", case.bus());
    let slow = workflow.add_task(tasks::slow("slow", Duration::from_millis(200)), &[])?;
    let blocked = workflow.add_task(Task::noop("blocked"), &[slow])?;

    let started = case.expect_event(EventName::TaskStarted, slow);
    workflow.start()?;
    case.wait_for(&[started], DEADLINE)?;

    let cancelled: Vec<_> = [slow, blocked]
        .into_iter()
        .map(|id| case.expect_event(EventName::TaskCancelled, id))
        .collect();
    let reported = case.expect_workflow_event(EventName::WorkflowTaskCancelled, &workflow, move |event| {
        event.payload.task == Some(blocked)
    });
    workflow.cancel();
    case.wait_for_expectations(DEADLINE)?;
    assert!(cancelled.iter().all(|e| e.is_fulfilled()) && reported.is_fulfilled());

    let finished = case.expect_event(EventName::TaskFinished, slow);
    assert!(case.wait_for(&[finished.clone()], SHORT * 4).is_err());
    assert_eq!(finished.state(), ExpectationState::TimedOut);
    assert_eq!(workflow.task_state(slow), Some(TaskState::Cancelled));
    assert!(!workflow.is_finished());
    Ok(())
}

#[test]
fn test_default_bus_workflow_stays_off_the_test_bus() -> anyhow::Result<()> {
    let case = TestCase::new("default_bus")?;
    let recorder = EventRecorder::attach(&case.bus());
    let workflow = Workflow::with_default_bus("process-wide");
    let solo = workflow.add_task(Task::noop("solo"), &[])?;

    let observer = EventRecorder::attach(workflow.bus());
    workflow.start()?;
    for _ in 0..500 {
        if observer.position(EventName::TaskFinished, solo).is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let reached = observer.position(EventName::TaskFinished, solo).is_some();
    assert!(observer.detach(workflow.bus()));
    assert!(!observer.detach(workflow.bus()));

    assert!(reached);
    assert!(recorder.events().is_empty());
    Ok(())
}
