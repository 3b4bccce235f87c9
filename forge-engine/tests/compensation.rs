//! Integration tests for the failure path: reverse compensation,
//! restore-failure policy, cancellation, timeouts, and the ordering
//! invariant under arbitrary prefix lengths.

use forge_core::test_utils::{ProbeOperation, RecordingObserver};
use forge_core::*;
use forge_engine::Smith;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn observed_smith(observer: &Arc<RecordingObserver>) -> Smith {
    Smith::new()
        .observe_workflow(Arc::clone(observer) as Arc<dyn WorkflowObserver>)
        .observe_compensation(Arc::clone(observer) as Arc<dyn CompensationObserver>)
        .observe_operations(Arc::clone(observer) as Arc<dyn OperationObserver>)
}

/// A, B succeed (journalled); C fails with "boom".
fn saga_fixture(
    journal: &Arc<Mutex<Vec<String>>>,
) -> (Arc<ProbeOperation>, Arc<ProbeOperation>, Arc<Workflow>) {
    let a = Arc::new(
        ProbeOperation::new("A")
            .with_output(json!("a"))
            .with_journal(Arc::clone(journal)),
    );
    let b = Arc::new(
        ProbeOperation::new("B")
            .with_output(json!("b"))
            .with_journal(Arc::clone(journal)),
    );
    let workflow = Arc::new(
        WorkflowBuilder::new("saga")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation_arc(Arc::clone(&b) as Arc<dyn Operation>)
            .operation_fn("C", |_, _, _| {
                Box::pin(async { Err(OperationError::Failed("boom".into())) })
            })
            .build()
            .unwrap(),
    );
    (a, b, workflow)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reverse compensation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn failure_triggers_reverse_compensation() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let (a, b, workflow) = saga_fixture(&journal);
    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer);

    let result = smith.execute(&workflow, &CancellationToken::new()).await;

    let Err(SmithError::Operation(failure)) = result else {
        panic!("expected a wrapped operation failure");
    };
    assert_eq!(failure.operation_name, "C");
    assert_eq!(failure.source.to_string(), "boom");
    assert!(!failure.execution_id.as_str().is_empty());
    assert_eq!(&failure.workflow_id, workflow.id());

    // Execution forward, compensation in reverse.
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["execute:A", "execute:B", "restore:B", "restore:A"]
    );
    assert_eq!(a.restored_outputs(), vec![json!("a")]);
    assert_eq!(b.restored_outputs(), vec![json!("b")]);

    let trace = observer.trace();
    let expected: Vec<&str> = vec![
        "WorkflowStarted",
        "OperationStarted(A)",
        "OperationCompleted(A, \"a\")",
        "OperationStarted(B)",
        "OperationCompleted(B, \"b\")",
        "OperationStarted(C)",
        "OperationFailed(C)",
        "CompensationTriggered(2)",
        "OperationRestoreStarted(B)",
        "OperationRestoreCompleted(B)",
        "OperationRestoreStarted(A)",
        "OperationRestoreCompleted(A)",
        "CompensationCompleted(2, 0)",
    ];
    assert_eq!(trace[..13], expected[..]);
    assert_eq!(trace.len(), 14);
    assert!(trace[13].starts_with("WorkflowFailed(operation 'C' failed"));
    assert!(trace[13].ends_with("boom)"));
}

#[tokio::test]
async fn restore_failure_is_reported_but_original_error_is_raised() {
    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer);

    let a = Arc::new(ProbeOperation::new("A").with_output(json!("a")));
    let b = Arc::new(
        ProbeOperation::new("B")
            .with_output(json!("b"))
            .with_failing_restore("brest"),
    );
    let workflow = Arc::new(
        WorkflowBuilder::new("saga")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation_arc(Arc::clone(&b) as Arc<dyn Operation>)
            .operation_fn("C", |_, _, _| {
                Box::pin(async { Err(OperationError::Failed("boom".into())) })
            })
            .build()
            .unwrap(),
    );

    let result = smith.execute(&workflow, &CancellationToken::new()).await;

    // The caller sees "boom", never "brest".
    let Err(SmithError::Operation(failure)) = result else {
        panic!("expected a wrapped operation failure");
    };
    assert_eq!(failure.source.to_string(), "boom");

    let trace = observer.trace();
    assert!(trace.contains(&"OperationRestoreFailed(B)".to_string()));
    assert!(trace.contains(&"OperationRestoreCompleted(A)".to_string()));
    assert!(trace.contains(&"CompensationCompleted(1, 1)".to_string()));
    // A is still restored: the default continues past restore failures.
    assert_eq!(a.restored_outputs(), vec![json!("a")]);
}

#[tokio::test]
async fn restore_failure_stops_compensation_when_configured() {
    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer).with_options(
        ForgeOptions::default().with_continue_on_restore_failure(false),
    );

    let a = Arc::new(ProbeOperation::new("A").with_output(json!("a")));
    let b = Arc::new(
        ProbeOperation::new("B")
            .with_output(json!("b"))
            .with_failing_restore("brest"),
    );
    let workflow = Arc::new(
        WorkflowBuilder::new("saga")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation_arc(Arc::clone(&b) as Arc<dyn Operation>)
            .operation_fn("C", |_, _, _| {
                Box::pin(async { Err(OperationError::Failed("boom".into())) })
            })
            .build()
            .unwrap(),
    );

    let result = smith.execute(&workflow, &CancellationToken::new()).await;
    assert!(matches!(result, Err(SmithError::Operation(_))));

    let trace = observer.trace();
    assert!(trace.contains(&"OperationRestoreFailed(B)".to_string()));
    assert!(trace.contains(&"CompensationCompleted(0, 1)".to_string()));
    // A was never reached.
    assert!(a.restored_outputs().is_empty());
}

#[tokio::test]
async fn auto_restore_off_skips_compensation_entirely() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let (a, b, workflow) = saga_fixture(&journal);
    let observer = RecordingObserver::new();
    let smith =
        observed_smith(&observer).with_options(ForgeOptions::default().with_auto_restore(false));

    let result = smith.execute(&workflow, &CancellationToken::new()).await;
    assert!(matches!(result, Err(SmithError::Operation(_))));

    assert!(a.restored_outputs().is_empty());
    assert!(b.restored_outputs().is_empty());
    assert!(
        !observer
            .trace()
            .iter()
            .any(|line| line.starts_with("Compensation"))
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn cancellation_during_execute_fails_and_compensates_nothing() {
    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer);

    let workflow = Arc::new(
        WorkflowBuilder::new("cancellable")
            .operation(DelayOperation::new("A", Duration::from_millis(100)))
            .operation_fn("B", |_, _, _| Box::pin(async { Ok(json!("never")) }))
            .build()
            .unwrap(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = smith.execute(&workflow, &cancel).await;
    assert!(matches!(result, Err(SmithError::Cancelled)));

    let trace = observer.trace();
    assert!(trace.contains(&"OperationStarted(A)".to_string()));
    assert!(trace.contains(&"OperationFailed(A)".to_string()));
    assert!(trace.contains(&"CompensationTriggered(0)".to_string()));
    assert!(trace.contains(&"CompensationCompleted(0, 0)".to_string()));
    assert!(!trace.iter().any(|line| line.contains("(B")));
    assert!(trace.last().unwrap().starts_with("WorkflowFailed"));
}

#[tokio::test(start_paused = true)]
async fn skip_compensation_on_cancel_suppresses_restores() {
    let a = Arc::new(ProbeOperation::new("A").with_output(json!("a")));
    let workflow = Arc::new(
        WorkflowBuilder::new("cancellable")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation(DelayOperation::new("nap", Duration::from_millis(100)))
            .build()
            .unwrap(),
    );

    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer).with_options(
        ForgeOptions::default().with_skip_compensation_on_cancel(true),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = smith.execute(&workflow, &cancel).await;
    assert!(matches!(result, Err(SmithError::Cancelled)));
    assert!(a.restored_outputs().is_empty());
    assert!(
        !observer
            .trace()
            .iter()
            .any(|line| line.starts_with("Compensation"))
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_execution_still_compensates_completed_operations() {
    let a = Arc::new(ProbeOperation::new("A").with_output(json!("a")));
    let workflow = Arc::new(
        WorkflowBuilder::new("cancellable")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation(DelayOperation::new("nap", Duration::from_millis(100)))
            .build()
            .unwrap(),
    );

    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = smith.execute(&workflow, &cancel).await;
    assert!(matches!(result, Err(SmithError::Cancelled)));

    // A completed before the token fired, so it is restored even though
    // the token is still cancelled during compensation.
    assert_eq!(a.restored_outputs(), vec![json!("a")]);
    assert!(
        observer
            .trace()
            .contains(&"CompensationCompleted(1, 0)".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_arriving_during_compensation_aborts_it() {
    let observer = RecordingObserver::new();
    let smith = observed_smith(&observer);

    let a = Arc::new(ProbeOperation::new("A").with_output(json!("a")));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    // B's restore fires the token mid-compensation, then sleeps long
    // enough for the engine to notice before reaching A.
    let b = DelegateOperation::new("B", |_, _, _| Box::pin(async { Ok(json!("b")) }))
        .with_restore(move |_, _, _| {
            let trigger = trigger.clone();
            Box::pin(async move {
                trigger.cancel();
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            })
        });

    let workflow = Arc::new(
        WorkflowBuilder::new("saga")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation(b)
            .operation_fn("C", |_, _, _| {
                Box::pin(async { Err(OperationError::Failed("boom".into())) })
            })
            .build()
            .unwrap(),
    );

    let result = smith.execute(&workflow, &cancel).await;
    // The triggering failure, not the cancellation, reaches the caller.
    assert!(matches!(result, Err(SmithError::Operation(_))));

    let trace = observer.trace();
    assert!(trace.contains(&"OperationRestoreCompleted(B)".to_string()));
    assert!(trace.contains(&"CompensationCompleted(1, 0)".to_string()));
    // A's restore was aborted by the mid-compensation cancellation.
    assert!(a.restored_outputs().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Timeouts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn operation_timeout_fails_the_operation_and_compensates() {
    let a = Arc::new(ProbeOperation::new("A").with_output(json!("a")));
    let workflow = Arc::new(
        WorkflowBuilder::new("slow")
            .operation_arc(Arc::clone(&a) as Arc<dyn Operation>)
            .operation(DelayOperation::new("nap", Duration::from_secs(5)))
            .build()
            .unwrap(),
    );

    let smith = Smith::new().with_options(
        ForgeOptions::default().with_operation_timeout(Duration::from_millis(20)),
    );

    let result = smith.execute(&workflow, &CancellationToken::new()).await;
    let Err(SmithError::OperationTimeout { operation, limit }) = result else {
        panic!("expected an operation timeout");
    };
    assert_eq!(operation, "nap");
    assert_eq!(limit, Duration::from_millis(20));
    // The completed prefix was compensated.
    assert_eq!(a.restored_outputs(), vec![json!("a")]);
}

#[tokio::test(start_paused = true)]
async fn workflow_timeout_bounds_the_whole_execution() {
    let workflow = Arc::new(
        WorkflowBuilder::new("slow")
            .operation(DelayOperation::new("first", Duration::from_millis(40)))
            .operation(DelayOperation::new("second", Duration::from_millis(40)))
            .build()
            .unwrap(),
    );

    let smith = Smith::new().with_options(
        ForgeOptions::default().with_workflow_timeout(Duration::from_millis(60)),
    );

    let result = smith.execute(&workflow, &CancellationToken::new()).await;
    let Err(SmithError::WorkflowTimeout { limit }) = result else {
        panic!("expected a workflow timeout");
    };
    assert_eq!(limit, Duration::from_millis(60));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ordering invariant over arbitrary prefixes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

proptest::proptest! {
    #[test]
    fn compensation_reverses_any_completed_prefix(prefix_len in 0usize..6) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let journal = Arc::new(Mutex::new(Vec::new()));
            let mut builder = WorkflowBuilder::new("prefix");
            for i in 0..prefix_len {
                builder = builder.operation_arc(Arc::new(
                    ProbeOperation::new(format!("op{i}"))
                        .with_output(Value::from(i as u64))
                        .with_journal(Arc::clone(&journal)),
                ) as Arc<dyn Operation>);
            }
            builder = builder.operation_fn("bang", |_, _, _| {
                Box::pin(async { Err(OperationError::Failed("bang".into())) })
            });
            let workflow = Arc::new(builder.build().unwrap());

            let smith = Smith::new();
            let result = smith.execute(&workflow, &CancellationToken::new()).await;
            assert!(result.is_err());

            let journal = journal.lock().unwrap().clone();
            let executes: Vec<_> = journal
                .iter()
                .filter(|line| line.starts_with("execute:"))
                .map(|line| line.trim_start_matches("execute:").to_string())
                .collect();
            let restores: Vec<_> = journal
                .iter()
                .filter(|line| line.starts_with("restore:"))
                .map(|line| line.trim_start_matches("restore:").to_string())
                .collect();
            let mut reversed = executes;
            reversed.reverse();
            assert_eq!(restores, reversed);
        });
    }
}
