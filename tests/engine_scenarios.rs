mod common;

use async_trait::async_trait;
use casework::database::{CaseStore, InMemoryCaseStore};
use casework::events::EventBus;
use casework::models::Case;
use casework::services::StubTaskService;
use casework::state_machine::{
    BusinessProcessDefinition, BusinessProcessEngine, ExecutionOutcome, Step, END_STEP,
};
use casework::{CaseStatus, WorkflowError};
use common::{case_payload, task_types, Harness};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn counting_process(label: &str, calls: Arc<AtomicUsize>) -> Step {
    Step::system_process(label, move |_ctx| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

/// Publishes `event` for the entered case once the callback runs.
fn publishing_process(label: &str, event: &'static str) -> Step {
    Step::system_process(label, move |ctx| async move {
        ctx.bus
            .publish(event, case_payload(ctx.case.id))
            .await?;
        Ok(())
    })
}

#[tokio::test]
async fn entering_user_task_creates_exactly_one_task() {
    let calls = Arc::new(AtomicUsize::new(0));
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", counting_process("Screen", calls.clone()))
        .step("b", Step::user_task("Review", "review"))
        .start("a")
        .transition("a", "e1", "b")
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    harness.publish("e1", case.id).await.unwrap();

    let stored = harness.reload(case.id).await;
    assert_eq!(stored.current_step(), "b");
    assert_eq!(stored.status(), CaseStatus::Open);

    let created = harness.tasks.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].case_id, case.id);
    assert_eq!(created[0].task_type, "review");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn system_process_cascades_until_a_user_task() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step("b", publishing_process("Auto-screen", "e2"))
        .step("c", Step::user_task("Review", "review"))
        .start("a")
        .transition("a", "e1", "b")
        .transition("b", "e2", "c")
        .transition("c", "e3", END_STEP)
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    harness.publish("e1", case.id).await.unwrap();

    let stored = harness.reload(case.id).await;
    assert_eq!(stored.current_step(), "c");
    assert_eq!(stored.status(), CaseStatus::Open);
    assert_eq!(harness.tasks.created_count(), 1);

    harness.publish("e3", case.id).await.unwrap();

    let stored = harness.reload(case.id).await;
    assert_eq!(stored.current_step(), END_STEP);
    assert_eq!(stored.status(), CaseStatus::Closed);
}

#[tokio::test]
async fn event_without_transition_changes_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step("b", counting_process("Screen", calls.clone()))
        .start("a")
        .transition("a", "e1", "b")
        .transition("b", "e2", END_STEP)
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    let outcome = harness
        .engine
        .execute(case.id, "e2", &case_payload(case.id))
        .await
        .unwrap();

    assert_eq!(outcome, ExecutionOutcome::Ignored);
    assert_eq!(harness.reload(case.id).await, case);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.tasks.created_count(), 0);
}

#[tokio::test]
async fn republishing_an_event_is_a_no_op() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step("b", Step::user_task("Review", "review"))
        .start("a")
        .transition("a", "e1", "b")
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    harness.publish("e1", case.id).await.unwrap();
    let after_first = harness.reload(case.id).await;

    let outcome = harness
        .engine
        .execute(case.id, "e1", &case_payload(case.id))
        .await
        .unwrap();

    assert!(outcome.is_ignored());
    assert_eq!(harness.reload(case.id).await, after_first);
    assert_eq!(harness.tasks.created_count(), 1);
}

#[tokio::test]
async fn failing_callback_leaves_case_at_new_step() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step(
            "b",
            Step::system_process("Call identity service", |_ctx| async {
                Err(anyhow::anyhow!("identity service unavailable"))
            }),
        )
        .start("a")
        .transition("a", "e1", "b")
        .transition("b", "e2", END_STEP)
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    let err = harness.publish("e1", case.id).await.unwrap_err();

    match &err {
        WorkflowError::StepExecutionFailure { case_id, step, source } => {
            assert_eq!(*case_id, case.id);
            assert_eq!(step, "b");
            assert_eq!(source.to_string(), "identity service unavailable");
        }
        other => panic!("Expected StepExecutionFailure, got {other:?}"),
    }

    // The transition was committed before the callback ran.
    let stored = harness.reload(case.id).await;
    assert_eq!(stored.current_step(), "b");
    assert_eq!(stored.status(), CaseStatus::Open);

    // Re-delivering the trigger does not re-run the step.
    harness.publish("e1", case.id).await.unwrap();
    assert_eq!(harness.reload(case.id).await, stored);

    // An operator can push the case on once the side effect is handled.
    harness.publish("e2", case.id).await.unwrap();
    assert!(harness.reload(case.id).await.is_closed());
}

#[tokio::test]
async fn callback_observes_persisted_step() {
    let cases = Arc::new(InMemoryCaseStore::new());
    let observed = Arc::new(Mutex::new(None));

    let store = cases.clone();
    let seen = observed.clone();
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step(
            "b",
            Step::system_process("Inspect", move |ctx| {
                let store = store.clone();
                let seen = seen.clone();
                async move {
                    let persisted = store.find(ctx.case.id).await?.expect("case exists");
                    *seen.lock() = Some((
                        persisted.current_step().to_string(),
                        ctx.case.current_step().to_string(),
                    ));
                    Ok(())
                }
            }),
        )
        .start("a")
        .transition("a", "e1", "b")
        .build()
        .unwrap();
    let harness = Harness::on_bus(definition, EventBus::new(), cases);
    let case = harness.case_at("a").await;

    harness.publish("e1", case.id).await.unwrap();

    assert_eq!(
        observed.lock().clone(),
        Some(("b".to_string(), "b".to_string()))
    );
}

#[tokio::test]
async fn callback_receives_triggering_payload() {
    let received = Arc::new(Mutex::new(None));
    let sink = received.clone();
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step(
            "b",
            Step::system_process("Record income", move |ctx| {
                let sink = sink.clone();
                async move {
                    *sink.lock() = Some(ctx.payload["monthly_income"].clone());
                    Ok(())
                }
            }),
        )
        .start("a")
        .transition("a", "income_reported", "b")
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    harness
        .bus
        .publish(
            "income_reported",
            json!({"case_id": case.id.to_string(), "monthly_income": 2150}),
        )
        .await
        .unwrap();

    assert_eq!(*received.lock(), Some(json!(2150)));
}

#[tokio::test]
async fn open_case_cascades_from_start_step() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("screen", publishing_process("Auto-screen", "screened"))
        .step("review", Step::user_task("Review", "review"))
        .start("screen")
        .transition("screen", "screened", "review")
        .build()
        .unwrap();
    let harness = Harness::new(definition);

    let case = harness.engine.open_case(Uuid::new_v4()).await.unwrap();

    assert_eq!(case.current_step(), "review");
    assert_eq!(harness.tasks.created_count(), 1);
}

#[tokio::test]
async fn engines_for_different_processes_share_a_bus() {
    let bus = EventBus::new();
    let cases = Arc::new(InMemoryCaseStore::new());

    let passport = Harness::on_bus(
        BusinessProcessDefinition::builder("passport")
            .step("review", Step::user_task("Review", "review"))
            .start("review")
            .transition("review", "approved", END_STEP)
            .build()
            .unwrap(),
        bus.clone(),
        cases.clone(),
    );
    let licence = Harness::on_bus(
        BusinessProcessDefinition::builder("licence")
            .step("review", Step::user_task("Review", "review"))
            .step("print", Step::user_task("Print", "print"))
            .start("review")
            .transition("review", "approved", "print")
            .build()
            .unwrap(),
        bus.clone(),
        cases.clone(),
    );

    assert_eq!(bus.subscriber_count("approved"), 2);

    let passport_case = passport.case_at("review").await;
    let licence_case = licence.case_at("review").await;

    passport.publish("approved", passport_case.id).await.unwrap();
    licence.publish("approved", licence_case.id).await.unwrap();

    assert!(passport.reload(passport_case.id).await.is_closed());
    assert_eq!(licence.reload(licence_case.id).await.current_step(), "print");
    assert_eq!(passport.tasks.created_count(), 0);
    assert_eq!(licence.tasks.created_count(), 1);
}

#[tokio::test]
async fn event_without_case_id_is_rejected() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .start("a")
        .transition("a", "e1", END_STEP)
        .build()
        .unwrap();
    let harness = Harness::new(definition);

    let result = harness.bus.publish("e1", json!({"applicant": "x"})).await;
    assert!(matches!(result, Err(WorkflowError::InvalidArgument(_))));
}

#[tokio::test]
async fn dropped_engine_stops_reacting() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .start("a")
        .transition("a", "e1", END_STEP)
        .build()
        .unwrap();
    let Harness {
        engine, cases, bus, ..
    } = Harness::new(definition);
    let case = Case::new("benefits", "a");
    cases.save(&case).await.unwrap();

    drop(engine);
    bus.publish("e1", case_payload(case.id)).await.unwrap();

    assert_eq!(cases.find(case.id).await.unwrap().unwrap().current_step(), "a");
}

#[tokio::test]
async fn stop_listening_detaches_from_bus() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .start("a")
        .transition("a", "e1", END_STEP)
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    assert_eq!(harness.engine.stop_listening(), 1);
    harness.publish("e1", case.id).await.unwrap();

    assert_eq!(harness.reload(case.id).await.current_step(), "a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_advance_a_case_once() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step("b", Step::user_task("Review", "review"))
        .start("a")
        .transition("a", "e1", "b")
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    let deliveries: Vec<_> = (0..16)
        .map(|_| {
            let engine = harness.engine.clone();
            let case_id = case.id;
            tokio::spawn(async move { engine.execute(case_id, "e1", &case_payload(case_id)).await })
        })
        .collect();

    let mut advanced = 0;
    for delivery in deliveries {
        if let ExecutionOutcome::Advanced { .. } = delivery.await.unwrap().unwrap() {
            advanced += 1;
        }
    }

    assert_eq!(advanced, 1);
    assert_eq!(harness.tasks.created_count(), 1);
    assert_eq!(harness.reload(case.id).await.current_step(), "b");
}

#[tokio::test]
async fn unregistered_task_type_leaves_case_at_new_step() {
    let definition = BusinessProcessDefinition::builder("benefits")
        .step("a", Step::user_task("Apply", "intake"))
        .step("b", Step::user_task("Interview", "not_registered"))
        .start("a")
        .transition("a", "e1", "b")
        .build()
        .unwrap();
    let harness = Harness::new(definition);
    let case = harness.case_at("a").await;

    let err = harness.publish("e1", case.id).await.unwrap_err();

    match &err {
        WorkflowError::StepExecutionFailure { case_id, step, source } => {
            assert_eq!(*case_id, case.id);
            assert_eq!(step, "b");
            assert!(matches!(
                source.downcast_ref::<WorkflowError>(),
                Some(WorkflowError::InvalidArgument(_))
            ));
        }
        other => panic!("Expected StepExecutionFailure, got {other:?}"),
    }
    assert!(err.is_step_failure());
    assert!(std::error::Error::source(&err).is_some());

    let stored = harness.reload(case.id).await;
    assert_eq!(stored.current_step(), "b");
    assert_eq!(stored.status(), CaseStatus::Open);
    assert_eq!(harness.tasks.created_count(), 0);
}

/// Case store whose reads reach the caller late, so concurrent callers
/// both act on the same snapshot, as with a networked database.
struct SlowCaseStore {
    inner: InMemoryCaseStore,
}

#[async_trait]
impl CaseStore for SlowCaseStore {
    async fn find(&self, case_id: Uuid) -> casework::Result<Option<Case>> {
        let found = self.inner.find(case_id).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        found
    }

    async fn save(&self, case: &Case) -> casework::Result<()> {
        self.inner.save(case).await
    }

    async fn insert(&self, case: &Case) -> casework::Result<bool> {
        self.inner.insert(case).await
    }

    async fn save_if_at(&self, case: &Case, expected_step: &str) -> casework::Result<bool> {
        self.inner.save_if_at(case, expected_step).await
    }
}

#[tokio::test]
async fn engines_sharing_a_store_advance_a_case_once() {
    let process = || {
        BusinessProcessDefinition::builder("benefits")
            .step("a", Step::user_task("Apply", "intake"))
            .step("b", Step::user_task("Review", "review"))
            .start("a")
            .transition("a", "e1", "b")
            .build()
            .unwrap()
    };
    let store = Arc::new(SlowCaseStore {
        inner: InMemoryCaseStore::new(),
    });
    let tasks = Arc::new(StubTaskService::new(task_types()));
    let engine = |bus: EventBus| {
        BusinessProcessEngine::new(Arc::new(process()), store.clone(), tasks.clone(), bus)
    };
    let first = engine(EventBus::new());
    let second = engine(EventBus::new());

    let case = Case::new("benefits", "a");
    store.save(&case).await.unwrap();
    let payload = case_payload(case.id);

    let (left, right) = tokio::join!(
        first.execute(case.id, "e1", &payload),
        second.execute(case.id, "e1", &payload),
    );
    let outcomes = [left.unwrap(), right.unwrap()];

    let advanced = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ExecutionOutcome::Advanced { .. }))
        .count();
    assert_eq!(advanced, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.iter().any(ExecutionOutcome::is_ignored));
    assert_eq!(tasks.created_count(), 1);
    assert_eq!(store.find(case.id).await.unwrap().unwrap().current_step(), "b");
}

#[tokio::test]
async fn engines_sharing_a_store_open_a_case_once() {
    let store = Arc::new(InMemoryCaseStore::new());
    let first = Harness::on_bus(
        BusinessProcessDefinition::builder("benefits")
            .step("a", Step::user_task("Apply", "intake"))
            .start("a")
            .build()
            .unwrap(),
        EventBus::new(),
        store.clone(),
    );
    let second = Harness::on_bus(
        BusinessProcessDefinition::builder("benefits")
            .step("a", Step::user_task("Apply", "intake"))
            .start("a")
            .build()
            .unwrap(),
        EventBus::new(),
        store.clone(),
    );
    let case_id = Uuid::new_v4();

    first.engine.open_case(case_id).await.unwrap();
    let duplicate = second.engine.open_case(case_id).await;

    assert!(matches!(duplicate, Err(WorkflowError::InvalidArgument(_))));
    assert_eq!(first.tasks.created_count(), 1);
    assert_eq!(second.tasks.created_count(), 0);
}
