//! # Business Process Engine
//!
//! Moves cases through a [`BusinessProcessDefinition`] in response to events.
//!
//! ## Execution Order
//!
//! For each relevant event the engine:
//! 1. Takes the per-case lock
//! 2. Loads the case and looks up `(current step, event)` in the definition
//! 3. Returns [`ExecutionOutcome::Ignored`] when no transition applies
//! 4. Moves the case to the next step (closing it at `end`) and saves it
//!    only if the stored case is still at the step it was read at
//! 5. Releases the lock
//! 6. Enters the new step: user tasks create a task and stop, system
//!    processes run their callback, which may publish further events
//!
//! Because the case is saved before the step is entered, an event published
//! from inside a callback sees the case at its new step. Callback failures do
//! not roll the case back: they are logged and returned as
//! [`WorkflowError::StepExecutionFailure`] with the case left at the new step.
//!
//! ## Concurrency
//!
//! Events for different cases run independently. Steps 1-5 are serialized
//! per case within one engine, and the conditional save in step 4 covers
//! engines in other tasks or processes sharing the store: the losing writer
//! sees [`ExecutionOutcome::Ignored`] and does not enter the step. The lock is
//! not held while a step runs, so re-entrant events do not deadlock.

use super::definition::BusinessProcessDefinition;
use super::step::{EnterError, StepContext, StepOutcome};
use crate::database::CaseStore;
use crate::error::{Result, WorkflowError};
use crate::events::{Event, EventBus, EventHandler, SubscriptionHandle};
use crate::models::Case;
use crate::services::TaskService;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Result of delivering one event to one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// No transition for the case's current step; nothing changed
    Ignored,
    Advanced { from: String, to: String },
    /// The case reached `end` and is now closed
    Closed { from: String },
}

impl ExecutionOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

pub struct BusinessProcessEngine {
    definition: Arc<BusinessProcessDefinition>,
    cases: Arc<dyn CaseStore>,
    tasks: Arc<dyn TaskService>,
    bus: EventBus,
    case_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    subscriptions: parking_lot::Mutex<Vec<SubscriptionHandle>>,
}

impl BusinessProcessEngine {
    pub fn new(
        definition: Arc<BusinessProcessDefinition>,
        cases: Arc<dyn CaseStore>,
        tasks: Arc<dyn TaskService>,
        bus: EventBus,
    ) -> Self {
        info!(
            process = %definition.name(),
            steps = definition.steps().count(),
            "Creating BusinessProcessEngine"
        );

        Self {
            definition,
            cases,
            tasks,
            bus,
            case_locks: DashMap::new(),
            subscriptions: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn definition(&self) -> &BusinessProcessDefinition {
        &self.definition
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Create a case at the start step and enter that step.
    ///
    /// Returns the case as stored once the start step has run, which may be
    /// further along if the start step cascaded.
    #[instrument(skip(self), fields(process = %self.definition.name()))]
    pub async fn open_case(&self, case_id: Uuid) -> Result<Case> {
        let created = self.create_case(case_id).await;
        self.release_lock(case_id);
        let case = created?;

        info!(case_id = %case_id, step = %case.current_step(), "Opened case");
        self.enter_step(case, Value::Null).await?;

        self.cases
            .find(case_id)
            .await?
            .ok_or(WorkflowError::CaseNotFound(case_id))
    }

    /// Apply `event_name` to the case.
    #[instrument(skip(self, payload), fields(process = %self.definition.name()))]
    pub async fn execute(
        &self,
        case_id: Uuid,
        event_name: &str,
        payload: &Value,
    ) -> Result<ExecutionOutcome> {
        let transition = self.transition_case(case_id, event_name).await;
        self.release_lock(case_id);

        let Some((case, from)) = transition? else {
            return Ok(ExecutionOutcome::Ignored);
        };

        if case.is_closed() {
            info!(case_id = %case_id, from_step = %from, event = %event_name, "Case closed");
            return Ok(ExecutionOutcome::Closed { from });
        }

        let to = case.current_step().to_string();
        self.enter_step(case, payload.clone()).await?;
        Ok(ExecutionOutcome::Advanced { from, to })
    }

    /// Route a published event to the case named by its `case_id`.
    pub async fn handle_event(&self, event: &Event) -> Result<ExecutionOutcome> {
        let case_id = event.case_id()?;
        self.execute(case_id, &event.name, &event.payload).await
    }

    /// Subscribe to every event name in the transition table.
    ///
    /// Calling this while already listening changes nothing. The bus only
    /// holds a weak reference, so dropping the engine silences it.
    pub fn start_listening(self: &Arc<Self>) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            return subscriptions.len();
        }

        let handler: Arc<dyn EventHandler> = Arc::new(EngineSubscriber {
            engine: Arc::downgrade(self),
        });
        for event_name in self.definition.event_names() {
            subscriptions.push(self.bus.subscribe(event_name, Arc::clone(&handler)));
        }

        info!(
            process = %self.definition.name(),
            events = subscriptions.len(),
            "Listening for business process events"
        );
        subscriptions.len()
    }

    /// Drop every subscription made by [`Self::start_listening`].
    pub fn stop_listening(&self) -> usize {
        let handles: Vec<SubscriptionHandle> = self.subscriptions.lock().drain(..).collect();
        handles
            .iter()
            .filter(|handle| self.bus.unsubscribe(handle))
            .count()
    }

    pub fn is_listening(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }

    async fn create_case(&self, case_id: Uuid) -> Result<Case> {
        let lock = self.case_lock(case_id);
        let _guard = lock.lock().await;

        let case = Case::with_id(case_id, self.definition.name(), self.definition.start_step());
        if !self.cases.insert(&case).await? {
            return Err(WorkflowError::invalid_argument(format!(
                "case {case_id} already exists"
            )));
        }
        Ok(case)
    }

    /// Locked read-decide-write. `None` means the event does not apply.
    async fn transition_case(
        &self,
        case_id: Uuid,
        event_name: &str,
    ) -> Result<Option<(Case, String)>> {
        let lock = self.case_lock(case_id);
        let _guard = lock.lock().await;

        let mut case = self
            .cases
            .find(case_id)
            .await?
            .ok_or(WorkflowError::CaseNotFound(case_id))?;

        if case.process_name != self.definition.name() {
            debug!(
                case_id = %case_id,
                case_process = %case.process_name,
                event = %event_name,
                "Event targets a case of another process"
            );
            return Ok(None);
        }

        if !self.definition.is_known_step(case.current_step()) || !case.is_consistent() {
            return Err(WorkflowError::InvalidCaseState {
                case_id,
                process: self.definition.name().to_string(),
                step: case.current_step().to_string(),
                status: case.status(),
            });
        }

        let Some(next) = self.definition.next_step(case.current_step(), event_name) else {
            debug!(
                case_id = %case_id,
                step = %case.current_step(),
                event = %event_name,
                "No transition for event at current step"
            );
            return Ok(None);
        };

        let from = case.current_step().to_string();
        case.move_to(next);
        if !self.cases.save_if_at(&case, &from).await? {
            debug!(
                case_id = %case_id,
                step = %from,
                event = %event_name,
                "Case moved by another writer before this transition was saved"
            );
            return Ok(None);
        }

        info!(
            case_id = %case_id,
            from_step = %from,
            to_step = %case.current_step(),
            event = %event_name,
            "Case transitioned"
        );
        Ok(Some((case, from)))
    }

    async fn enter_step(&self, case: Case, payload: Value) -> Result<()> {
        let case_id = case.id;
        let step_name = case.current_step().to_string();
        let Some(step) = self.definition.step(&step_name) else {
            return Err(WorkflowError::InvalidCaseState {
                case_id,
                process: self.definition.name().to_string(),
                step: step_name,
                status: case.status(),
            });
        };

        let ctx = StepContext {
            case,
            payload,
            tasks: Arc::clone(&self.tasks),
            bus: self.bus.clone(),
        };

        match step.enter(ctx).await {
            Ok(StepOutcome::TaskCreated(task)) => {
                debug!(case_id = %case_id, step = %step_name, task_id = %task.id, "Waiting on user task");
                Ok(())
            }
            Ok(StepOutcome::Processed) => Ok(()),
            Err(failure) => {
                let source = match failure {
                    EnterError::Task(err) => anyhow::Error::new(err),
                    EnterError::Callback(err) => err,
                };
                error!(
                    case_id = %case_id,
                    step = %step_name,
                    error = %source,
                    "Step failed after the case moved into it; the case stays at this step until the step is retried"
                );
                Err(WorkflowError::StepExecutionFailure {
                    case_id,
                    step: step_name,
                    source,
                })
            }
        }
    }

    fn case_lock(&self, case_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(self.case_locks.entry(case_id).or_default().value())
    }

    /// Forget the lock for `case_id` once nobody else holds or waits on it.
    fn release_lock(&self, case_id: Uuid) {
        self.case_locks
            .remove_if(&case_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for BusinessProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessProcessEngine")
            .field("process", &self.definition.name())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

struct EngineSubscriber {
    engine: Weak<BusinessProcessEngine>,
}

#[async_trait]
impl EventHandler for EngineSubscriber {
    async fn handle(&self, event: &Event) -> Result<()> {
        match self.engine.upgrade() {
            Some(engine) => engine.handle_event(event).await.map(|_| ()),
            None => Ok(()),
        }
    }
}
