//! Units of work a case can sit at.

use crate::error::WorkflowError;
use crate::events::EventBus;
use crate::models::{Case, Task};
use crate::services::TaskService;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Collaborators handed to a step when a case enters it.
#[derive(Clone)]
pub struct StepContext {
    /// The case as persisted after moving into the step
    pub case: Case,
    /// Payload of the event that moved the case here (`null` when a case is opened)
    pub payload: Value,
    pub tasks: Arc<dyn TaskService>,
    /// Bus the engine listens on, for publishing follow-up events
    pub bus: EventBus,
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("case", &self.case)
            .field("payload", &self.payload)
            .field("tasks", &"<Arc<dyn TaskService>>")
            .field("bus", &self.bus)
            .finish()
    }
}

type StepCallback = dyn Fn(StepContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A step that waits on a person: entering it creates a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTask {
    pub label: String,
    pub task_type: String,
}

/// A step that runs automatically: entering it invokes a callback.
#[derive(Clone)]
pub struct SystemProcess {
    pub label: String,
    callback: Arc<StepCallback>,
}

impl fmt::Debug for SystemProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemProcess")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    UserTask(UserTask),
    SystemProcess(SystemProcess),
}

/// What entering a step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    TaskCreated(Task),
    Processed,
}

impl Step {
    pub fn user_task(label: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self::UserTask(UserTask {
            label: label.into(),
            task_type: task_type.into(),
        })
    }

    /// A system process step. The callback's job is usually to publish the
    /// event that moves the case on, either right away or once some external
    /// work has finished.
    pub fn system_process<F, Fut>(label: impl Into<String>, callback: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::SystemProcess(SystemProcess {
            label: label.into(),
            callback: Arc::new(move |ctx| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(callback(ctx))
            }),
        })
    }

    pub fn label(&self) -> &str {
        match self {
            Self::UserTask(step) => &step.label,
            Self::SystemProcess(step) => &step.label,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserTask(_) => "user_task",
            Self::SystemProcess(_) => "system_process",
        }
    }

    /// Run the step's entry behavior for `ctx.case`.
    ///
    /// User task failures come back as the task service's error; callback
    /// failures come back untouched so the engine can attach the step name.
    pub async fn enter(&self, ctx: StepContext) -> Result<StepOutcome, EnterError> {
        match self {
            Self::UserTask(step) => {
                let task = ctx
                    .tasks
                    .create_task(Some(&ctx.case), &step.task_type)
                    .await
                    .map_err(EnterError::Task)?;
                Ok(StepOutcome::TaskCreated(task))
            }
            Self::SystemProcess(step) => {
                (step.callback)(ctx).await.map_err(EnterError::Callback)?;
                Ok(StepOutcome::Processed)
            }
        }
    }
}

/// Why entering a step failed.
#[derive(Debug, thiserror::Error)]
pub enum EnterError {
    #[error(transparent)]
    Task(WorkflowError),
    #[error(transparent)]
    Callback(anyhow::Error),
}
