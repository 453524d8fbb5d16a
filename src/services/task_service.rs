//! # Task Service
//!
//! Materializes human-facing tasks when a case enters a user task step.
//!
//! ## Backends
//!
//! - [`DatabaseTaskService`] - validates and persists through a [`TaskStore`] (default)
//! - [`StubTaskService`] - validates identically but only records tasks in memory
//!
//! [`task_service_from_config`] picks one from [`EngineConfig`] so callers can
//! switch backends without touching process definitions.

use crate::config::{EngineConfig, TaskServiceBackend};
use crate::database::TaskStore;
use crate::error::{Result, WorkflowError};
use crate::models::{Case, Task, TaskTypeRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait TaskService: Send + Sync {
    /// Create a task of `task_type` for `case`.
    ///
    /// Fails with [`WorkflowError::InvalidArgument`] when `case` is missing or
    /// `task_type` is not a registered task type.
    async fn create_task(&self, case: Option<&Case>, task_type: &str) -> Result<Task>;
}

fn build_task(registry: &TaskTypeRegistry, case: Option<&Case>, task_type: &str) -> Result<Task> {
    let case = case.ok_or_else(|| WorkflowError::invalid_argument("case must be present"))?;
    let registered = registry.get(task_type).ok_or_else(|| {
        WorkflowError::invalid_argument(format!("'{task_type}' is not a registered task type"))
    })?;

    Ok(Task::new(case.id, &registered.name, &registered.description))
}

/// Task service that writes tasks through a [`TaskStore`].
pub struct DatabaseTaskService {
    registry: TaskTypeRegistry,
    store: Arc<dyn TaskStore>,
}

impl DatabaseTaskService {
    pub fn new(registry: TaskTypeRegistry, store: Arc<dyn TaskStore>) -> Self {
        Self { registry, store }
    }

    pub async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        self.store.find(task_id).await
    }

    pub async fn tasks_for_case(&self, case_id: Uuid) -> Result<Vec<Task>> {
        self.store.tasks_for_case(case_id).await
    }

    pub async fn assign_task(&self, task_id: Uuid, assignee_id: &str) -> Result<Task> {
        self.modify_task(task_id, |task| task.assign(assignee_id)).await
    }

    /// Mark a task completed. Publishing the event that advances the case is
    /// left to the caller.
    pub async fn complete_task(&self, task_id: Uuid) -> Result<Task> {
        self.modify_task(task_id, Task::mark_completed).await
    }

    async fn modify_task(&self, task_id: Uuid, change: impl FnOnce(&mut Task)) -> Result<Task> {
        let mut task = self
            .store
            .find(task_id)
            .await?
            .ok_or_else(|| WorkflowError::invalid_argument(format!("task {task_id} not found")))?;

        change(&mut task);
        if !self.store.update(&task).await? {
            return Err(WorkflowError::invalid_argument(format!(
                "task {task_id} disappeared during update"
            )));
        }
        Ok(task)
    }
}

#[async_trait]
impl TaskService for DatabaseTaskService {
    async fn create_task(&self, case: Option<&Case>, task_type: &str) -> Result<Task> {
        let task = build_task(&self.registry, case, task_type)?;
        self.store.insert(&task).await?;

        info!(
            task_id = %task.id,
            case_id = %task.case_id,
            task_type = %task.task_type,
            "Task created"
        );
        Ok(task)
    }
}

/// Task service that keeps created tasks in memory.
#[derive(Default)]
pub struct StubTaskService {
    registry: TaskTypeRegistry,
    created: Mutex<Vec<Task>>,
}

impl StubTaskService {
    pub fn new(registry: TaskTypeRegistry) -> Self {
        Self {
            registry,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Tasks created so far, in creation order.
    pub fn created(&self) -> Vec<Task> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

#[async_trait]
impl TaskService for StubTaskService {
    async fn create_task(&self, case: Option<&Case>, task_type: &str) -> Result<Task> {
        let task = build_task(&self.registry, case, task_type)?;
        self.created.lock().push(task.clone());
        Ok(task)
    }
}

/// Build the task service selected by `config`.
pub fn task_service_from_config(
    config: &EngineConfig,
    registry: TaskTypeRegistry,
    store: Arc<dyn TaskStore>,
) -> Arc<dyn TaskService> {
    match config.task_service_backend {
        TaskServiceBackend::Database => Arc::new(DatabaseTaskService::new(registry, store)),
        TaskServiceBackend::Stub => Arc::new(StubTaskService::new(registry)),
    }
}
