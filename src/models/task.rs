//! # Task Model
//!
//! Human-facing work item created when a case enters a user task step.
//!
//! ## Overview
//!
//! A `Task` points back at the case that produced it and carries the task
//! type it was created for. Its own lifecycle (assignment, completion) is
//! independent of the engine: finishing a task does not move the case, the
//! caller publishes the follow-up event for that.
//!
//! ## Database Schema
//!
//! Maps to the `casework_tasks` table when the `postgres` feature is enabled:
//! - `id`: Primary key (UUID)
//! - `case_id`: Owning case (UUID)
//! - `task_type`: Registered task type name (VARCHAR)
//! - `description`: Free text shown to staff (TEXT)
//! - `status`: `pending` | `completed` (VARCHAR)
//! - `assignee_id`: Optional staff identifier (VARCHAR)
//! - `created_at`, `completed_at`: TIMESTAMPTZ

use crate::state_machine::states::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub case_id: Uuid,
    pub task_type: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(case_id: Uuid, task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_id,
            task_type: task_type.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            assignee_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn assign(&mut self, assignee_id: impl Into<String>) {
        self.assignee_id = Some(assignee_id.into());
    }

    pub fn unassign(&mut self) {
        self.assignee_id = None;
    }

    /// Mark the task completed. Completing an already completed task keeps
    /// the original completion time.
    pub fn mark_completed(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A kind of task staff can be asked to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskType {
    pub name: String,
    pub description: String,
}

impl TaskType {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The set of task types a task service will accept.
#[derive(Debug, Clone, Default)]
pub struct TaskTypeRegistry {
    types: BTreeMap<String, TaskType>,
}

impl TaskTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type, replacing any previous registration with the same name.
    pub fn register(mut self, task_type: TaskType) -> Self {
        self.types.insert(task_type.name.clone(), task_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TaskType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FromIterator<TaskType> for TaskTypeRegistry {
    fn from_iter<I: IntoIterator<Item = TaskType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |registry, task_type| registry.register(task_type))
    }
}
