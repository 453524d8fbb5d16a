use super::{CaseStore, TaskStore};
use crate::error::Result;
use crate::models::{Case, Task};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-process case store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCaseStore {
    cases: Arc<DashMap<Uuid, Case>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn find(&self, case_id: Uuid) -> Result<Option<Case>> {
        Ok(self.cases.get(&case_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, case: &Case) -> Result<()> {
        self.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn insert(&self, case: &Case) -> Result<bool> {
        match self.cases.entry(case.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(case.clone());
                Ok(true)
            }
        }
    }

    async fn save_if_at(&self, case: &Case, expected_step: &str) -> Result<bool> {
        match self.cases.get_mut(&case.id) {
            Some(mut stored) if stored.current_step() == expected_step => {
                *stored = case.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-process task store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<DashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.get(&task_id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, task: &Task) -> Result<bool> {
        match self.tasks.get_mut(&task.id) {
            Some(mut entry) => {
                *entry = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn tasks_for_case(&self, case_id: Uuid) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| entry.case_id == case_id)
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }
}
