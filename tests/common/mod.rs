//! Shared fixtures for integration tests.

#![allow(dead_code)] // Not every test binary uses every helper

use casework::database::{CaseStore, InMemoryCaseStore};
use casework::events::EventBus;
use casework::models::{Case, TaskType, TaskTypeRegistry};
use casework::services::StubTaskService;
use casework::state_machine::{BusinessProcessDefinition, BusinessProcessEngine};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Task types every fixture process may use.
pub fn task_types() -> TaskTypeRegistry {
    [
        TaskType::new("intake", "Collect the application"),
        TaskType::new("review", "Review the application"),
        TaskType::new("print", "Print the card"),
    ]
    .into_iter()
    .collect()
}

pub fn case_payload(case_id: Uuid) -> Value {
    json!({ "case_id": case_id.to_string() })
}

/// An engine wired to in-memory collaborators.
pub struct Harness {
    pub engine: Arc<BusinessProcessEngine>,
    pub cases: Arc<InMemoryCaseStore>,
    pub tasks: Arc<StubTaskService>,
    pub bus: EventBus,
}

impl Harness {
    pub fn new(definition: BusinessProcessDefinition) -> Self {
        Self::on_bus(definition, EventBus::new(), Arc::new(InMemoryCaseStore::new()))
    }

    /// Build a harness sharing a bus and case store with other harnesses.
    pub fn on_bus(
        definition: BusinessProcessDefinition,
        bus: EventBus,
        cases: Arc<InMemoryCaseStore>,
    ) -> Self {
        let tasks = Arc::new(StubTaskService::new(task_types()));
        let engine = Arc::new(BusinessProcessEngine::new(
            Arc::new(definition),
            cases.clone(),
            tasks.clone(),
            bus.clone(),
        ));
        engine.start_listening();

        Self {
            engine,
            cases,
            tasks,
            bus,
        }
    }

    /// Store a case sitting at `step` without entering that step.
    pub async fn case_at(&self, step: &str) -> Case {
        let case = Case::new(self.engine.definition().name(), step);
        self.cases.save(&case).await.unwrap();
        case
    }

    pub async fn reload(&self, case_id: Uuid) -> Case {
        self.cases.find(case_id).await.unwrap().unwrap()
    }

    pub async fn publish(&self, event: &str, case_id: Uuid) -> casework::Result<()> {
        self.bus.publish(event, case_payload(case_id)).await
    }
}
