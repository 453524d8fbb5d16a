#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Casework
//!
//! Business-process engine for benefit-application products.
//!
//! ## Overview
//!
//! A **case** tracks one applicant through one business process. The process
//! is a graph of named **steps** (user tasks that wait on staff, and system
//! processes that run automatically) connected by **transitions** keyed by
//! `(step, event)`. Domain events published on the [`events::EventBus`] move
//! cases along that graph until they reach the `end` step and close.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Process definitions, steps and the engine
//! - [`events`] - In-process event bus
//! - [`models`] - Case and task records
//! - [`services`] - Task service backends
//! - [`database`] - Case and task stores (in-memory, Postgres)
//! - [`config`] - Configuration loading
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use casework::database::{InMemoryCaseStore, InMemoryTaskStore};
//! use casework::events::EventBus;
//! use casework::models::{TaskType, TaskTypeRegistry};
//! use casework::services::DatabaseTaskService;
//! use casework::state_machine::{BusinessProcessDefinition, BusinessProcessEngine, Step, END_STEP};
//! use serde_json::json;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::new();
//! let definition = BusinessProcessDefinition::builder("passport")
//!     .step("review", Step::user_task("Review application", "review_application"))
//!     .step("print", Step::system_process("Print passport", |ctx| async move {
//!         ctx.bus
//!             .publish("passport_printed", json!({"case_id": ctx.case.id.to_string()}))
//!             .await?;
//!         Ok(())
//!     }))
//!     .start("review")
//!     .transition("review", "application_approved", "print")
//!     .transition("print", "passport_printed", END_STEP)
//!     .build()
//!     .unwrap();
//!
//! let tasks = DatabaseTaskService::new(
//!     TaskTypeRegistry::new().register(TaskType::new("review_application", "Review the application")),
//!     Arc::new(InMemoryTaskStore::new()),
//! );
//! let engine = Arc::new(BusinessProcessEngine::new(
//!     Arc::new(definition),
//!     Arc::new(InMemoryCaseStore::new()),
//!     Arc::new(tasks),
//!     bus.clone(),
//! ));
//! engine.start_listening();
//!
//! let case = engine.open_case(Uuid::new_v4()).await.unwrap();
//! bus.publish("application_approved", json!({"case_id": case.id.to_string()}))
//!     .await
//!     .unwrap();
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod services;
pub mod state_machine;

pub use config::{EngineConfig, TaskServiceBackend};
pub use error::{DefinitionError, Result, WorkflowError};
pub use events::{Event, EventBus};
pub use models::{Case, Task};
pub use state_machine::{
    BusinessProcessDefinition, BusinessProcessEngine, CaseStatus, ExecutionOutcome, Step, END_STEP,
};
