//! # Persistence Collaborators
//!
//! Storage seams for cases and tasks.
//!
//! ## Overview
//!
//! The engine never talks to a database directly. It loads and saves cases
//! through [`CaseStore`], and the database-backed task service writes tasks
//! through [`TaskStore`]. Two implementations ship with the crate:
//!
//! - [`memory`] - `DashMap`-backed stores, used by tests and embedded setups
//! - `postgres` - SQLx stores over existing tables (feature `postgres`)
//!
//! Schema management is left to the host application.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod connection;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::Result;
use crate::models::{Case, Task};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::{InMemoryCaseStore, InMemoryTaskStore};

#[cfg(feature = "postgres")]
pub use connection::DatabaseConnection;
#[cfg(feature = "postgres")]
pub use postgres::{PgCaseStore, PgTaskStore};

/// Loads and saves cases by id.
///
/// The engine writes only through [`CaseStore::insert`] and
/// [`CaseStore::save_if_at`], so several engines sharing one store never
/// both apply the same transition.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn find(&self, case_id: Uuid) -> Result<Option<Case>>;

    /// Insert or overwrite the stored case.
    async fn save(&self, case: &Case) -> Result<()>;

    /// Store a new case. Returns `false` when a case with that id exists.
    async fn insert(&self, case: &Case) -> Result<bool>;

    /// Overwrite the stored case only while it still sits at `expected_step`.
    ///
    /// Returns `false`, leaving the store untouched, when the case is missing
    /// or another writer has already moved it.
    async fn save_if_at(&self, case: &Case, expected_step: &str) -> Result<bool>;
}

/// Persists task records for the database task service.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<()>;

    async fn find(&self, task_id: Uuid) -> Result<Option<Task>>;

    /// Overwrite an existing task. Returns `false` when no such task exists.
    async fn update(&self, task: &Task) -> Result<bool>;

    /// Tasks for a case, oldest first.
    async fn tasks_for_case(&self, case_id: Uuid) -> Result<Vec<Task>>;
}
