//! SQLx-backed stores.
//!
//! Queries are built at runtime so the crate compiles without a live
//! database. The tables named in [`crate::constants::tables`] must already exist.

use super::{CaseStore, TaskStore};
use crate::constants::tables;
use crate::error::{Result, WorkflowError};
use crate::models::{Case, Task};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgCaseStore {
    pool: PgPool,
}

impl PgCaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn case_from_row(row: &PgRow) -> Result<Case> {
    let status: String = row.try_get("status")?;
    Ok(Case::restore(
        row.try_get("id")?,
        row.try_get("process_name")?,
        status.parse().map_err(WorkflowError::InvalidArgument)?,
        row.try_get("current_step")?,
        row.try_get::<DateTime<Utc>, _>("created_at")?,
        row.try_get::<DateTime<Utc>, _>("updated_at")?,
    ))
}

#[async_trait]
impl CaseStore for PgCaseStore {
    async fn find(&self, case_id: Uuid) -> Result<Option<Case>> {
        let sql = format!(
            "SELECT id, process_name, status, current_step, created_at, updated_at \
             FROM {} WHERE id = $1",
            tables::CASES
        );
        let row = sqlx::query(&sql)
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn save(&self, case: &Case) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, process_name, status, current_step, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
               status = EXCLUDED.status, \
               current_step = EXCLUDED.current_step, \
               updated_at = EXCLUDED.updated_at",
            tables::CASES
        );
        sqlx::query(&sql)
            .bind(case.id)
            .bind(&case.process_name)
            .bind(case.status().to_string())
            .bind(case.current_step())
            .bind(case.created_at)
            .bind(case.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert(&self, case: &Case) -> Result<bool> {
        let sql = format!(
            "INSERT INTO {} (id, process_name, status, current_step, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO NOTHING",
            tables::CASES
        );
        let result = sqlx::query(&sql)
            .bind(case.id)
            .bind(&case.process_name)
            .bind(case.status().to_string())
            .bind(case.current_step())
            .bind(case.created_at)
            .bind(case.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_if_at(&self, case: &Case, expected_step: &str) -> Result<bool> {
        // Compare-and-set on the step pointer; a concurrent writer that moved
        // the row first leaves zero rows matched.
        let sql = format!(
            "UPDATE {} SET status = $2, current_step = $3, updated_at = $4 \
             WHERE id = $1 AND current_step = $5",
            tables::CASES
        );
        let result = sqlx::query(&sql)
            .bind(case.id)
            .bind(case.status().to_string())
            .bind(case.current_step())
            .bind(case.updated_at)
            .bind(expected_step)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str =
    "id, case_id, task_type, description, status, assignee_id, created_at, completed_at";

fn task_from_row(row: &PgRow) -> Result<Task> {
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        task_type: row.try_get("task_type")?,
        description: row.try_get("description")?,
        status: status.parse().map_err(WorkflowError::InvalidArgument)?,
        assignee_id: row.try_get("assignee_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
    })
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({TASK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            tables::TASKS
        );
        sqlx::query(&sql)
            .bind(task.id)
            .bind(task.case_id)
            .bind(&task.task_type)
            .bind(&task.description)
            .bind(task.status.to_string())
            .bind(&task.assignee_id)
            .bind(task.created_at)
            .bind(task.completed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(&self, task_id: Uuid) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM {} WHERE id = $1", tables::TASKS);
        let row = sqlx::query(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn update(&self, task: &Task) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET status = $2, assignee_id = $3, completed_at = $4, description = $5 \
             WHERE id = $1",
            tables::TASKS
        );
        let result = sqlx::query(&sql)
            .bind(task.id)
            .bind(task.status.to_string())
            .bind(&task.assignee_id)
            .bind(task.completed_at)
            .bind(&task.description)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tasks_for_case(&self, case_id: Uuid) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM {} WHERE case_id = $1 ORDER BY created_at ASC",
            tables::TASKS
        );
        let rows = sqlx::query(&sql)
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(task_from_row).collect()
    }
}
