//! Postgres pool setup for the `postgres` stores.
//!
//! ```rust,no_run
//! use casework::config::EngineConfig;
//! use casework::database::DatabaseConnection;
//! use casework::models::TaskTypeRegistry;
//! use casework::services::task_service_from_config;
//! use std::sync::Arc;
//!
//! # async fn wire() -> casework::Result<()> {
//! let config = EngineConfig::from_env()?;
//! let connection = DatabaseConnection::from_config(&config).await?;
//!
//! let cases = Arc::new(connection.case_store());
//! let tasks = task_service_from_config(
//!     &config,
//!     TaskTypeRegistry::new(),
//!     Arc::new(connection.task_store()),
//! );
//! # let _ = (cases, tasks);
//! # Ok(())
//! # }
//! ```

use super::postgres::{PgCaseStore, PgTaskStore};
use crate::config::EngineConfig;
use crate::constants::env;
use sqlx::PgPool;
use tracing::info;

const DEVELOPMENT_DATABASE_URL: &str = "postgresql://localhost/casework_development";

#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    /// Connect to the configured database.
    ///
    /// `database_url` from configuration wins, then `DATABASE_URL`, then the
    /// local development database.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, sqlx::Error> {
        let url = database_url(config, std::env::var(env::DATABASE_URL).ok());
        Self::connect(&url).await
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        info!("Connected to case database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn case_store(&self) -> PgCaseStore {
        PgCaseStore::new(self.pool.clone())
    }

    pub fn task_store(&self) -> PgTaskStore {
        PgTaskStore::new(self.pool.clone())
    }
}

fn database_url(config: &EngineConfig, from_env: Option<String>) -> String {
    config
        .database_url
        .clone()
        .or(from_env)
        .unwrap_or_else(|| DEVELOPMENT_DATABASE_URL.to_string())
}
