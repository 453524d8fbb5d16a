//! # Engine Configuration
//!
//! Process-wide settings layered from an optional file and `CASEWORK_*`
//! environment variables using the `config` crate.
//!
//! ```rust,no_run
//! use casework::config::EngineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(Some("config/casework.toml".as_ref()))?;
//! println!("task service backend: {}", config.task_service_backend);
//! # Ok(())
//! # }
//! ```

use crate::constants::env;
use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Which task service implementation user task steps go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskServiceBackend {
    /// Persist tasks through a task store
    #[default]
    Database,
    /// Keep tasks in memory for tests and demos
    Stub,
}

impl fmt::Display for TaskServiceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Stub => write!(f, "stub"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deployment environment (`development`, `test`, `production`)
    pub environment: String,
    pub task_service_backend: TaskServiceBackend,
    /// `tracing` filter directive; falls back to an environment-based level
    pub log_filter: Option<String>,
    pub json_logs: bool,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            task_service_backend: TaskServiceBackend::Database,
            log_filter: None,
            json_logs: false,
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Load from an optional config file, then apply `CASEWORK_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(env::CONFIG_PREFIX))
    }

    /// Environment overrides only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub(crate) fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder.add_source(environment.try_parsing(true)).build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
