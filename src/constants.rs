//! # System Constants
//!
//! Names shared between the process definition, the engine and the
//! collaborators that publish events into it.

/// Sentinel step a case reaches when its process is finished.
pub const END_STEP: &str = "end";

/// Payload keys every inbound event is expected to carry.
pub mod payload {
    pub const CASE_ID: &str = "case_id";
}

/// Environment variable prefixes and names read at startup.
pub mod env {
    /// Prefix for `config`-crate environment overrides, e.g. `CASEWORK_TASK_SERVICE_BACKEND`.
    pub const CONFIG_PREFIX: &str = "CASEWORK";
    pub const ENVIRONMENT: &str = "CASEWORK_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FILTER: &str = "RUST_LOG";
    pub const DATABASE_URL: &str = "DATABASE_URL";
}

/// Postgres table names used by the `postgres` stores.
pub mod tables {
    pub const CASES: &str = "casework_cases";
    pub const TASKS: &str = "casework_tasks";
}
