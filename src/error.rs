use crate::state_machine::CaseStatus;
use thiserror::Error;
use uuid::Uuid;

/// Problems found while building a [`BusinessProcessDefinition`].
///
/// Any of these makes the process unusable, so they surface once at
/// initialization time and never while cases are being processed.
///
/// [`BusinessProcessDefinition`]: crate::state_machine::BusinessProcessDefinition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("process '{process}' has no start step")]
    MissingStartStep { process: String },

    #[error("process '{process}' starts at unregistered step '{step}'")]
    UnknownStartStep { process: String, step: String },

    #[error("process '{process}' registers step '{step}' more than once")]
    DuplicateStep { process: String, step: String },

    #[error("process '{process}' uses the reserved step name '{step}'")]
    ReservedStepName { process: String, step: String },

    #[error("process '{process}' has a transition out of unregistered step '{step}' on '{event}'")]
    UnknownSourceStep {
        process: String,
        step: String,
        event: String,
    },

    #[error("process '{process}' has a transition from '{from}' on '{event}' to unregistered step '{to}'")]
    UnknownTargetStep {
        process: String,
        from: String,
        event: String,
        to: String,
    },

    #[error("process '{process}' registers '{event}' out of step '{step}' more than once")]
    DuplicateTransition {
        process: String,
        step: String,
        event: String,
    },
}

/// Errors raised by the engine, its collaborators and configuration loading.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] DefinitionError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Case not found: {0}")]
    CaseNotFound(Uuid),

    /// The stored case points at a step the process lacks, or its status
    /// disagrees with its step.
    #[error("Case {case_id} of process '{process}' is in an invalid state: {status} at '{step}'")]
    InvalidCaseState {
        case_id: Uuid,
        process: String,
        step: String,
        status: CaseStatus,
    },

    /// A SystemProcess callback failed after the case already moved into its step.
    #[error("Step '{step}' failed for case {case_id}: {source}")]
    StepExecutionFailure {
        case_id: Uuid,
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True when the case already advanced and only the step's side effect failed.
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::StepExecutionFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
