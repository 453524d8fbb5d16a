pub mod case;
pub mod task;

// Re-export core models for easy access
pub use case::Case;
pub use task::{Task, TaskType, TaskTypeRegistry};
