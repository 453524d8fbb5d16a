// Business process state machine
//
// A process is an immutable graph of named steps plus a transition table keyed
// by (step, event). The engine walks cases through that graph as events arrive.

pub mod definition;
pub mod engine;
pub mod states;
pub mod step;

// Re-export main types for convenient access
pub use crate::constants::END_STEP;
pub use definition::{
    BusinessProcessDefinition, BusinessProcessDefinitionBuilder, CurrentStep, Transition,
};
pub use engine::{BusinessProcessEngine, ExecutionOutcome};
pub use states::{CaseStatus, TaskStatus};
pub use step::{EnterError, Step, StepContext, StepOutcome, SystemProcess, UserTask};
