//! # Business Process Definition
//!
//! Immutable graph of named steps, a start step, and the transition table
//! `(step, event) -> next step` that drives cases through a process.
//!
//! ## Building
//!
//! ```rust
//! use casework::state_machine::{BusinessProcessDefinition, Step, END_STEP};
//!
//! let definition = BusinessProcessDefinition::builder("passport")
//!     .step("collect_application", Step::user_task("Collect application", "collect_application"))
//!     .step("review", Step::user_task("Review application", "review_application"))
//!     .start("collect_application")
//!     .transition("collect_application", "application_submitted", "review")
//!     .transition("review", "application_approved", END_STEP)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(definition.next_step("review", "application_approved"), Some(END_STEP));
//! assert_eq!(definition.next_step("review", "application_submitted"), None);
//! ```
//!
//! Validation happens in [`BusinessProcessDefinitionBuilder::build`], so the
//! order of builder calls does not matter. A definition that builds is
//! guaranteed to have a registered start step, no step named `end`, and a
//! transition table whose sources are registered and whose targets are
//! registered or `end`.

use super::step::Step;
use crate::constants::END_STEP;
use crate::error::DefinitionError;
use crate::models::Case;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write;
use tracing::warn;

/// The step a case is currently sitting at.
#[derive(Debug, Clone, Copy)]
pub enum CurrentStep<'a> {
    Step(&'a Step),
    End,
}

impl CurrentStep<'_> {
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<'a> {
    pub from: &'a str,
    pub event: &'a str,
    pub to: &'a str,
}

#[derive(Debug)]
pub struct BusinessProcessDefinition {
    name: String,
    start_step: String,
    steps: BTreeMap<String, Step>,
    transitions: BTreeMap<String, BTreeMap<String, String>>,
}

impl BusinessProcessDefinition {
    pub fn builder(name: impl Into<String>) -> BusinessProcessDefinitionBuilder {
        BusinessProcessDefinitionBuilder {
            name: name.into(),
            start: None,
            steps: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_step(&self) -> &str {
        &self.start_step
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Steps sorted by name.
    pub fn steps(&self) -> impl Iterator<Item = (&str, &Step)> {
        self.steps.iter().map(|(name, step)| (name.as_str(), step))
    }

    /// True for registered steps and for `end`.
    pub fn is_known_step(&self, name: &str) -> bool {
        self.is_terminal(name) || self.steps.contains_key(name)
    }

    /// Resolve the case's current step. `None` means the case points at a
    /// step this definition does not have.
    pub fn current_step(&self, case: &Case) -> Option<CurrentStep<'_>> {
        if self.is_terminal(case.current_step()) {
            return Some(CurrentStep::End);
        }
        self.steps.get(case.current_step()).map(CurrentStep::Step)
    }

    /// Where `event` leads from `step_name`, or `None` when the event does
    /// not apply to that step.
    pub fn next_step(&self, step_name: &str, event_name: &str) -> Option<&str> {
        self.transitions
            .get(step_name)
            .and_then(|by_event| by_event.get(event_name))
            .map(String::as_str)
    }

    pub fn is_terminal(&self, step_name: &str) -> bool {
        step_name == END_STEP
    }

    /// Every event name that appears in the transition table.
    pub fn event_names(&self) -> BTreeSet<&str> {
        self.transitions
            .values()
            .flat_map(|by_event| by_event.keys().map(String::as_str))
            .collect()
    }

    /// Transition rows ordered by source step, then event name.
    pub fn transitions(&self) -> impl Iterator<Item = Transition<'_>> {
        self.transitions.iter().flat_map(|(from, by_event)| {
            by_event.iter().map(move |(event, to)| Transition {
                from: from.as_str(),
                event: event.as_str(),
                to: to.as_str(),
            })
        })
    }

    /// Registered steps no path from the start step reaches.
    pub fn unreachable_steps(&self) -> Vec<&str> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([self.start_step.as_str()]);

        while let Some(step) = queue.pop_front() {
            if !seen.insert(step) {
                continue;
            }
            if let Some(by_event) = self.transitions.get(step) {
                queue.extend(by_event.values().map(String::as_str));
            }
        }

        self.steps
            .keys()
            .map(String::as_str)
            .filter(|name| !seen.contains(name))
            .collect()
    }

    /// Mermaid `stateDiagram-v2` source for this process.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("stateDiagram-v2\n");
        let _ = writeln!(out, "    [*] --> {}", self.start_step);
        for (name, step) in &self.steps {
            let _ = writeln!(out, "    {name} : {} ({})", step.label(), step.kind());
        }
        for transition in self.transitions() {
            let to = if self.is_terminal(transition.to) {
                "[*]"
            } else {
                transition.to
            };
            let _ = writeln!(out, "    {} --> {to} : {}", transition.from, transition.event);
        }
        out
    }
}

/// Collects steps, the start step and transitions for a process.
#[derive(Debug)]
pub struct BusinessProcessDefinitionBuilder {
    name: String,
    start: Option<String>,
    steps: Vec<(String, Step)>,
    transitions: Vec<(String, String, String)>,
}

impl BusinessProcessDefinitionBuilder {
    pub fn step(mut self, name: impl Into<String>, step: Step) -> Self {
        self.steps.push((name.into(), step));
        self
    }

    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    pub fn transition(
        mut self,
        from: impl Into<String>,
        event: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.transitions.push((from.into(), event.into(), to.into()));
        self
    }

    /// Validate and freeze the definition.
    pub fn build(self) -> Result<BusinessProcessDefinition, DefinitionError> {
        let process = self.name;

        let mut steps = BTreeMap::new();
        for (name, step) in self.steps {
            if name == END_STEP {
                return Err(DefinitionError::ReservedStepName {
                    process,
                    step: name,
                });
            }
            if steps.contains_key(&name) {
                return Err(DefinitionError::DuplicateStep {
                    process,
                    step: name,
                });
            }
            steps.insert(name, step);
        }

        let start_step = match self.start {
            None => return Err(DefinitionError::MissingStartStep { process }),
            Some(start) if !steps.contains_key(&start) => {
                return Err(DefinitionError::UnknownStartStep {
                    process,
                    step: start,
                })
            }
            Some(start) => start,
        };

        let mut transitions: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (from, event, to) in self.transitions {
            if !steps.contains_key(&from) {
                return Err(DefinitionError::UnknownSourceStep {
                    process,
                    step: from,
                    event,
                });
            }
            if to != END_STEP && !steps.contains_key(&to) {
                return Err(DefinitionError::UnknownTargetStep {
                    process,
                    from,
                    event,
                    to,
                });
            }

            let by_event = transitions.entry(from.clone()).or_default();
            if by_event.contains_key(&event) {
                return Err(DefinitionError::DuplicateTransition {
                    process,
                    step: from,
                    event,
                });
            }
            by_event.insert(event, to);
        }

        let definition = BusinessProcessDefinition {
            name: process,
            start_step,
            steps,
            transitions,
        };

        let unreachable = definition.unreachable_steps();
        if !unreachable.is_empty() {
            warn!(
                process = %definition.name,
                steps = ?unreachable,
                "Business process has steps that cannot be reached from the start step"
            );
        }

        Ok(definition)
    }
}
