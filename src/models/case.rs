//! # Case Model
//!
//! One applicant's journey through a single business process instance.
//!
//! ## Overview
//!
//! A `Case` records which business process it belongs to, the step it is
//! currently sitting at, and whether it is still open. The step pointer is
//! only ever moved by [`BusinessProcessEngine`](crate::state_machine::BusinessProcessEngine);
//! outside the crate `status` and `current_step` are read through getters.
//!
//! ## Invariants
//!
//! - `current_step` is a step of the owning process or [`END_STEP`]
//! - `status` is [`CaseStatus::Closed`] exactly when `current_step` is [`END_STEP`]
//!
//! ## Database Schema
//!
//! Maps to the `casework_cases` table when the `postgres` feature is enabled:
//! - `id`: Primary key (UUID)
//! - `process_name`: Owning process (VARCHAR)
//! - `status`: `open` | `closed` (VARCHAR)
//! - `current_step`: Step name or `end` (VARCHAR)
//! - `created_at`, `updated_at`: TIMESTAMPTZ

use crate::constants::END_STEP;
use crate::state_machine::states::CaseStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub process_name: String,
    status: CaseStatus,
    current_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// Create a case positioned at `start_step` with a fresh id.
    pub fn new(process_name: impl Into<String>, start_step: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), process_name, start_step)
    }

    /// The status follows the step: a case created at [`END_STEP`] is closed.
    pub fn with_id(
        id: Uuid,
        process_name: impl Into<String>,
        start_step: impl Into<String>,
    ) -> Self {
        let current_step = start_step.into();
        let now = Utc::now();
        Self {
            id,
            process_name: process_name.into(),
            status: status_for(&current_step),
            current_step,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a case exactly as a store recorded it, without repairing it.
    #[cfg_attr(not(any(feature = "postgres", test)), allow(dead_code))]
    pub(crate) fn restore(
        id: Uuid,
        process_name: String,
        status: CaseStatus,
        current_step: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            process_name,
            status,
            current_step,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn current_step(&self) -> &str {
        &self.current_step
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the status agrees with the step pointer.
    ///
    /// Always true for cases built through this type; a stored or
    /// deserialized record can still disagree.
    pub fn is_consistent(&self) -> bool {
        self.status == status_for(&self.current_step)
    }

    /// Move the case to `step`, closing it when `step` is the end step.
    pub(crate) fn move_to(&mut self, step: &str) {
        self.current_step = step.to_string();
        self.status = status_for(step);
        self.updated_at = Utc::now();
    }
}

fn status_for(step: &str) -> CaseStatus {
    if step == END_STEP {
        CaseStatus::Closed
    } else {
        CaseStatus::Open
    }
}
