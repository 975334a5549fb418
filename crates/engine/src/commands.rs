//! Command structs for engine operations.
//!
//! These types group parameters for allocation writes and reconciliation
//! queries, keeping call sites readable and avoiding long argument lists.

use uuid::Uuid;

use crate::{HierarchyRef, Money};

/// Create a planned allocation.
#[derive(Clone, Debug)]
pub struct CreateAllocationCmd {
    pub year: i32,
    pub line_code: String,
    pub value: Money,
    pub hierarchy: HierarchyRef,
    pub user_id: String,
}

impl CreateAllocationCmd {
    #[must_use]
    pub fn new(
        year: i32,
        line_code: impl Into<String>,
        value: Money,
        hierarchy: HierarchyRef,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            year,
            line_code: line_code.into(),
            value,
            hierarchy,
            user_id: user_id.into(),
        }
    }
}

/// Update a planned allocation. Fields left `None` keep their value.
#[derive(Clone, Debug)]
pub struct UpdateAllocationCmd {
    pub id: Uuid,
    pub value: Option<Money>,
    pub line_code: Option<String>,
    pub hierarchy: Option<HierarchyRef>,
    pub user_id: String,
}

impl UpdateAllocationCmd {
    #[must_use]
    pub fn new(id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            id,
            value: None,
            line_code: None,
            hierarchy: None,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn value(mut self, value: Money) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn line_code(mut self, line_code: impl Into<String>) -> Self {
        self.line_code = Some(line_code.into());
        self
    }

    #[must_use]
    pub fn hierarchy(mut self, hierarchy: HierarchyRef) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }
}

/// Realized value of one commitment note.
#[derive(Clone, Debug)]
pub struct RealizedValueQuery {
    pub note_id: String,
    pub year: i32,
    /// Defaults to the most recent applicable month of `year`.
    pub month: Option<u32>,
    /// Fail with `AmbiguousResult` when the note spans more than one line.
    pub single_line: bool,
}

impl RealizedValueQuery {
    #[must_use]
    pub fn new(note_id: impl Into<String>, year: i32) -> Self {
        Self {
            note_id: note_id.into(),
            year,
            month: None,
            single_line: false,
        }
    }

    #[must_use]
    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    #[must_use]
    pub fn single_line(mut self) -> Self {
        self.single_line = true;
        self
    }
}
