//! Wire types of the exposed operations.
//!
//! Every monetary field is two-decimal fixed-point text (`"1234.50"`), never a
//! JSON number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod budget_line {
    use super::*;

    /// Read-only projection of a budget line.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BudgetLineView {
        pub year: i32,
        pub line_code: String,
        pub initial_value: String,
        pub current_value: String,
        pub available_balance: String,
        pub planned_total: String,
        pub over_committed: bool,
        /// `planned_total - current_value`, only when over-committed.
        pub pressure: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PlannedTotalAuditView {
        pub year: i32,
        pub line_code: String,
        pub stored: String,
        pub recomputed: String,
        pub consistent: bool,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BudgetedAmountView {
        pub initial_value: String,
        pub current_value: String,
        pub available_balance: String,
    }
}

pub mod allocation {
    use super::*;
    use crate::budget_line::BudgetLineView;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AllocationCreated {
        pub id: Uuid,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AllocationView {
        pub id: Uuid,
        pub year: i32,
        pub line_code: String,
        pub value: String,
        pub goal_id: i64,
        pub sub_goal_id: Option<i64>,
        pub task_id: Option<i64>,
        pub created_by: String,
        pub created_at: DateTime<Utc>,
        pub updated_by: Option<String>,
        pub updated_at: Option<DateTime<Utc>>,
        pub line: BudgetLineView,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AllocationListResponse {
        pub allocations: Vec<AllocationView>,
    }
}

pub mod realized {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExecutionSnapshotView {
        pub year: i32,
        pub line_code: String,
        pub process_id: String,
        pub commitment_note_id: String,
        pub committed_value: String,
        pub paid_value: String,
        pub month_used: u32,
        pub synced_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RealizedValueResponse {
        pub snapshots: Vec<ExecutionSnapshotView>,
    }
}

/// Body of every failed call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
    pub retryable: bool,
}
