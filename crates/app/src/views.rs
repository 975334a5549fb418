//! Engine values to wire types.

use api_types::{
    ErrorResponse,
    allocation::AllocationView,
    budget_line::{BudgetLineView, BudgetedAmountView, PlannedTotalAuditView},
    realized::ExecutionSnapshotView,
};
use engine::{BudgetLine, BudgetedAmount, EngineError, ExecutionSnapshot, PlannedTotalAudit};

pub fn budget_line(line: &BudgetLine) -> BudgetLineView {
    BudgetLineView {
        year: line.year,
        line_code: line.line_code.clone(),
        initial_value: line.initial_value.to_string(),
        current_value: line.current_value.to_string(),
        available_balance: line.available_balance.to_string(),
        planned_total: line.planned_total.to_string(),
        over_committed: line.over_committed,
        pressure: line.pressure().map(|p| p.to_string()),
    }
}

pub fn allocation(view: &engine::AllocationView) -> AllocationView {
    let a = &view.allocation;
    AllocationView {
        id: a.id,
        year: a.year,
        line_code: a.line_code.clone(),
        value: a.value.to_string(),
        goal_id: a.goal_id,
        sub_goal_id: a.sub_goal_id,
        task_id: a.task_id,
        created_by: a.created_by.clone(),
        created_at: a.created_at,
        updated_by: a.updated_by.clone(),
        updated_at: a.updated_at,
        line: budget_line(&view.line),
    }
}

pub fn snapshot(snapshot: &ExecutionSnapshot) -> ExecutionSnapshotView {
    ExecutionSnapshotView {
        year: snapshot.year,
        line_code: snapshot.line_code.clone(),
        process_id: snapshot.process_id.clone(),
        commitment_note_id: snapshot.commitment_note_id.clone(),
        committed_value: snapshot.committed_value.to_string(),
        paid_value: snapshot.paid_value.to_string(),
        month_used: snapshot.month_used,
        synced_at: snapshot.synced_at,
    }
}

pub fn audit(year: i32, line_code: &str, audit: &PlannedTotalAudit) -> PlannedTotalAuditView {
    PlannedTotalAuditView {
        year,
        line_code: line_code.to_string(),
        stored: audit.stored.to_string(),
        recomputed: audit.recomputed.to_string(),
        consistent: audit.is_consistent(),
    }
}

pub fn budgeted(amount: &BudgetedAmount) -> BudgetedAmountView {
    BudgetedAmountView {
        initial_value: amount.initial_value.to_string(),
        current_value: amount.current_value.to_string(),
        available_balance: amount.available_balance.to_string(),
    }
}

pub fn error(err: &EngineError) -> ErrorResponse {
    ErrorResponse {
        error: err.public_message(),
        status: err.status_code(),
        retryable: err.is_retryable(),
    }
}

#[cfg(test)]
mod tests {
    use engine::Money;

    use super::*;

    #[test]
    fn over_committed_line_carries_its_pressure() {
        let mut line = BudgetLine::new(
            2024,
            "16.10",
            Money::new(1000_00),
            Money::new(1000_00),
            Money::new(1000_00),
        );
        line.apply_delta(Money::new(1000_01)).unwrap();

        let view = budget_line(&line);
        assert_eq!(view.planned_total, "1000.01");
        assert!(view.over_committed);
        assert_eq!(view.pressure.as_deref(), Some("0.01"));
    }

    #[test]
    fn upstream_detail_stays_out_of_the_error_body() {
        let body = error(&EngineError::UpstreamUnavailable {
            status: Some(500),
            detail: "Traceback (most recent call last)".to_string(),
        });
        assert_eq!(body.status, 503);
        assert!(body.retryable);
        assert!(!body.error.contains("Traceback"));
    }
}
