use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{BudgetLine, EngineError, Money, ResultEngine, UnitOfWork};

use super::{Engine, with_uow};

/// Stored running total next to an independent aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTotalAudit {
    pub stored: Money,
    pub recomputed: Money,
}

impl PlannedTotalAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.recomputed
    }
}

impl Engine {
    /// Read-only projection of a budget line.
    pub async fn budget_line(&self, year: i32, line_code: &str) -> ResultEngine<BudgetLine> {
        with_uow!(self, self.budgets.allocations, |uow| {
            uow.line(year, line_code).await?.ok_or_else(|| {
                EngineError::KeyNotFound(format!("budget line {line_code}/{year}"))
            })
        })
    }

    /// Compares `planned_total` with the sum of active allocations.
    ///
    /// Never writes: the running total is only maintained by deltas.
    pub async fn audit_planned_total(
        &self,
        year: i32,
        line_code: &str,
    ) -> ResultEngine<PlannedTotalAudit> {
        with_uow!(self, self.budgets.allocations, |uow| {
            let line = uow
                .line(year, line_code)
                .await?
                .ok_or_else(|| EngineError::LineMissing {
                    year,
                    line_code: line_code.to_string(),
                })?;
            let recomputed = uow.active_allocation_sum(year, line_code).await?;
            Ok(PlannedTotalAudit {
                stored: line.planned_total,
                recomputed,
            })
        })
    }

    /// Fails with [`EngineError::LineMissing`] unless the line was imported.
    pub(super) async fn require_line(&self, year: i32, line_code: &str) -> ResultEngine<BudgetLine> {
        self.budget_line(year, line_code)
            .await
            .map_err(|err| match err {
                EngineError::KeyNotFound(_) => EngineError::LineMissing {
                    year,
                    line_code: line_code.to_string(),
                },
                other => other,
            })
    }
}

/// Adds `delta` to a line's running total inside the caller's unit of work.
pub(super) async fn apply_delta(
    uow: &mut dyn UnitOfWork,
    year: i32,
    line_code: &str,
    delta: Money,
) -> ResultEngine<BudgetLine> {
    let mut line = uow
        .line(year, line_code)
        .await?
        .ok_or_else(|| EngineError::LineMissing {
            year,
            line_code: line_code.to_string(),
        })?;
    line.apply_delta(delta)?;
    uow.save_line_totals(&line).await?;
    debug!(
        year,
        line_code,
        %delta,
        planned_total = %line.planned_total,
        over_committed = line.over_committed,
        "planned total adjusted"
    );
    Ok(line)
}
