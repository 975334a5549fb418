use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, IsolationLevel, QueryFilter, QueryOrder,
    SqlErr, Statement, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    AllocationFilter, BudgetLine, EngineError, ExecutionSnapshot, Money, PlannedAllocation,
    ResultEngine, SnapshotKey, allocations, budget_lines, error::classify_db_error,
    execution_snapshots,
};

use super::{Store, TxBudget, UnitOfWork};

/// sea-orm backed store. Units run at Serializable isolation.
#[derive(Clone, Debug)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn begin(&self, budget: TxBudget) -> ResultEngine<Box<dyn UnitOfWork>> {
        let begin = self
            .database
            .begin_with_config(Some(IsolationLevel::Serializable), None);
        let tx = match tokio::time::timeout(budget.max_wait, begin).await {
            Ok(result) => result.map_err(classify_db_error)?,
            Err(_) => {
                return Err(EngineError::Conflict(format!(
                    "lock wait exceeded {} ms",
                    budget.max_wait.as_millis()
                )));
            }
        };
        if tx.get_database_backend() == DbBackend::Sqlite {
            // SQLite begins deferred: locks are taken by the statements, so
            // the wait budget has to bound each of them.
            tx.execute_unprepared(&format!(
                "PRAGMA busy_timeout = {}",
                budget.max_wait.as_millis()
            ))
            .await
            .map_err(classify_db_error)?;
        }
        Ok(Box::new(SqlUnitOfWork { tx }))
    }
}

struct SqlUnitOfWork {
    tx: DatabaseTransaction,
}

#[async_trait]
impl UnitOfWork for SqlUnitOfWork {
    async fn line(&mut self, year: i32, line_code: &str) -> ResultEngine<Option<BudgetLine>> {
        let model = budget_lines::Entity::find_by_id((year, line_code.to_string()))
            .one(&self.tx)
            .await
            .map_err(classify_db_error)?;
        Ok(model.map(BudgetLine::from))
    }

    async fn save_line_totals(&mut self, line: &BudgetLine) -> ResultEngine<()> {
        budget_lines::totals_active_model(line)
            .update(&self.tx)
            .await
            .map_err(|err| match err {
                DbErr::RecordNotUpdated => EngineError::InvariantViolation(format!(
                    "budget line {}/{} disappeared",
                    line.line_code, line.year
                )),
                other => classify_db_error(other),
            })?;
        Ok(())
    }

    async fn active_allocation_sum(&mut self, year: i32, line_code: &str) -> ResultEngine<Money> {
        let stmt = Statement::from_sql_and_values(
            self.tx.get_database_backend(),
            "SELECT COALESCE(SUM(value_minor), 0) AS sum \
             FROM planned_allocations \
             WHERE year = ? AND line_code = ? AND removed_at IS NULL",
            vec![year.into(), line_code.into()],
        );
        let row = self.tx.query_one(stmt).await.map_err(classify_db_error)?;
        let sum: i64 = match row {
            Some(row) => row.try_get("", "sum").map_err(classify_db_error)?,
            None => 0,
        };
        Ok(Money::new(sum))
    }

    async fn allocation(&mut self, id: Uuid) -> ResultEngine<Option<PlannedAllocation>> {
        allocations::Entity::find_by_id(id.to_string())
            .one(&self.tx)
            .await
            .map_err(classify_db_error)?
            .map(PlannedAllocation::try_from)
            .transpose()
    }

    async fn insert_allocation(&mut self, allocation: &PlannedAllocation) -> ResultEngine<()> {
        allocations::ActiveModel::from(allocation)
            .insert(&self.tx)
            .await
            .map_err(classify_db_error)?;
        Ok(())
    }

    async fn update_allocation(&mut self, allocation: &PlannedAllocation) -> ResultEngine<()> {
        allocations::ActiveModel::from(allocation)
            .update(&self.tx)
            .await
            .map_err(classify_db_error)?;
        Ok(())
    }

    async fn remove_allocation(
        &mut self,
        id: Uuid,
        removed_by: &str,
        removed_at: DateTime<Utc>,
    ) -> ResultEngine<bool> {
        let result = allocations::Entity::update_many()
            .col_expr(allocations::Column::RemovedBy, Expr::value(removed_by))
            .col_expr(allocations::Column::RemovedAt, Expr::value(removed_at))
            .filter(allocations::Column::Id.eq(id.to_string()))
            .filter(allocations::Column::RemovedAt.is_null())
            .exec(&self.tx)
            .await
            .map_err(classify_db_error)?;
        Ok(result.rows_affected == 1)
    }

    async fn allocations(
        &mut self,
        filter: &AllocationFilter,
    ) -> ResultEngine<Vec<PlannedAllocation>> {
        let mut query = allocations::Entity::find()
            .filter(allocations::Column::Year.eq(filter.year))
            .filter(allocations::Column::RemovedAt.is_null());
        if let Some(line_code) = &filter.line_code {
            query = query.filter(allocations::Column::LineCode.eq(line_code.as_str()));
        }
        if let Some(goal_id) = filter.goal_id {
            query = query.filter(allocations::Column::GoalId.eq(goal_id));
        }
        query
            .order_by_asc(allocations::Column::GoalId)
            .order_by_asc(allocations::Column::SubGoalId)
            .order_by_asc(allocations::Column::TaskId)
            .order_by_asc(allocations::Column::CreatedAt)
            .all(&self.tx)
            .await
            .map_err(classify_db_error)?
            .into_iter()
            .map(PlannedAllocation::try_from)
            .collect()
    }

    async fn snapshot(&mut self, key: &SnapshotKey) -> ResultEngine<Option<ExecutionSnapshot>> {
        execution_snapshots::Entity::find()
            .filter(execution_snapshots::Column::Year.eq(key.year))
            .filter(execution_snapshots::Column::LineCode.eq(key.line_code.as_str()))
            .filter(execution_snapshots::Column::ProcessId.eq(key.process_id.as_str()))
            .filter(
                execution_snapshots::Column::CommitmentNoteId.eq(key.commitment_note_id.as_str()),
            )
            .one(&self.tx)
            .await
            .map_err(classify_db_error)?
            .map(ExecutionSnapshot::try_from)
            .transpose()
    }

    async fn insert_snapshot(&mut self, snapshot: &ExecutionSnapshot) -> ResultEngine<()> {
        execution_snapshots::ActiveModel::from(snapshot)
            .insert(&self.tx)
            .await
            .map_err(|err| match err.sql_err() {
                // Another reconciliation inserted the same key first.
                Some(SqlErr::UniqueConstraintViolation(detail)) => {
                    tracing::warn!(%detail, "snapshot inserted concurrently");
                    EngineError::Conflict("snapshot inserted concurrently".to_string())
                }
                _ => classify_db_error(err),
            })?;
        Ok(())
    }

    async fn update_snapshot(&mut self, snapshot: &ExecutionSnapshot) -> ResultEngine<()> {
        execution_snapshots::ActiveModel::from(snapshot)
            .update(&self.tx)
            .await
            .map_err(classify_db_error)?;
        Ok(())
    }

    async fn snapshots_for_note(
        &mut self,
        year: i32,
        commitment_note_id: &str,
    ) -> ResultEngine<Vec<ExecutionSnapshot>> {
        execution_snapshots::Entity::find()
            .filter(execution_snapshots::Column::Year.eq(year))
            .filter(execution_snapshots::Column::CommitmentNoteId.eq(commitment_note_id))
            .order_by_asc(execution_snapshots::Column::LineCode)
            .order_by_asc(execution_snapshots::Column::ProcessId)
            .all(&self.tx)
            .await
            .map_err(classify_db_error)?
            .into_iter()
            .map(ExecutionSnapshot::try_from)
            .collect()
    }

    async fn commit(self: Box<Self>) -> ResultEngine<()> {
        self.tx.commit().await.map_err(classify_db_error)
    }
}
