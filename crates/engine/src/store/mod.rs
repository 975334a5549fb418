//! Unit-of-work seam between the engine and its storage.
//!
//! Every mutating operation runs inside one [`UnitOfWork`] opened with a
//! [`TxBudget`]. A unit that is dropped without [`UnitOfWork::commit`] rolls
//! back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    AllocationFilter, BudgetLine, ExecutionSnapshot, Money, PlannedAllocation, ResultEngine,
    SnapshotKey,
};

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Lock-wait and overall time budget of one unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxBudget {
    /// How long `begin` and each statement may wait for a lock.
    pub max_wait: Duration,
    /// How long the whole unit may run, commit included.
    pub timeout: Duration,
}

impl TxBudget {
    pub const fn new(max_wait: Duration, timeout: Duration) -> Self {
        Self { max_wait, timeout }
    }

    /// Allocation writes.
    pub const ALLOCATIONS: TxBudget =
        TxBudget::new(Duration::from_secs(5), Duration::from_secs(100));

    /// One merged commitment fact.
    pub const RECONCILIATION: TxBudget =
        TxBudget::new(Duration::from_secs(15), Duration::from_secs(60));
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a serializable unit of work.
    async fn begin(&self, budget: TxBudget) -> ResultEngine<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn line(&mut self, year: i32, line_code: &str) -> ResultEngine<Option<BudgetLine>>;
    /// Persists `planned_total` and `over_committed` only.
    async fn save_line_totals(&mut self, line: &BudgetLine) -> ResultEngine<()>;
    /// Sum of `value` over active allocations of a line.
    async fn active_allocation_sum(&mut self, year: i32, line_code: &str) -> ResultEngine<Money>;

    async fn allocation(&mut self, id: Uuid) -> ResultEngine<Option<PlannedAllocation>>;
    async fn insert_allocation(&mut self, allocation: &PlannedAllocation) -> ResultEngine<()>;
    async fn update_allocation(&mut self, allocation: &PlannedAllocation) -> ResultEngine<()>;
    /// Marks an active allocation removed. Returns `false` if it already was.
    async fn remove_allocation(
        &mut self,
        id: Uuid,
        removed_by: &str,
        removed_at: DateTime<Utc>,
    ) -> ResultEngine<bool>;
    async fn allocations(&mut self, filter: &AllocationFilter)
    -> ResultEngine<Vec<PlannedAllocation>>;

    async fn snapshot(&mut self, key: &SnapshotKey) -> ResultEngine<Option<ExecutionSnapshot>>;
    async fn insert_snapshot(&mut self, snapshot: &ExecutionSnapshot) -> ResultEngine<()>;
    async fn update_snapshot(&mut self, snapshot: &ExecutionSnapshot) -> ResultEngine<()>;
    async fn snapshots_for_note(
        &mut self,
        year: i32,
        commitment_note_id: &str,
    ) -> ResultEngine<Vec<ExecutionSnapshot>>;

    async fn commit(self: Box<Self>) -> ResultEngine<()>;
}
