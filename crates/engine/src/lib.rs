//! Budget allocation ledger and execution reconciliation engine.
//!
//! - [`Engine::create_allocation`], [`Engine::update_allocation`] and
//!   [`Engine::remove_allocation`] keep each [`BudgetLine`]'s running
//!   `planned_total` and pressure flag in step with its active allocations.
//! - [`Engine::realized_value_for_note`] pulls commitment facts from an
//!   [`ExternalLedger`] and merges them into cached [`ExecutionSnapshot`]s.
//!
//! Storage goes through the [`Store`]/[`UnitOfWork`] seam: [`SqlStore`] in
//! production, [`MemoryStore`] in tests.

pub use allocations::{AllocationFilter, AllocationView, PlannedAllocation};
pub use budget_lines::BudgetLine;
pub use commands::{CreateAllocationCmd, RealizedValueQuery, UpdateAllocationCmd};
pub use error::{EngineError, ErrorKind};
pub use execution_snapshots::{ExecutionSnapshot, SnapshotKey};
pub use external::{
    BudgetQuery, BudgetedAmount, CommitmentFact, CommitmentLookup, CommitmentQuery,
    ExternalError, ExternalLedger,
};
pub use hierarchy::{
    HierarchyRef, HierarchyResolver, InMemoryHierarchy, InMemoryPlanningWindows, PlanningWindows,
    ResolvedHierarchy, SqlHierarchy, SqlPlanningWindows,
};
pub use money::Money;
pub use ops::{Engine, EngineBuilder, MergeOutcome, PlannedTotalAudit, TxBudgets};
pub use store::{MemoryStore, SqlStore, Store, TxBudget, UnitOfWork};

pub mod allocations;
pub mod budget_lines;
mod commands;
mod error;
pub mod execution_snapshots;
mod external;
pub mod hierarchy;
mod money;
mod ops;
pub mod period;
pub mod retry;
pub mod store;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
