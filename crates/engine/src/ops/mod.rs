use std::{fmt, sync::Arc};

use chrono_tz::Tz;
use sea_orm::DatabaseConnection;

use crate::{
    EngineError, ExternalLedger, HierarchyResolver, PlanningWindows, ResultEngine, SqlHierarchy,
    SqlPlanningWindows, SqlStore, Store, TxBudget, period::DEFAULT_TIMEZONE,
};

mod allocations;
mod reconcile;
mod registry;

pub use reconcile::MergeOutcome;
pub use registry::PlannedTotalAudit;

/// Run a block inside a unit of work, committing on success and rolling back
/// on error. The whole block, commit included, is bounded by the budget's
/// timeout.
macro_rules! with_uow {
    ($self:expr, $budget:expr, |$uow:ident| $body:expr) => {{
        let budget: $crate::store::TxBudget = $budget;
        let work = async {
            let mut $uow = $self.store.begin(budget).await?;
            let result: $crate::ResultEngine<_> = $body;
            let value = result?;
            $uow.commit().await?;
            Ok::<_, $crate::EngineError>(value)
        };
        match tokio::time::timeout(budget.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err($crate::EngineError::Conflict(format!(
                "transaction exceeded {} ms",
                budget.timeout.as_millis()
            ))),
        }
    }};
}

pub(crate) use with_uow;

/// Time budgets per operation family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxBudgets {
    pub allocations: TxBudget,
    pub reconciliation: TxBudget,
}

impl Default for TxBudgets {
    fn default() -> Self {
        Self {
            allocations: TxBudget::ALLOCATIONS,
            reconciliation: TxBudget::RECONCILIATION,
        }
    }
}

pub struct Engine {
    store: Arc<dyn Store>,
    hierarchy: Arc<dyn HierarchyResolver>,
    planning: Arc<dyn PlanningWindows>,
    ledger: Arc<dyn ExternalLedger>,
    budgets: TxBudgets,
    timezone: Tz,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn budgets(&self) -> TxBudgets {
        self.budgets
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("budgets", &self.budgets)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn Store>>,
    hierarchy: Option<Arc<dyn HierarchyResolver>>,
    planning: Option<Arc<dyn PlanningWindows>>,
    ledger: Option<Arc<dyn ExternalLedger>>,
    budgets: TxBudgets,
    timezone: Option<Tz>,
}

impl EngineBuilder {
    /// Use the database for storage, hierarchy and planning windows.
    pub fn database(self, db: DatabaseConnection) -> EngineBuilder {
        self.store(SqlStore::new(db.clone()))
            .hierarchy(SqlHierarchy::new(db.clone()))
            .planning_windows(SqlPlanningWindows::new(db))
    }

    pub fn store(mut self, store: impl Store + 'static) -> EngineBuilder {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn hierarchy(mut self, hierarchy: impl HierarchyResolver + 'static) -> EngineBuilder {
        self.hierarchy = Some(Arc::new(hierarchy));
        self
    }

    pub fn planning_windows(mut self, planning: impl PlanningWindows + 'static) -> EngineBuilder {
        self.planning = Some(Arc::new(planning));
        self
    }

    /// Pass the external financial system client
    pub fn ledger(mut self, ledger: impl ExternalLedger + 'static) -> EngineBuilder {
        self.ledger = Some(Arc::new(ledger));
        self
    }

    /// Same as [`EngineBuilder::ledger`], for a client shared with other code.
    pub fn shared_ledger(mut self, ledger: Arc<dyn ExternalLedger>) -> EngineBuilder {
        self.ledger = Some(ledger);
        self
    }

    pub fn budgets(mut self, budgets: TxBudgets) -> EngineBuilder {
        self.budgets = budgets;
        self
    }

    /// Reference timezone for the current fiscal month. Defaults to São Paulo.
    pub fn timezone(mut self, timezone: Tz) -> EngineBuilder {
        self.timezone = Some(timezone);
        self
    }

    /// Construct `Engine`
    pub fn build(self) -> ResultEngine<Engine> {
        let missing = |component: &str| EngineError::KeyNotFound(format!("{component} not set"));
        Ok(Engine {
            store: self.store.ok_or_else(|| missing("store"))?,
            hierarchy: self.hierarchy.ok_or_else(|| missing("hierarchy resolver"))?,
            planning: self.planning.ok_or_else(|| missing("planning windows"))?,
            ledger: self.ledger.ok_or_else(|| missing("external ledger"))?,
            budgets: self.budgets,
            timezone: self.timezone.unwrap_or(DEFAULT_TIMEZONE),
        })
    }
}
