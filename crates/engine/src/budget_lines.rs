//! Budget lines ("dotações").
//!
//! A budget line is an authoritative bucket identified by `(year, line_code)`.
//! Its budgeted figures come from the external financial system and are
//! refreshed out-of-band; the engine only owns the running `planned_total` and
//! the derived `over_committed` flag.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Money, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub year: i32,
    /// External classification code. Opaque: compared, never interpreted.
    pub line_code: String,
    pub initial_value: Money,
    pub current_value: Money,
    pub available_balance: Money,
    /// Sum of `value` over every active allocation referencing this line.
    pub planned_total: Money,
    pub over_committed: bool,
}

impl BudgetLine {
    pub fn new(
        year: i32,
        line_code: impl Into<String>,
        initial_value: Money,
        current_value: Money,
        available_balance: Money,
    ) -> Self {
        Self {
            year,
            line_code: line_code.into(),
            initial_value,
            current_value,
            available_balance,
            planned_total: Money::ZERO,
            over_committed: false,
        }
    }

    /// Adds `delta` (positive or negative) to the running planned total and
    /// re-derives the pressure flag.
    pub fn apply_delta(&mut self, delta: Money) -> ResultEngine<()> {
        self.planned_total = self.planned_total.checked_add(delta).ok_or_else(|| {
            EngineError::InvalidAmount(format!(
                "planned total overflow on line {}/{}",
                self.line_code, self.year
            ))
        })?;
        self.recompute_pressure();
        Ok(())
    }

    /// Planned allocations exceed the currently budgeted value.
    ///
    /// Both sides are integer cents, so the comparison is exact at the cent
    /// boundary.
    pub fn recompute_pressure(&mut self) {
        self.over_committed = self.planned_total > self.current_value;
    }

    /// Amount by which the line is over-committed, if it is.
    pub fn pressure(&self) -> Option<Money> {
        self.over_committed
            .then(|| self.planned_total - self.current_value)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budget_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub year: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub line_code: String,
    pub initial_value_minor: i64,
    pub current_value_minor: i64,
    pub available_balance_minor: i64,
    pub planned_total_minor: i64,
    pub over_committed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for BudgetLine {
    fn from(model: Model) -> Self {
        Self {
            year: model.year,
            line_code: model.line_code,
            initial_value: Money::new(model.initial_value_minor),
            current_value: Money::new(model.current_value_minor),
            available_balance: Money::new(model.available_balance_minor),
            planned_total: Money::new(model.planned_total_minor),
            over_committed: model.over_committed,
        }
    }
}

impl From<&BudgetLine> for ActiveModel {
    fn from(line: &BudgetLine) -> Self {
        Self {
            year: ActiveValue::Set(line.year),
            line_code: ActiveValue::Set(line.line_code.clone()),
            initial_value_minor: ActiveValue::Set(line.initial_value.cents()),
            current_value_minor: ActiveValue::Set(line.current_value.cents()),
            available_balance_minor: ActiveValue::Set(line.available_balance.cents()),
            planned_total_minor: ActiveValue::Set(line.planned_total.cents()),
            over_committed: ActiveValue::Set(line.over_committed),
        }
    }
}

/// Active model touching only the engine-owned columns.
pub(crate) fn totals_active_model(line: &BudgetLine) -> ActiveModel {
    ActiveModel {
        year: ActiveValue::Unchanged(line.year),
        line_code: ActiveValue::Unchanged(line.line_code.clone()),
        planned_total_minor: ActiveValue::Set(line.planned_total.cents()),
        over_committed: ActiveValue::Set(line.over_committed),
        ..Default::default()
    }
}
