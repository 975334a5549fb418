//! Planned allocations ("orçamento planejado").
//!
//! An allocation commits part of a budget line's funds to one node of the
//! goal hierarchy. Rows are never hard-deleted: removal sets the
//! `removed_by`/`removed_at` markers.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BudgetLine, EngineError, Money, ResultEngine, hierarchy::ResolvedHierarchy, util};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub id: Uuid,
    pub year: i32,
    pub line_code: String,
    pub value: Money,
    pub goal_id: i64,
    pub sub_goal_id: Option<i64>,
    pub task_id: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub removed_by: Option<String>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl PlannedAllocation {
    pub fn new(
        year: i32,
        line_code: String,
        value: Money,
        hierarchy: &ResolvedHierarchy,
        created_by: String,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        util::ensure_positive_value(value)?;
        Ok(Self {
            id: Uuid::new_v4(),
            year,
            line_code,
            value,
            goal_id: hierarchy.goal_id,
            sub_goal_id: hierarchy.sub_goal_id,
            task_id: hierarchy.task_id,
            created_by,
            created_at,
            updated_by: None,
            updated_at: None,
            removed_by: None,
            removed_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }

    /// Overwrites all three hierarchy columns with the resolved chain.
    pub fn set_hierarchy(&mut self, hierarchy: &ResolvedHierarchy) {
        self.goal_id = hierarchy.goal_id;
        self.sub_goal_id = hierarchy.sub_goal_id;
        self.task_id = hierarchy.task_id;
    }
}

/// Which allocations to list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationFilter {
    pub year: i32,
    pub line_code: Option<String>,
    pub goal_id: Option<i64>,
}

impl AllocationFilter {
    pub fn for_year(year: i32) -> Self {
        Self {
            year,
            ..Self::default()
        }
    }

    pub fn line_code(mut self, line_code: impl Into<String>) -> Self {
        self.line_code = Some(line_code.into());
        self
    }

    pub fn goal_id(mut self, goal_id: i64) -> Self {
        self.goal_id = Some(goal_id);
        self
    }

    pub(crate) fn matches(&self, allocation: &PlannedAllocation) -> bool {
        allocation.is_active()
            && allocation.year == self.year
            && self
                .line_code
                .as_deref()
                .is_none_or(|code| code == allocation.line_code)
            && self.goal_id.is_none_or(|id| id == allocation.goal_id)
    }
}

/// An active allocation joined with the figures of its budget line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationView {
    pub allocation: PlannedAllocation,
    pub line: BudgetLine,
}

impl AllocationView {
    /// Pressure of the owning line, shown next to every allocation on it.
    pub fn pressure(&self) -> Option<Money> {
        self.line.pressure()
    }
}

/// Sort order of the listing: goal, sub-goal, task, then creation time.
pub(crate) fn listing_order(a: &PlannedAllocation, b: &PlannedAllocation) -> std::cmp::Ordering {
    (a.goal_id, a.sub_goal_id, a.task_id, a.created_at).cmp(&(
        b.goal_id,
        b.sub_goal_id,
        b.task_id,
        b.created_at,
    ))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "planned_allocations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub year: i32,
    pub line_code: String,
    pub value_minor: i64,
    pub goal_id: i64,
    pub sub_goal_id: Option<i64>,
    pub task_id: Option<i64>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTimeUtc>,
    pub removed_by: Option<String>,
    pub removed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&PlannedAllocation> for ActiveModel {
    fn from(allocation: &PlannedAllocation) -> Self {
        Self {
            id: ActiveValue::Set(allocation.id.to_string()),
            year: ActiveValue::Set(allocation.year),
            line_code: ActiveValue::Set(allocation.line_code.clone()),
            value_minor: ActiveValue::Set(allocation.value.cents()),
            goal_id: ActiveValue::Set(allocation.goal_id),
            sub_goal_id: ActiveValue::Set(allocation.sub_goal_id),
            task_id: ActiveValue::Set(allocation.task_id),
            created_by: ActiveValue::Set(allocation.created_by.clone()),
            created_at: ActiveValue::Set(allocation.created_at),
            updated_by: ActiveValue::Set(allocation.updated_by.clone()),
            updated_at: ActiveValue::Set(allocation.updated_at),
            removed_by: ActiveValue::Set(allocation.removed_by.clone()),
            removed_at: ActiveValue::Set(allocation.removed_at),
        }
    }
}

impl TryFrom<Model> for PlannedAllocation {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: util::parse_uuid(&model.id, "allocation")?,
            year: model.year,
            line_code: model.line_code,
            value: Money::new(model.value_minor),
            goal_id: model.goal_id,
            sub_goal_id: model.sub_goal_id,
            task_id: model.task_id,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_by: model.updated_by,
            updated_at: model.updated_at,
            removed_by: model.removed_by,
            removed_at: model.removed_at,
        })
    }
}
