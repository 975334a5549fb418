//! Goal hierarchy and planning windows.
//!
//! Both are owned by other systems. The engine only resolves ids through the
//! [`HierarchyResolver`] and asks [`PlanningWindows`] whether a year is open;
//! SQL implementations read the collaborator tables, in-memory ones back tests
//! and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine, error::classify_db_error};

/// Hierarchy node an allocation is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum HierarchyRef {
    Goal(i64),
    SubGoal(i64),
    Task(i64),
}

impl HierarchyRef {
    /// Picks the most specific id supplied by the caller.
    ///
    /// Less specific ids are dropped: the resolver derives them from the
    /// chosen node, so conflicting input is overwritten rather than merged.
    pub fn from_ids(
        goal_id: Option<i64>,
        sub_goal_id: Option<i64>,
        task_id: Option<i64>,
    ) -> ResultEngine<Self> {
        match (task_id, sub_goal_id, goal_id) {
            (Some(id), _, _) => Ok(Self::Task(id)),
            (None, Some(id), _) => Ok(Self::SubGoal(id)),
            (None, None, Some(id)) => Ok(Self::Goal(id)),
            (None, None, None) => Err(EngineError::HierarchyRefNotFound(
                "one of goal, sub-goal or task is required".to_string(),
            )),
        }
    }
}

/// Canonical chain for one node, plus the program owning the goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedHierarchy {
    pub goal_id: i64,
    pub sub_goal_id: Option<i64>,
    pub task_id: Option<i64>,
    pub program_id: i64,
}

#[async_trait]
pub trait HierarchyResolver: Send + Sync {
    /// Parent sub-goal of a task.
    async fn task_parent(&self, task_id: i64) -> ResultEngine<i64>;
    /// Parent goal of a sub-goal.
    async fn sub_goal_parent(&self, sub_goal_id: i64) -> ResultEngine<i64>;
    /// Program owning a goal. Also confirms the goal exists.
    async fn goal_program(&self, goal_id: i64) -> ResultEngine<i64>;
}

#[async_trait]
pub trait PlanningWindows: Send + Sync {
    async fn is_open(&self, program_id: i64, year: i32) -> ResultEngine<bool>;
}

/// Walks up from `reference` to the goal.
pub async fn resolve_hierarchy(
    resolver: &dyn HierarchyResolver,
    reference: HierarchyRef,
) -> ResultEngine<ResolvedHierarchy> {
    let (goal_id, sub_goal_id, task_id) = match reference {
        HierarchyRef::Task(task_id) => {
            let sub_goal_id = resolver.task_parent(task_id).await?;
            let goal_id = resolver.sub_goal_parent(sub_goal_id).await?;
            (goal_id, Some(sub_goal_id), Some(task_id))
        }
        HierarchyRef::SubGoal(sub_goal_id) => {
            let goal_id = resolver.sub_goal_parent(sub_goal_id).await?;
            (goal_id, Some(sub_goal_id), None)
        }
        HierarchyRef::Goal(goal_id) => (goal_id, None, None),
    };
    let program_id = resolver.goal_program(goal_id).await?;

    Ok(ResolvedHierarchy {
        goal_id,
        sub_goal_id,
        task_id,
        program_id,
    })
}

/// Fails with [`EngineError::PlanningWindowClosed`] unless `year` is open.
pub async fn ensure_planning_open(
    windows: &dyn PlanningWindows,
    program_id: i64,
    year: i32,
) -> ResultEngine<()> {
    if windows.is_open(program_id, year).await? {
        Ok(())
    } else {
        Err(EngineError::PlanningWindowClosed { program_id, year })
    }
}

/// Reads `goals`, `sub_goals` and `tasks`. Soft-deleted rows are not found.
#[derive(Clone, Debug)]
pub struct SqlHierarchy {
    database: DatabaseConnection,
}

impl SqlHierarchy {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    async fn parent_of(&self, sql: &str, id: i64, column: &str, label: &str) -> ResultEngine<i64> {
        let stmt = Statement::from_sql_and_values(
            self.database.get_database_backend(),
            sql,
            vec![id.into()],
        );
        match self.database.query_one(stmt).await.map_err(classify_db_error)? {
            Some(row) => row.try_get::<i64>("", column).map_err(classify_db_error),
            None => Err(EngineError::HierarchyRefNotFound(format!("{label} {id}"))),
        }
    }
}

#[async_trait]
impl HierarchyResolver for SqlHierarchy {
    async fn task_parent(&self, task_id: i64) -> ResultEngine<i64> {
        self.parent_of(
            "SELECT sub_goal_id FROM tasks WHERE id = ? AND removed_at IS NULL",
            task_id,
            "sub_goal_id",
            "task",
        )
        .await
    }

    async fn sub_goal_parent(&self, sub_goal_id: i64) -> ResultEngine<i64> {
        self.parent_of(
            "SELECT goal_id FROM sub_goals WHERE id = ? AND removed_at IS NULL",
            sub_goal_id,
            "goal_id",
            "sub-goal",
        )
        .await
    }

    async fn goal_program(&self, goal_id: i64) -> ResultEngine<i64> {
        self.parent_of(
            "SELECT program_id FROM goals WHERE id = ? AND removed_at IS NULL",
            goal_id,
            "program_id",
            "goal",
        )
        .await
    }
}

/// Reads `planning_windows(program_id, year, planning_open)`.
#[derive(Clone, Debug)]
pub struct SqlPlanningWindows {
    database: DatabaseConnection,
}

impl SqlPlanningWindows {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl PlanningWindows for SqlPlanningWindows {
    async fn is_open(&self, program_id: i64, year: i32) -> ResultEngine<bool> {
        let stmt = Statement::from_sql_and_values(
            self.database.get_database_backend(),
            "SELECT planning_open FROM planning_windows WHERE program_id = ? AND year = ?",
            vec![program_id.into(), year.into()],
        );
        match self.database.query_one(stmt).await.map_err(classify_db_error)? {
            Some(row) => row
                .try_get::<bool>("", "planning_open")
                .map_err(classify_db_error),
            None => Ok(false),
        }
    }
}

/// In-memory hierarchy, filled with the builder-style `with_*` methods.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHierarchy {
    goals: HashMap<i64, i64>,
    sub_goals: HashMap<i64, i64>,
    tasks: HashMap<i64, i64>,
}

impl InMemoryHierarchy {
    pub fn with_goal(mut self, goal_id: i64, program_id: i64) -> Self {
        self.goals.insert(goal_id, program_id);
        self
    }

    pub fn with_sub_goal(mut self, sub_goal_id: i64, goal_id: i64) -> Self {
        self.sub_goals.insert(sub_goal_id, goal_id);
        self
    }

    pub fn with_task(mut self, task_id: i64, sub_goal_id: i64) -> Self {
        self.tasks.insert(task_id, sub_goal_id);
        self
    }
}

#[async_trait]
impl HierarchyResolver for InMemoryHierarchy {
    async fn task_parent(&self, task_id: i64) -> ResultEngine<i64> {
        self.tasks
            .get(&task_id)
            .copied()
            .ok_or_else(|| EngineError::HierarchyRefNotFound(format!("task {task_id}")))
    }

    async fn sub_goal_parent(&self, sub_goal_id: i64) -> ResultEngine<i64> {
        self.sub_goals
            .get(&sub_goal_id)
            .copied()
            .ok_or_else(|| EngineError::HierarchyRefNotFound(format!("sub-goal {sub_goal_id}")))
    }

    async fn goal_program(&self, goal_id: i64) -> ResultEngine<i64> {
        self.goals
            .get(&goal_id)
            .copied()
            .ok_or_else(|| EngineError::HierarchyRefNotFound(format!("goal {goal_id}")))
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryPlanningWindows {
    open: HashSet<(i64, i32)>,
}

impl InMemoryPlanningWindows {
    pub fn open(mut self, program_id: i64, year: i32) -> Self {
        self.open.insert((program_id, year));
        self
    }
}

#[async_trait]
impl PlanningWindows for InMemoryPlanningWindows {
    async fn is_open(&self, program_id: i64, year: i32) -> ResultEngine<bool> {
        Ok(self.open.contains(&(program_id, year)))
    }
}
