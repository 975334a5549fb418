#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    BudgetLine, BudgetQuery, BudgetedAmount, CommitmentFact, CommitmentQuery, Engine,
    ExternalError, ExternalLedger, InMemoryHierarchy, InMemoryPlanningWindows, MemoryStore, Money,
    TxBudgets,
};
use migration::MigratorTrait;
use uuid::Uuid;

pub const YEAR: i32 = 2024;
pub const LINE_A: &str = "16.10.12.306.3016.2.873.33903900.00";
pub const LINE_B: &str = "16.10.12.306.3016.2.873.44905200.00";

/// Goal 1 (program 100, open in 2024) > sub-goal 10 > task 1000.
/// Goal 2 belongs to program 200, closed in 2024.
pub const OPEN_GOAL: i64 = 1;
pub const CLOSED_GOAL: i64 = 2;
pub const SUB_GOAL: i64 = 10;
pub const TASK: i64 = 1000;

/// External ledger answering every commitment query with the same script.
#[derive(Default)]
pub struct ScriptedLedger {
    response: Mutex<Option<Result<Vec<CommitmentFact>, ExternalError>>>,
    queries: Mutex<Vec<CommitmentQuery>>,
    calls: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: Result<Vec<CommitmentFact>, ExternalError>) {
        *self.response.lock().unwrap() = Some(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<CommitmentQuery> {
        self.queries.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ExternalLedger for ScriptedLedger {
    async fn fetch_commitments(
        &self,
        query: &CommitmentQuery,
    ) -> Result<Vec<CommitmentFact>, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        self.response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_budgeted_amount(
        &self,
        _query: &BudgetQuery,
    ) -> Result<Vec<BudgetedAmount>, ExternalError> {
        Ok(Vec::new())
    }
}

pub fn fact(line_code: &str, process_id: &str, committed: i64, paid: i64) -> CommitmentFact {
    CommitmentFact {
        line_code: line_code.to_string(),
        process_id: process_id.to_string(),
        committed_value: Money::new(committed),
        paid_value: Money::new(paid),
    }
}

async fn exec(db: &DatabaseConnection, sql: &str, values: Vec<sea_orm::Value>) {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        sql,
        values,
    ))
    .await
    .unwrap();
}

pub async fn insert_line(db: &DatabaseConnection, line_code: &str, current_minor: i64) {
    exec(
        db,
        "INSERT INTO budget_lines \
         (year, line_code, initial_value_minor, current_value_minor, available_balance_minor, \
          planned_total_minor, over_committed) \
         VALUES (?, ?, ?, ?, ?, 0, 0)",
        vec![
            YEAR.into(),
            line_code.into(),
            current_minor.into(),
            current_minor.into(),
            current_minor.into(),
        ],
    )
    .await;
}

/// Migrates `db` and loads the fixture hierarchy, planning windows and
/// lines A (1000.00) and B (5000.00).
async fn seed(db: &DatabaseConnection) {
    migration::Migrator::up(db, None).await.unwrap();

    exec(
        db,
        "INSERT INTO goals (id, program_id) VALUES (?, ?), (?, ?)",
        vec![OPEN_GOAL.into(), 100i64.into(), CLOSED_GOAL.into(), 200i64.into()],
    )
    .await;
    exec(
        db,
        "INSERT INTO sub_goals (id, goal_id) VALUES (?, ?)",
        vec![SUB_GOAL.into(), OPEN_GOAL.into()],
    )
    .await;
    exec(
        db,
        "INSERT INTO tasks (id, sub_goal_id) VALUES (?, ?)",
        vec![TASK.into(), SUB_GOAL.into()],
    )
    .await;
    exec(
        db,
        "INSERT INTO planning_windows (program_id, year, planning_open) VALUES (?, ?, 1), (?, ?, 0)",
        vec![100i64.into(), YEAR.into(), 200i64.into(), YEAR.into()],
    )
    .await;
    insert_line(db, LINE_A, 1000_00).await;
    insert_line(db, LINE_B, 5000_00).await;
}

/// Engine over a seeded `sqlite::memory:` database.
pub async fn sqlite_engine(ledger: Arc<ScriptedLedger>) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    seed(&db).await;

    let engine = Engine::builder()
        .database(db.clone())
        .shared_ledger(ledger)
        .build()
        .unwrap();
    (engine, db)
}

/// Engine over a seeded database file, so several pooled connections
/// really run side by side. Returns the url for extra connections and the
/// path to delete afterwards.
pub async fn file_sqlite_engine(
    budgets: TxBudgets,
) -> (Engine, DatabaseConnection, String, PathBuf) {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!("engine_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    seed(&db).await;

    let engine = Engine::builder()
        .database(db.clone())
        .shared_ledger(ScriptedLedger::new())
        .budgets(budgets)
        .build()
        .unwrap();
    (engine, db, url, path)
}

pub fn memory_hierarchy() -> InMemoryHierarchy {
    InMemoryHierarchy::default()
        .with_goal(OPEN_GOAL, 100)
        .with_goal(CLOSED_GOAL, 200)
        .with_sub_goal(SUB_GOAL, OPEN_GOAL)
        .with_task(TASK, SUB_GOAL)
}

pub fn memory_windows() -> InMemoryPlanningWindows {
    InMemoryPlanningWindows::default().open(100, YEAR)
}

pub fn line(line_code: &str, current_minor: i64) -> BudgetLine {
    BudgetLine::new(
        YEAR,
        line_code,
        Money::new(current_minor),
        Money::new(current_minor),
        Money::new(current_minor),
    )
}

/// Engine over a [`MemoryStore`] seeded with lines A and B.
pub async fn memory_engine(ledger: Arc<ScriptedLedger>) -> (Engine, MemoryStore) {
    let store = MemoryStore::new();
    store.insert_line(line(LINE_A, 1000_00)).await;
    store.insert_line(line(LINE_B, 5000_00)).await;

    let engine = Engine::builder()
        .store(store.clone())
        .hierarchy(memory_hierarchy())
        .planning_windows(memory_windows())
        .shared_ledger(ledger)
        .build()
        .unwrap();
    (engine, store)
}
