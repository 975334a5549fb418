mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use common::{
    LINE_A, LINE_B, OPEN_GOAL, ScriptedLedger, YEAR, fact, file_sqlite_engine, memory_engine,
};
use engine::{
    CreateAllocationCmd, Engine, EngineError, HierarchyRef, MemoryStore, Money,
    RealizedValueQuery, ResultEngine, SqlStore, Store, TxBudget, TxBudgets, UnitOfWork,
    UpdateAllocationCmd, retry::retry_on_conflict,
};
use sea_orm::{ConnectionTrait, Database, TransactionTrait};

fn create_cmd(line_code: &str, value: i64) -> CreateAllocationCmd {
    CreateAllocationCmd::new(
        YEAR,
        line_code,
        Money::new(value),
        HierarchyRef::Goal(OPEN_GOAL),
        "planner",
    )
}

async fn planned_total(engine: &Engine, line_code: &str) -> Money {
    engine
        .budget_line(YEAR, line_code)
        .await
        .unwrap()
        .planned_total
}

#[tokio::test]
async fn concurrent_creates_on_one_line_serialize_with_retry() {
    let (engine, _store) = memory_engine(ScriptedLedger::new()).await;
    let attempts = AtomicUsize::new(0);

    let create = |value: i64| {
        let engine = &engine;
        let attempts = &attempts;
        retry_on_conflict(3, Duration::from_millis(1), move || {
            attempts.fetch_add(1, Ordering::SeqCst);
            engine.create_allocation(create_cmd(LINE_A, value))
        })
    };

    let (first, second) = tokio::join!(create(100_00), create(200_00));
    first.unwrap();
    second.unwrap();

    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(300_00));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let audit = engine.audit_planned_total(YEAR, LINE_A).await.unwrap();
    assert!(audit.is_consistent());
}

#[tokio::test]
async fn losing_writer_gets_a_conflict_and_leaves_no_trace() {
    let (engine, _store) = memory_engine(ScriptedLedger::new()).await;

    let (first, second) = tokio::join!(
        engine.create_allocation(create_cmd(LINE_A, 100_00)),
        engine.create_allocation(create_cmd(LINE_A, 200_00)),
    );

    let (winner, loser) = match (first, second) {
        (Ok(_), Err(err)) => (100_00, err),
        (Err(err), Ok(_)) => (200_00, err),
        other => panic!("expected exactly one conflict, got {other:?}"),
    };
    assert!(matches!(loser, EngineError::Conflict(_)));
    assert!(loser.is_retryable());
    assert_eq!(loser.status_code(), 409);

    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(winner));
    let views = engine
        .list_allocations(engine::AllocationFilter::for_year(YEAR))
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
}

#[tokio::test]
async fn readers_never_see_half_of_a_move() {
    let (engine, store) = memory_engine(ScriptedLedger::new()).await;
    let id = engine
        .create_allocation(create_cmd(LINE_A, 500_00))
        .await
        .unwrap();

    let read_both = async {
        let mut uow = store.begin(TxBudget::ALLOCATIONS).await.unwrap();
        let a = uow.line(YEAR, LINE_A).await.unwrap().unwrap();
        tokio::task::yield_now().await;
        let b = uow.line(YEAR, LINE_B).await.unwrap().unwrap();
        a.planned_total + b.planned_total
    };
    let (moved, seen) = tokio::join!(
        engine.update_allocation(UpdateAllocationCmd::new(id, "planner").line_code(LINE_B)),
        read_both,
    );
    moved.unwrap();

    assert_eq!(seen, Money::new(500_00));
    assert_eq!(planned_total(&engine, LINE_A).await, Money::ZERO);
    assert_eq!(planned_total(&engine, LINE_B).await, Money::new(500_00));
}

/// Deletes line A right before the `nth` unit of work begins.
struct VanishingStore {
    inner: MemoryStore,
    nth: usize,
    begun: AtomicUsize,
}

#[async_trait]
impl Store for VanishingStore {
    async fn begin(&self, budget: TxBudget) -> ResultEngine<Box<dyn UnitOfWork>> {
        if self.begun.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
            self.inner.delete_line(YEAR, LINE_A).await;
        }
        self.inner.begin(budget).await
    }
}

#[tokio::test]
async fn line_vanishing_between_check_and_write_is_an_invariant_violation() {
    let store = MemoryStore::new();
    store.insert_line(common::line(LINE_A, 1000_00)).await;
    let engine = Engine::builder()
        .store(VanishingStore {
            inner: store.clone(),
            nth: 2,
            begun: AtomicUsize::new(0),
        })
        .hierarchy(common::memory_hierarchy())
        .planning_windows(common::memory_windows())
        .shared_ledger(ScriptedLedger::new())
        .build()
        .unwrap();

    let err = engine
        .create_allocation(create_cmd(LINE_A, 1_00))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn concurrent_reconciliations_of_one_note_keep_a_single_row() {
    let ledger = ScriptedLedger::new();
    ledger.respond(Ok(vec![fact(LINE_A, "1", 100_00, 0)]));
    let (engine, store) = memory_engine(Arc::clone(&ledger)).await;

    let realize = || {
        retry_on_conflict(3, Duration::from_millis(1), || {
            engine.realized_value_for_note(RealizedValueQuery::new("7/2024", YEAR))
        })
    };
    let (first, second) = tokio::join!(realize(), realize());

    assert_eq!(first.unwrap().len(), 1);
    assert_eq!(second.unwrap().len(), 1);
    assert_eq!(store.snapshots().await.len(), 1);
}

#[tokio::test]
async fn concurrent_creates_on_a_database_file_lose_no_update() {
    let (engine, db, _url, path) = file_sqlite_engine(TxBudgets::default()).await;

    let create = |value: i64| {
        let engine = &engine;
        retry_on_conflict(10, Duration::from_millis(20), move || {
            engine.create_allocation(create_cmd(LINE_A, value))
        })
    };
    let (first, second) = tokio::join!(create(100_00), create(200_00));
    first.unwrap();
    second.unwrap();

    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(300_00));
    let audit = engine.audit_planned_total(YEAR, LINE_A).await.unwrap();
    assert_eq!(audit.recomputed, Money::new(300_00));
    assert!(audit.is_consistent());

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn database_readers_never_see_half_of_a_move() {
    let (engine, db, _url, path) = file_sqlite_engine(TxBudgets::default()).await;
    let id = engine
        .create_allocation(create_cmd(LINE_A, 500_00))
        .await
        .unwrap();

    let store = SqlStore::new(db.clone());
    let read_both = async {
        let mut uow = store.begin(TxBudget::ALLOCATIONS).await.unwrap();
        let a = uow.line(YEAR, LINE_A).await.unwrap().unwrap();
        tokio::task::yield_now().await;
        let b = uow.line(YEAR, LINE_B).await.unwrap().unwrap();
        a.planned_total + b.planned_total
    };
    let (moved, seen) = tokio::join!(
        retry_on_conflict(10, Duration::from_millis(20), || {
            engine.update_allocation(UpdateAllocationCmd::new(id, "planner").line_code(LINE_B))
        }),
        read_both,
    );
    moved.unwrap();

    assert_eq!(seen, Money::new(500_00));
    assert_eq!(planned_total(&engine, LINE_A).await, Money::ZERO);
    assert_eq!(planned_total(&engine, LINE_B).await, Money::new(500_00));

    drop(store);
    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn held_write_lock_fails_fast_within_the_wait_budget() {
    let budgets = TxBudgets {
        allocations: TxBudget::new(Duration::from_millis(100), Duration::from_secs(30)),
        ..TxBudgets::default()
    };
    let (engine, db, url, path) = file_sqlite_engine(budgets).await;

    let holder = Database::connect(&url).await.unwrap();
    let held = holder.begin().await.unwrap();
    held.execute_unprepared("UPDATE budget_lines SET over_committed = over_committed")
        .await
        .unwrap();

    let started = Instant::now();
    let result = engine.create_allocation(create_cmd(LINE_A, 100_00)).await;
    let waited = started.elapsed();
    held.rollback().await.unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
    assert!(err.is_retryable());
    assert!(waited < Duration::from_secs(2), "waited {waited:?}");

    // Once the lock is gone the same write goes through.
    engine
        .create_allocation(create_cmd(LINE_A, 100_00))
        .await
        .unwrap();
    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(100_00));

    drop(engine);
    drop(holder);
    drop(db);
    let _ = std::fs::remove_file(path);
}
