mod common;

use common::{
    CLOSED_GOAL, LINE_A, LINE_B, OPEN_GOAL, SUB_GOAL, ScriptedLedger, TASK, YEAR, sqlite_engine,
};
use engine::{
    AllocationFilter, CreateAllocationCmd, Engine, EngineError, HierarchyRef, Money,
    UpdateAllocationCmd,
};
use uuid::Uuid;

async fn create(engine: &Engine, line_code: &str, value: i64) -> Uuid {
    engine
        .create_allocation(CreateAllocationCmd::new(
            YEAR,
            line_code,
            Money::new(value),
            HierarchyRef::Goal(OPEN_GOAL),
            "planner",
        ))
        .await
        .unwrap()
}

async fn planned_total(engine: &Engine, line_code: &str) -> Money {
    engine
        .budget_line(YEAR, line_code)
        .await
        .unwrap()
        .planned_total
}

async fn assert_consistent(engine: &Engine, line_code: &str) {
    let audit = engine.audit_planned_total(YEAR, line_code).await.unwrap();
    assert!(
        audit.is_consistent(),
        "stored {} != recomputed {}",
        audit.stored,
        audit.recomputed
    );
}

#[tokio::test]
async fn pressure_flips_at_the_cent_boundary() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;

    create(&engine, LINE_A, 999_99).await;
    let line = engine.budget_line(YEAR, LINE_A).await.unwrap();
    assert_eq!(line.planned_total, Money::new(999_99));
    assert!(!line.over_committed);

    create(&engine, LINE_A, 2).await;
    let line = engine.budget_line(YEAR, LINE_A).await.unwrap();
    assert_eq!(line.planned_total, Money::new(1000_01));
    assert!(line.over_committed);
    assert_eq!(line.pressure(), Some(Money::new(1)));
    assert_consistent(&engine, LINE_A).await;
}

#[tokio::test]
async fn update_on_the_same_line_applies_the_difference() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let id = create(&engine, LINE_A, 300_00).await;
    create(&engine, LINE_A, 100_00).await;

    engine
        .update_allocation(UpdateAllocationCmd::new(id, "planner").value(Money::new(450_00)))
        .await
        .unwrap();

    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(550_00));
    let allocation = engine.allocation(id).await.unwrap();
    assert_eq!(allocation.value, Money::new(450_00));
    assert_eq!(allocation.updated_by.as_deref(), Some("planner"));
    assert_consistent(&engine, LINE_A).await;
}

#[tokio::test]
async fn moving_an_allocation_shifts_its_exact_value() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let id = create(&engine, LINE_A, 500_00).await;

    engine
        .update_allocation(UpdateAllocationCmd::new(id, "planner").line_code(LINE_B))
        .await
        .unwrap();

    assert_eq!(planned_total(&engine, LINE_A).await, Money::ZERO);
    assert_eq!(planned_total(&engine, LINE_B).await, Money::new(500_00));
    assert_consistent(&engine, LINE_A).await;
    assert_consistent(&engine, LINE_B).await;
}

#[tokio::test]
async fn moving_and_changing_value_at_once() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let id = create(&engine, LINE_A, 500_00).await;

    engine
        .update_allocation(
            UpdateAllocationCmd::new(id, "planner")
                .line_code(LINE_B)
                .value(Money::new(1200_00)),
        )
        .await
        .unwrap();

    assert_eq!(planned_total(&engine, LINE_A).await, Money::ZERO);
    assert_eq!(planned_total(&engine, LINE_B).await, Money::new(1200_00));
}

#[tokio::test]
async fn remove_is_idempotent() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let id = create(&engine, LINE_A, 1100_00).await;
    assert!(engine.budget_line(YEAR, LINE_A).await.unwrap().over_committed);

    engine.remove_allocation(id, "planner").await.unwrap();
    engine.remove_allocation(id, "someone-else").await.unwrap();

    let line = engine.budget_line(YEAR, LINE_A).await.unwrap();
    assert_eq!(line.planned_total, Money::ZERO);
    assert!(!line.over_committed);

    let allocation = engine.allocation(id).await.unwrap();
    assert_eq!(allocation.removed_by.as_deref(), Some("planner"));
    assert!(allocation.removed_at.is_some());
    assert_consistent(&engine, LINE_A).await;
}

#[tokio::test]
async fn removed_allocations_cannot_be_updated() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let id = create(&engine, LINE_A, 10_00).await;
    engine.remove_allocation(id, "planner").await.unwrap();

    let err = engine
        .update_allocation(UpdateAllocationCmd::new(id, "planner").value(Money::new(20_00)))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound(format!("allocation {id}")));
    assert_eq!(planned_total(&engine, LINE_A).await, Money::ZERO);
}

#[tokio::test]
async fn running_total_matches_aggregation_after_every_step() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;

    let first = create(&engine, LINE_A, 120_50).await;
    assert_consistent(&engine, LINE_A).await;
    let second = create(&engine, LINE_A, 0_01).await;
    assert_consistent(&engine, LINE_A).await;
    let third = create(&engine, LINE_B, 75_00).await;
    assert_consistent(&engine, LINE_B).await;

    engine
        .update_allocation(UpdateAllocationCmd::new(first, "planner").value(Money::new(99_99)))
        .await
        .unwrap();
    assert_consistent(&engine, LINE_A).await;

    engine
        .update_allocation(UpdateAllocationCmd::new(third, "planner").line_code(LINE_A))
        .await
        .unwrap();
    assert_consistent(&engine, LINE_A).await;
    assert_consistent(&engine, LINE_B).await;

    engine.remove_allocation(second, "planner").await.unwrap();
    assert_consistent(&engine, LINE_A).await;

    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(174_99));
    assert_eq!(planned_total(&engine, LINE_B).await, Money::ZERO);
}

#[tokio::test]
async fn validation_failures_write_nothing() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;

    let err = engine
        .create_allocation(CreateAllocationCmd::new(
            YEAR,
            "99.99.99",
            Money::new(1_00),
            HierarchyRef::Goal(OPEN_GOAL),
            "planner",
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::LineMissing {
            year: YEAR,
            line_code: "99.99.99".to_string()
        }
    );

    let err = engine
        .create_allocation(CreateAllocationCmd::new(
            YEAR,
            LINE_A,
            Money::new(1_00),
            HierarchyRef::Task(424242),
            "planner",
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::HierarchyRefNotFound("task 424242".to_string())
    );

    let err = engine
        .create_allocation(CreateAllocationCmd::new(
            YEAR,
            LINE_A,
            Money::new(1_00),
            HierarchyRef::Goal(CLOSED_GOAL),
            "planner",
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::PlanningWindowClosed {
            program_id: 200,
            year: YEAR
        }
    );
    assert!(!err.is_retryable());

    let err = engine
        .create_allocation(CreateAllocationCmd::new(
            YEAR,
            LINE_A,
            Money::ZERO,
            HierarchyRef::Goal(OPEN_GOAL),
            "planner",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    assert_eq!(planned_total(&engine, LINE_A).await, Money::ZERO);
    assert!(
        engine
            .list_allocations(AllocationFilter::for_year(YEAR))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn task_reference_overrides_caller_supplied_parents() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;

    // The caller claims goal 2, but task 1000 hangs under goal 1.
    let reference = HierarchyRef::from_ids(Some(CLOSED_GOAL), None, Some(TASK)).unwrap();
    let id = engine
        .create_allocation(CreateAllocationCmd::new(
            YEAR,
            LINE_A,
            Money::new(10_00),
            reference,
            "planner",
        ))
        .await
        .unwrap();

    let allocation = engine.allocation(id).await.unwrap();
    assert_eq!(allocation.goal_id, OPEN_GOAL);
    assert_eq!(allocation.sub_goal_id, Some(SUB_GOAL));
    assert_eq!(allocation.task_id, Some(TASK));
}

#[tokio::test]
async fn changing_the_hierarchy_keeps_totals() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let id = create(&engine, LINE_A, 10_00).await;

    engine
        .update_allocation(
            UpdateAllocationCmd::new(id, "planner").hierarchy(HierarchyRef::SubGoal(SUB_GOAL)),
        )
        .await
        .unwrap();

    let allocation = engine.allocation(id).await.unwrap();
    assert_eq!(allocation.goal_id, OPEN_GOAL);
    assert_eq!(allocation.sub_goal_id, Some(SUB_GOAL));
    assert_eq!(allocation.task_id, None);
    assert_eq!(planned_total(&engine, LINE_A).await, Money::new(10_00));
}

#[tokio::test]
async fn listing_joins_line_figures() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    create(&engine, LINE_B, 20_00).await;
    create(&engine, LINE_A, 1500_00).await;
    let removed = create(&engine, LINE_A, 1_00).await;
    engine.remove_allocation(removed, "planner").await.unwrap();

    let views = engine
        .list_allocations(AllocationFilter::for_year(YEAR))
        .await
        .unwrap();
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|v| v.allocation.is_active()));

    let on_a = engine
        .list_allocations(AllocationFilter::for_year(YEAR).line_code(LINE_A))
        .await
        .unwrap();
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].line.current_value, Money::new(1000_00));
    assert_eq!(on_a[0].pressure(), Some(Money::new(500_00)));

    let other_goal = engine
        .list_allocations(AllocationFilter::for_year(YEAR).goal_id(CLOSED_GOAL))
        .await
        .unwrap();
    assert!(other_goal.is_empty());
}

#[tokio::test]
async fn unknown_line_is_not_found() {
    let (engine, _db) = sqlite_engine(ScriptedLedger::new()).await;
    let err = engine.budget_line(YEAR, "nope").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}
