//! Read-only tables owned by the planning system.
//!
//! The engine only reads them; they exist here so a standalone database can
//! resolve hierarchy references and planning windows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Goals {
    Table,
    Id,
    ProgramId,
    RemovedAt,
}

#[derive(Iden)]
enum SubGoals {
    Table,
    Id,
    GoalId,
    RemovedAt,
}

#[derive(Iden)]
enum Tasks {
    Table,
    Id,
    SubGoalId,
    RemovedAt,
}

#[derive(Iden)]
enum PlanningWindows {
    Table,
    ProgramId,
    Year,
    PlanningOpen,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Goals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Goals::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Goals::ProgramId).big_integer().not_null())
                    .col(ColumnDef::new(Goals::RemovedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SubGoals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubGoals::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SubGoals::GoalId).big_integer().not_null())
                    .col(ColumnDef::new(SubGoals::RemovedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-sub_goals-goal_id")
                            .from(SubGoals::Table, SubGoals::GoalId)
                            .to(Goals::Table, Goals::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tasks::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tasks::SubGoalId).big_integer().not_null())
                    .col(ColumnDef::new(Tasks::RemovedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-tasks-sub_goal_id")
                            .from(Tasks::Table, Tasks::SubGoalId)
                            .to(SubGoals::Table, SubGoals::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlanningWindows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlanningWindows::ProgramId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlanningWindows::Year).integer().not_null())
                    .col(
                        ColumnDef::new(PlanningWindows::PlanningOpen)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .primary_key(
                        Index::create()
                            .col(PlanningWindows::ProgramId)
                            .col(PlanningWindows::Year),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlanningWindows::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SubGoals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Goals::Table).to_owned())
            .await
    }
}
