use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum PlannedAllocations {
    Table,
    Id,
    Year,
    LineCode,
    ValueMinor,
    GoalId,
    SubGoalId,
    TaskId,
    CreatedBy,
    CreatedAt,
    UpdatedBy,
    UpdatedAt,
    RemovedBy,
    RemovedAt,
}

#[derive(Iden)]
enum BudgetLines {
    Table,
    Year,
    LineCode,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlannedAllocations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlannedAllocations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlannedAllocations::Year).integer().not_null())
                    .col(
                        ColumnDef::new(PlannedAllocations::LineCode)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlannedAllocations::ValueMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlannedAllocations::GoalId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlannedAllocations::SubGoalId).big_integer())
                    .col(ColumnDef::new(PlannedAllocations::TaskId).big_integer())
                    .col(
                        ColumnDef::new(PlannedAllocations::CreatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlannedAllocations::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlannedAllocations::UpdatedBy).string())
                    .col(ColumnDef::new(PlannedAllocations::UpdatedAt).timestamp())
                    .col(ColumnDef::new(PlannedAllocations::RemovedBy).string())
                    .col(ColumnDef::new(PlannedAllocations::RemovedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-planned_allocations-budget_line")
                            .from(
                                PlannedAllocations::Table,
                                (PlannedAllocations::Year, PlannedAllocations::LineCode),
                            )
                            .to(BudgetLines::Table, (BudgetLines::Year, BudgetLines::LineCode)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-planned_allocations-year-line_code")
                    .table(PlannedAllocations::Table)
                    .col(PlannedAllocations::Year)
                    .col(PlannedAllocations::LineCode)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-planned_allocations-goal_id")
                    .table(PlannedAllocations::Table)
                    .col(PlannedAllocations::GoalId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlannedAllocations::Table).to_owned())
            .await
    }
}
