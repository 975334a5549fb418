use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum BudgetLines {
    Table,
    Year,
    LineCode,
    InitialValueMinor,
    CurrentValueMinor,
    AvailableBalanceMinor,
    PlannedTotalMinor,
    OverCommitted,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BudgetLines::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BudgetLines::Year).integer().not_null())
                    .col(ColumnDef::new(BudgetLines::LineCode).string().not_null())
                    .col(
                        ColumnDef::new(BudgetLines::InitialValueMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::CurrentValueMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::AvailableBalanceMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::PlannedTotalMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::OverCommitted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .primary_key(
                        Index::create()
                            .col(BudgetLines::Year)
                            .col(BudgetLines::LineCode),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BudgetLines::Table).to_owned())
            .await
    }
}
