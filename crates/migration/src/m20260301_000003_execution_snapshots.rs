use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum ExecutionSnapshots {
    Table,
    Id,
    Year,
    LineCode,
    ProcessId,
    CommitmentNoteId,
    CommittedValueMinor,
    PaidValueMinor,
    MonthUsed,
    Valid,
    SyncedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExecutionSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExecutionSnapshots::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExecutionSnapshots::Year).integer().not_null())
                    .col(
                        ColumnDef::new(ExecutionSnapshots::LineCode)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::ProcessId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::CommitmentNoteId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::CommittedValueMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::PaidValueMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::MonthUsed)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::Valid)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ExecutionSnapshots::SyncedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-execution_snapshots-key-unique")
                    .table(ExecutionSnapshots::Table)
                    .col(ExecutionSnapshots::Year)
                    .col(ExecutionSnapshots::LineCode)
                    .col(ExecutionSnapshots::ProcessId)
                    .col(ExecutionSnapshots::CommitmentNoteId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-execution_snapshots-year-note")
                    .table(ExecutionSnapshots::Table)
                    .col(ExecutionSnapshots::Year)
                    .col(ExecutionSnapshots::CommitmentNoteId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExecutionSnapshots::Table).to_owned())
            .await
    }
}
