pub use sea_orm_migration::prelude::*;

mod m20260301_000001_budget_lines;
mod m20260301_000002_planned_allocations;
mod m20260301_000003_execution_snapshots;
mod m20260301_000004_collaborators;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_budget_lines::Migration),
            Box::new(m20260301_000002_planned_allocations::Migration),
            Box::new(m20260301_000003_execution_snapshots::Migration),
            Box::new(m20260301_000004_collaborators::Migration),
        ]
    }
}
