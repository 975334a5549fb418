use std::process::ExitCode;

use migration::Migrator;
use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_URL: &str = "sqlite:./orcamento.db?mode=rwc";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let cmd = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let db = Database::connect(&db_url).await?;

    match cmd.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => Migrator::down(&db, Some(1)).await?,
        "fresh" => Migrator::fresh(&db).await?,
        "pending" => {
            // Non-zero exit when the ledger schema is behind.
            let pending = Migrator::get_pending_migrations(&db).await?;
            for migration in &pending {
                println!("{}", migration.name());
            }
            if !pending.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        }
        "status" => Migrator::status(&db).await?,
        _ => {
            eprintln!("Usage: migration [up|down|fresh|pending|status]");
            return Ok(ExitCode::from(2));
        }
    }

    Ok(ExitCode::SUCCESS)
}
