use std::{error::Error, future::Future, process::ExitCode, sync::Arc, time::Duration};

use api_types::{
    allocation::{AllocationCreated, AllocationListResponse},
    realized::RealizedValueResponse,
};
use clap::{Args, Parser, Subcommand};
use engine::{
    AllocationFilter, BudgetQuery, CreateAllocationCmd, Engine, EngineError, HierarchyRef, Money,
    RealizedValueQuery, ResultEngine, UpdateAllocationCmd, retry::retry_on_conflict,
};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;
use sof_client::SofClient;
use uuid::Uuid;

mod settings;
mod views;

const CONFLICT_RETRIES: usize = 3;
const CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "orcamento")]
#[command(about = "Budget allocation ledger and commitment reconciliation")]
struct Cli {
    /// Settings file (TOML). Defaults to `settings.toml` if present.
    #[arg(long)]
    config: Option<String>,

    /// Database connection string, overriding the settings file.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations and exit.
    Migrate,
    Line(Line),
    Allocation(Allocation),
    /// Reconcile a commitment note with the external system.
    Realize(RealizeArgs),
    /// Ask the external system for a project's budgeted amounts.
    Budgeted(BudgetedArgs),
}

#[derive(Args, Debug)]
struct Line {
    #[command(subcommand)]
    command: LineCommand,
}

#[derive(Subcommand, Debug)]
enum LineCommand {
    Get(LineArgs),
    /// Compare the running total with an independent sum.
    Audit(LineArgs),
}

#[derive(Args, Debug)]
struct LineArgs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    code: String,
}

#[derive(Args, Debug)]
struct Allocation {
    #[command(subcommand)]
    command: AllocationCommand,
}

#[derive(Subcommand, Debug)]
enum AllocationCommand {
    Create(CreateArgs),
    Update(UpdateArgs),
    Remove(RemoveArgs),
    List(ListArgs),
}

#[derive(Args, Debug)]
struct HierarchyArgs {
    #[arg(long)]
    goal: Option<i64>,
    #[arg(long)]
    sub_goal: Option<i64>,
    #[arg(long)]
    task: Option<i64>,
}

impl HierarchyArgs {
    fn is_empty(&self) -> bool {
        self.goal.is_none() && self.sub_goal.is_none() && self.task.is_none()
    }

    fn reference(&self) -> ResultEngine<HierarchyRef> {
        HierarchyRef::from_ids(self.goal, self.sub_goal, self.task)
    }
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    line: String,
    /// Decimal amount, e.g. `1234.50`.
    #[arg(long)]
    value: String,
    #[command(flatten)]
    hierarchy: HierarchyArgs,
    #[arg(long)]
    user: String,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    #[arg(long)]
    id: Uuid,
    #[arg(long)]
    value: Option<String>,
    #[arg(long)]
    line: Option<String>,
    #[command(flatten)]
    hierarchy: HierarchyArgs,
    #[arg(long)]
    user: String,
}

#[derive(Args, Debug)]
struct RemoveArgs {
    #[arg(long)]
    id: Uuid,
    #[arg(long)]
    user: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    line: Option<String>,
    #[arg(long)]
    goal: Option<i64>,
}

#[derive(Args, Debug)]
struct RealizeArgs {
    /// Commitment note, `NNNNN/YYYY`.
    #[arg(long)]
    note: String,
    #[arg(long)]
    year: i32,
    #[arg(long)]
    month: Option<u32>,
    /// Fail if the note spans more than one budget line.
    #[arg(long)]
    single_line: bool,
}

#[derive(Args, Debug)]
struct BudgetedArgs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    month: Option<u32>,
    #[arg(long)]
    agency: String,
    /// `*` for every unit of the agency.
    #[arg(long, default_value = "*")]
    unit: String,
    #[arg(long)]
    project_activity: String,
    #[arg(long)]
    source: String,
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_db(
    database_url: &str,
) -> Result<sea_orm::DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = sea_orm::Database::connect(database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

async fn allocation_write<T, F, Fut>(op: F) -> ResultEngine<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResultEngine<T>>,
{
    retry_on_conflict(CONFLICT_RETRIES, CONFLICT_BACKOFF, op).await
}

/// Runs one subcommand. Engine errors are returned apart so they can be
/// reported with their public message only.
async fn run(
    engine: &Engine,
    command: Command,
) -> Result<ResultEngine<()>, Box<dyn Error + Send + Sync>> {
    let result = match command {
        Command::Migrate => Ok(()),
        Command::Line(Line { command }) => match command {
            LineCommand::Get(args) => match engine.budget_line(args.year, &args.code).await {
                Ok(line) => Ok(print_json(&views::budget_line(&line))?),
                Err(err) => Err(err),
            },
            LineCommand::Audit(args) => {
                match engine.audit_planned_total(args.year, &args.code).await {
                    Ok(audit) => {
                        if !audit.is_consistent() {
                            tracing::error!(
                                year = args.year,
                                line_code = %args.code,
                                stored = %audit.stored,
                                recomputed = %audit.recomputed,
                                "planned total drifted from its allocations"
                            );
                        }
                        Ok(print_json(&views::audit(args.year, &args.code, &audit))?)
                    }
                    Err(err) => Err(err),
                }
            }
        },
        Command::Allocation(Allocation { command }) => match command {
            AllocationCommand::Create(args) => {
                let created = async {
                    let value: Money = args.value.parse()?;
                    let reference = args.hierarchy.reference()?;
                    allocation_write(|| {
                        engine.create_allocation(CreateAllocationCmd::new(
                            args.year,
                            args.line.as_str(),
                            value,
                            reference,
                            args.user.as_str(),
                        ))
                    })
                    .await
                }
                .await;
                match created {
                    Ok(id) => Ok(print_json(&AllocationCreated { id })?),
                    Err(err) => Err(err),
                }
            }
            AllocationCommand::Update(args) => {
                async {
                    let mut cmd = UpdateAllocationCmd::new(args.id, args.user.as_str());
                    if let Some(value) = &args.value {
                        cmd = cmd.value(value.parse()?);
                    }
                    if let Some(line) = &args.line {
                        cmd = cmd.line_code(line.as_str());
                    }
                    if !args.hierarchy.is_empty() {
                        cmd = cmd.hierarchy(args.hierarchy.reference()?);
                    }
                    allocation_write(|| engine.update_allocation(cmd.clone())).await
                }
                .await
            }
            AllocationCommand::Remove(args) => {
                allocation_write(|| engine.remove_allocation(args.id, &args.user)).await
            }
            AllocationCommand::List(args) => {
                let mut filter = AllocationFilter::for_year(args.year);
                if let Some(line) = args.line {
                    filter = filter.line_code(line);
                }
                if let Some(goal) = args.goal {
                    filter = filter.goal_id(goal);
                }
                match engine.list_allocations(filter).await {
                    Ok(rows) => Ok(print_json(&AllocationListResponse {
                        allocations: rows.iter().map(views::allocation).collect(),
                    })?),
                    Err(err) => Err(err),
                }
            }
        },
        Command::Realize(args) => {
            let mut query = RealizedValueQuery::new(args.note, args.year);
            if let Some(month) = args.month {
                query = query.month(month);
            }
            if args.single_line {
                query = query.single_line();
            }
            let realized = retry_on_conflict(CONFLICT_RETRIES, CONFLICT_BACKOFF, || {
                engine.realized_value_for_note(query.clone())
            })
            .await;
            match realized {
                Ok(snapshots) => Ok(print_json(&RealizedValueResponse {
                    snapshots: snapshots.iter().map(views::snapshot).collect(),
                })?),
                Err(err) => Err(err),
            }
        }
        Command::Budgeted(args) => {
            let amounts = async {
                let month = match args.month {
                    Some(month) => month,
                    None => engine.most_recent_applicable_month(args.year)?,
                };
                engine
                    .fetch_budgeted_amount(BudgetQuery {
                        year: args.year,
                        month,
                        agency: args.agency,
                        unit: args.unit,
                        project_activity: args.project_activity,
                        funding_source: args.source,
                    })
                    .await
            }
            .await;
            match amounts {
                Ok(amounts) => Ok(print_json(
                    &amounts.iter().map(views::budgeted).collect::<Vec<_>>(),
                )?),
                Err(err) => Err(err),
            }
        }
    };
    Ok(result)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "orcamento={level},engine={level},sof_client={level},migration={level}",
                    level = settings.app.level
                ))
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let database_url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    let db = connect_db(&database_url).await?;
    tracing::debug!(%database_url, "database ready");

    let ledger = SofClient::new(
        &settings.sof.base_url,
        settings.sof.timeout(),
        settings.sof.retry_policy(),
    )?;
    let engine = Engine::builder()
        .database(db)
        .shared_ledger(Arc::new(ledger))
        .budgets(settings.transactions.budgets())
        .timezone(settings.period.timezone()?)
        .build()?;

    match run(&engine, cli.command).await? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            report(&err);
            print_json(&views::error(&err))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report(err: &EngineError) {
    match err.kind() {
        engine::ErrorKind::Internal | engine::ErrorKind::Invariant => {
            tracing::error!(error = %err, "operation failed")
        }
        _ => tracing::warn!(error = %err, "operation rejected"),
    }
}
