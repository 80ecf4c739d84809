use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use gold_hour::db::{self, AggregateFilter};
use gold_hour::models::ShiftLabel;
use gold_hour::{logging, pipeline, report};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "gold-hour")]
#[command(about = "Gold hour efficiency tracking for press operations", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, global = true, env = "GOLD_HOUR_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Compute gold hours from both feeds and replace the persisted aggregate
    Compute {
        /// Time-entry feed
        #[arg(long, env = "GOLD_HOUR_ENTRIES")]
        entries: PathBuf,
        /// Production-order budget feed
        #[arg(long, env = "GOLD_HOUR_BUDGET")]
        budget: PathBuf,
        /// Compute and print the summary without touching the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Generate a markdown report straight from the feeds
    Report {
        #[arg(long, env = "GOLD_HOUR_ENTRIES")]
        entries: PathBuf,
        #[arg(long, env = "GOLD_HOUR_BUDGET")]
        budget: PathBuf,
        #[arg(long)]
        machine: Option<String>,
        #[arg(long, default_value = "gold_hour_report.md")]
        out: PathBuf,
    },
    /// Print persisted aggregate rows as JSON
    Query {
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        #[arg(long)]
        machine: Option<String>,
        #[arg(long)]
        shift: Option<ShiftLabel>,
    },
}

async fn connect(database_url: Option<&str>, max_connections: u32) -> anyhow::Result<PgPool> {
    let database_url =
        database_url.context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let database_url = cli.database_url.as_deref();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(database_url, cli.max_connections).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Compute {
            entries,
            budget,
            dry_run,
        } => {
            let output = pipeline::run_files(&entries, &budget)
                .context("gold hour run aborted, nothing was persisted")?;
            let stats = &output.stats;

            println!(
                "Computed {} gold hour records into {} daily rows ({} discarded for invalid order numbers, {} orphaned entries, {} orphaned budgets).",
                stats.gold_hour_records,
                stats.cumulative_rows,
                stats.entries_invalid_order + stats.budgets_invalid_order,
                stats.orphaned_entries,
                stats.orphaned_budgets
            );

            if dry_run {
                return Ok(());
            }

            let pool = connect(database_url, cli.max_connections).await?;
            let run_id = Uuid::new_v4();
            let inserted =
                db::replace_aggregate(&pool, run_id, Utc::now(), stats, &output.cumulative)
                    .await?;
            info!(%run_id, inserted, "aggregate replaced");
            println!("Persisted {inserted} rows for run {run_id}.");
        }
        Commands::Report {
            entries,
            budget,
            machine,
            out,
        } => {
            let output = pipeline::run_files(&entries, &budget)
                .context("gold hour run aborted, no report written")?;
            let report = report::build_report(machine.as_deref(), &output.cumulative, &output.stats);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Query {
            month,
            machine,
            shift,
        } => {
            let pool = connect(database_url, cli.max_connections).await?;
            let filter = AggregateFilter {
                month,
                machine,
                shift,
            };
            let rows = match db::fetch_aggregate(&pool, &filter).await {
                Ok(rows) => rows,
                Err(err) => {
                    error!(error = %err, "aggregate query failed");
                    anyhow::bail!("failed to fetch gold hour data");
                }
            };
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}
