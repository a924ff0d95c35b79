use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use institute_results_sync::models::SyncFilter;
use institute_results_sync::pg::{
    self, PgProfileStore, PgResultStore, PgSummaryStore,
};
use institute_results_sync::report;
use institute_results_sync::store::SummaryStore;
use institute_results_sync::sync::ResultAggregator;

#[derive(Parser)]
#[command(name = "results-sync")]
#[command(about = "Student results aggregation for the institute portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Append raw result records from a CSV file
    ImportResults {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Load student profiles from a JSON export
    ImportProfiles {
        #[arg(long)]
        json: PathBuf,
    },
    /// Rebuild every student summary, or one student's with --student/--class
    SyncAll {
        #[arg(long, requires = "class")]
        student: Option<String>,
        #[arg(long, requires = "student")]
        class: Option<String>,
    },
    /// Rebuild one student's summary, backfilling the batch from profiles
    SyncOne {
        student: String,
        class: String,
        #[arg(long)]
        batch: Option<String>,
    },
    /// Generate a markdown standings report from the synced summaries
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            pg::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            pg::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportResults { csv } => {
            let inserted = pg::import_results_csv(&pool, &csv).await?;
            println!("Inserted {inserted} raw results from {}.", csv.display());
        }
        Commands::ImportProfiles { json } => {
            let inserted = pg::import_profiles_json(&pool, &json).await?;
            println!("Loaded {inserted} profiles from {}.", json.display());
        }
        Commands::SyncAll { student, class } => {
            let aggregator = aggregator(&pool);
            let filter = match (student, class) {
                (Some(student_name), Some(student_class)) => Some(SyncFilter {
                    student_name,
                    student_class,
                }),
                _ => None,
            };
            let outcome = aggregator.sync_all(filter).await?;
            println!(
                "Synced {} student summaries ({} duplicate documents removed, {} records skipped).",
                outcome.written, outcome.duplicates_removed, outcome.skipped
            );
        }
        Commands::SyncOne {
            student,
            class,
            batch,
        } => {
            let aggregator = aggregator(&pool);
            let outcome = aggregator.sync_one(&student, &class, batch.as_deref()).await?;
            println!(
                "Synced {} summary for {student} ({} duplicate documents removed).",
                outcome.written, outcome.duplicates_removed
            );
        }
        Commands::Report { out } => {
            let summaries = PgSummaryStore::new(pool.clone()).read_all().await?;
            let report = report::build_report(&summaries);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn aggregator(pool: &sqlx::PgPool) -> ResultAggregator {
    ResultAggregator::new(
        Arc::new(PgResultStore::new(pool.clone())),
        Arc::new(PgSummaryStore::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool.clone())),
    )
}
