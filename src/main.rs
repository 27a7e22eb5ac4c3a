use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod batch;
mod config;
mod db;
mod error;
mod metrics;
mod models;
mod record;
mod report;
mod schema;
mod store;

use batch::{BatchWriter, WriterStats};
use config::{FlushPolicy, RubricConfig, Settings};
use db::PgSheetStore;
use error::{BatchError, EvaluationError};
use models::{EmployeeProfile, EvaluationInput, EvaluationRecord, FactorScore};
use report::ReportFilter;
use schema::{ColumnSchema, RepairPolicy, SchemaRegistry};
use store::{CachedSheet, SheetStore};

#[derive(Parser)]
#[command(name = "evaluation-ledger")]
#[command(about = "Performance evaluations recorded into a shared sheet", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo sheet with three employees
    Seed,
    /// Replace the sheet with a CSV export of employee profiles
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Reconcile the sheet header with the expected columns
    EnsureSchema,
    /// List employees available for evaluation
    Employees {
        #[arg(long)]
        department: Option<String>,
    },
    /// Record one evaluation
    Evaluate {
        #[arg(long)]
        employee: String,
        /// Actual completion per goal, in goal order
        #[arg(long = "goal-actual", num_args = 1.., required = true)]
        goal_actuals: Vec<f64>,
        /// Score per rubric factor, 1 to 4, in rubric order
        #[arg(long = "factor", num_args = 1.., required = true)]
        factors: Vec<u8>,
        #[arg(long, default_value = "")]
        comments: String,
        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record every evaluation listed in a CSV file
    EvaluateBatch {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate the administrator report
    Report {
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        employee: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Write JSON summaries instead of markdown
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.settings.log_json);

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let settings = cli.settings;
    let rubric = settings.rubric();
    let schema = ColumnSchema::canonical(&rubric);
    let store = PgSheetStore::new(pool.clone(), settings.sheet.clone());
    let policy = if settings.no_repair {
        RepairPolicy::Strict
    } else {
        RepairPolicy::Repair
    };
    let registry = SchemaRegistry::new(schema.clone(), policy);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&store, &schema.base_names()).await?;
            println!("Seeded {inserted} employees into '{}'.", settings.sheet);
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&store, &csv).await?;
            println!("Imported {inserted} rows from {}.", csv.display());
        }
        Commands::EnsureSchema => {
            let live = registry.ensure(&store).await?;
            let state = if live.repaired { "repaired" } else { "already matches" };
            println!(
                "Header {state} ({} columns, {} expected).",
                live.width(),
                schema.len()
            );
        }
        Commands::Employees { department } => {
            let sheet = CachedSheet::new(store, settings.cache_ttl());
            let records = sheet.read_all().await?;
            let names = report::list_employees(registry.schema(), &records, department.as_deref());
            if names.is_empty() {
                println!("No employees found.");
            }
            for name in names {
                println!("- {name}");
            }
        }
        Commands::Evaluate {
            employee,
            goal_actuals,
            factors,
            comments,
            date,
        } => {
            registry.ensure(&store).await?;
            let sheet = CachedSheet::new(store.clone(), settings.cache_ttl());
            let records = sheet.read_all().await?;
            let profile = record::select_profile(&schema, rubric.goal_count, &records, &employee)?;
            let input = evaluation_input(&rubric, goal_actuals, factors, comments, date)?;

            let task = BatchWriter::spawn(store.clone(), settings.flush_policy(), settings.queue_capacity());
            let total = save_evaluation(&task.writer(), &store, &schema, profile, input).await?;
            println!(
                "Evaluation saved for {employee} (score {total}/{}).",
                rubric.max_score()
            );

            let stats = task.shutdown().await?;
            report_losses(&stats)?;
        }
        Commands::EvaluateBatch { csv } => {
            registry.ensure(&store).await?;
            let rows = read_evaluation_csv(&csv)?;
            let sheet = CachedSheet::new(store, settings.cache_ttl());
            let outcome = evaluate_batch(
                &sheet,
                &schema,
                &rubric,
                rows,
                settings.flush_policy(),
                settings.queue_capacity(),
            )
            .await?;
            println!(
                "Saved {} evaluations, skipped {}.",
                outcome.saved, outcome.skipped
            );
            report_losses(&outcome.stats)?;
        }
        Commands::Report {
            department,
            employee,
            out,
            json,
        } => {
            let sheet = CachedSheet::new(store, settings.cache_ttl());
            let records = sheet.read_all().await?;
            let filter = ReportFilter {
                department,
                employee,
            };
            let entries = report::score_entries(&schema, &rubric, &records, &filter);
            let body = if json {
                serde_json::to_string_pretty(&serde_json::json!({
                    "max_score": rubric.max_score(),
                    "departments": report::summarize_by_department(&entries),
                    "employees": report::summarize_by_employee(&entries),
                    "entries": entries,
                }))?
            } else {
                report::build_report(&filter, &rubric, &entries)
            };
            std::fs::write(&out, body)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn evaluation_input(
    rubric: &RubricConfig,
    goal_actuals: Vec<f64>,
    factors: Vec<u8>,
    comments: String,
    date: Option<NaiveDate>,
) -> Result<EvaluationInput, EvaluationError> {
    let factor_scores = factors
        .into_iter()
        .map(FactorScore::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let input = EvaluationInput {
        goal_actuals,
        factor_scores,
        comments,
        date,
    };
    input.validate(rubric)?;
    Ok(input)
}

/// Builds the row against the sheet's current width and queues it. Returns the
/// aggregate score shown to the evaluator.
async fn save_evaluation<S: SheetStore>(
    writer: &BatchWriter,
    store: &S,
    schema: &ColumnSchema,
    profile: EmployeeProfile,
    input: EvaluationInput,
) -> anyhow::Result<u32> {
    let width = store.read_header().await?.len();
    let evaluation = EvaluationRecord::new(profile, input, Local::now().date_naive());
    let row = record::build_record(schema, &evaluation, width);
    writer.enqueue(row).await?;
    info!(
        employee = evaluation.profile.full_name.as_str(),
        score = evaluation.metrics.total_score,
        width,
        "evaluation queued"
    );
    Ok(evaluation.metrics.total_score)
}

#[derive(Debug)]
struct BatchOutcome {
    saved: usize,
    skipped: usize,
    stats: WriterStats,
}

/// Queues every valid CSV evaluation through one writer. Profile lookups share the
/// sheet cache. Rows that fail validation are skipped; a store or writer failure
/// stops the session, but only after the writer has flushed what it accepted.
async fn evaluate_batch<S: SheetStore + Clone>(
    sheet: &CachedSheet<S>,
    schema: &ColumnSchema,
    rubric: &RubricConfig,
    rows: Vec<EvaluationCsvRow>,
    policy: FlushPolicy,
    queue_capacity: usize,
) -> anyhow::Result<BatchOutcome> {
    let task = BatchWriter::spawn(sheet.store().clone(), policy, queue_capacity);
    let writer = task.writer();
    let mut saved = 0usize;
    let mut skipped = 0usize;
    let mut failure = None;

    for (index, row) in rows.into_iter().enumerate() {
        let line = index + 2;
        match queue_csv_row(sheet, &writer, schema, rubric, line, row).await {
            Ok(true) => saved += 1,
            Ok(false) => skipped += 1,
            Err(err) => {
                failure = Some(err.context(format!("evaluation on line {line} was not queued")));
                break;
            }
        }
    }

    if failure.is_none() {
        if let Err(err) = final_flush(&writer).await {
            failure = Some(err.into());
        }
    }

    let stats = task.shutdown().await?;
    if let Some(err) = failure {
        warn!(
            saved,
            rows_written = stats.rows_written,
            rows_dropped = stats.rows_dropped,
            "batch session stopped early"
        );
        return Err(match report_losses(&stats) {
            Ok(()) => err,
            Err(losses) => err.context(losses.to_string()),
        });
    }
    Ok(BatchOutcome {
        saved,
        skipped,
        stats,
    })
}

/// Returns `Ok(false)` when the row was skipped for bad input.
async fn queue_csv_row<S: SheetStore>(
    sheet: &CachedSheet<S>,
    writer: &BatchWriter,
    schema: &ColumnSchema,
    rubric: &RubricConfig,
    line: usize,
    row: EvaluationCsvRow,
) -> anyhow::Result<bool> {
    let records = sheet.read_all().await?;
    match prepare_csv_row(schema, rubric, &records, row) {
        Ok((profile, input)) => {
            save_evaluation(writer, sheet.store(), schema, profile, input).await?;
            Ok(true)
        }
        Err(err) => {
            warn!(line, error = %err, "skipping evaluation");
            Ok(false)
        }
    }
}

async fn final_flush(writer: &BatchWriter) -> Result<(), BatchError> {
    let pending = writer.pending().await?;
    let last = writer.flush().await?;
    match &last.result {
        Err(err) => warn!(rows = last.rows, error = %err, "final flush failed"),
        Ok(()) => info!(pending, rows = last.rows, "final flush done"),
    }
    Ok(())
}

fn report_losses(stats: &WriterStats) -> anyhow::Result<()> {
    if stats.rows_dropped > 0 {
        anyhow::bail!(
            "{} of {} queued rows were lost in {} failed flushes",
            stats.rows_dropped,
            stats.rows_dropped + stats.rows_written,
            stats.failed_flushes
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EvaluationCsvRow {
    employee: String,
    date: Option<NaiveDate>,
    /// Goal actuals separated by `;`
    goal_actuals: String,
    /// Factor scores separated by `;`
    factors: String,
    comments: Option<String>,
}

fn read_evaluation_csv(path: &Path) -> anyhow::Result<Vec<EvaluationCsvRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<EvaluationCsvRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

fn prepare_csv_row(
    schema: &ColumnSchema,
    rubric: &RubricConfig,
    records: &[store::SheetRecord],
    row: EvaluationCsvRow,
) -> anyhow::Result<(EmployeeProfile, EvaluationInput)> {
    let goal_actuals = split_list::<f64>(&row.goal_actuals).context("invalid goal_actuals")?;
    let factors = split_list::<u8>(&row.factors).context("invalid factors")?;
    let profile = record::select_profile(schema, rubric.goal_count, records, &row.employee)?;
    let input = evaluation_input(
        rubric,
        goal_actuals,
        factors,
        row.comments.unwrap_or_default(),
        row.date,
    )?;
    Ok((profile, input))
}

fn split_list<T: std::str::FromStr>(raw: &str) -> anyhow::Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<T>().with_context(|| format!("'{part}' is not a number")))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn policy() -> FlushPolicy {
        FlushPolicy {
            batch_size: 10,
            flush_interval: Duration::from_secs(60),
        }
    }

    fn sheet_with(schema: &ColumnSchema, names: &[&str]) -> MemoryStore {
        let store = MemoryStore::with_header(schema.names());
        for name in names {
            let mut row = vec![String::new(); schema.len()];
            row[0] = name.to_string();
            store.push_row(row);
        }
        store
    }

    fn csv_row(employee: &str) -> EvaluationCsvRow {
        EvaluationCsvRow {
            employee: employee.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 9),
            goal_actuals: "45;10;0;0".to_string(),
            factors: vec!["3"; 12].join(";"),
            comments: None,
        }
    }

    #[test]
    fn split_list_reads_semicolon_separated_values() {
        let values = split_list::<f64>("45; 10;0.5;").unwrap();
        assert_eq!(values, vec![45.0, 10.0, 0.5]);
        assert!(split_list::<u8>("4;x").is_err());
    }

    #[test]
    fn evaluation_input_rejects_out_of_scale_factor() {
        let rubric = RubricConfig::default();
        let mut factors = vec![3u8; 12];
        factors[5] = 7;
        let err = evaluation_input(&rubric, vec![0.0; 4], factors, String::new(), None).unwrap_err();
        assert_eq!(err, EvaluationError::FactorOutOfRange { score: 7 });
    }

    #[test]
    fn losses_surface_as_errors() {
        let clean = WriterStats {
            flushes: 1,
            rows_written: 3,
            ..WriterStats::default()
        };
        assert!(report_losses(&clean).is_ok());
        let lossy = WriterStats {
            flushes: 2,
            failed_flushes: 1,
            rows_written: 3,
            rows_dropped: 10,
        };
        let message = report_losses(&lossy).unwrap_err().to_string();
        assert!(message.contains("10 of 13"));
    }

    #[test]
    fn cli_parses_evaluate_command() {
        let cli = Cli::try_parse_from([
            "evaluation-ledger",
            "--batch-size",
            "5",
            "evaluate",
            "--employee",
            "Ana Torres",
            "--goal-actual",
            "45",
            "10",
            "0",
            "0",
            "--factor",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "4",
            "--date",
            "2026-03-09",
        ])
        .unwrap();
        assert_eq!(cli.settings.batch_size, 5);
        match cli.command {
            Commands::Evaluate {
                goal_actuals,
                factors,
                date,
                ..
            } => {
                assert_eq!(goal_actuals.len(), 4);
                assert_eq!(factors.len(), 12);
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 9));
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[tokio::test]
    async fn batch_lookups_share_one_sheet_read() {
        let rubric = RubricConfig::default();
        let schema = ColumnSchema::canonical(&rubric);
        let store = sheet_with(&schema, &["Ana Torres", "Luis Vega"]);
        let sheet = CachedSheet::new(store.clone(), Duration::from_secs(60));
        let rows = vec![
            csv_row("Ana Torres"),
            csv_row("Luis Vega"),
            csv_row("Nadie"),
            csv_row("Ana Torres"),
        ];

        let outcome = evaluate_batch(&sheet, &schema, &rubric, rows, policy(), 8)
            .await
            .unwrap();
        assert_eq!(outcome.saved, 3);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.stats.rows_written, 3);
        assert_eq!(store.reads(), 1);
        assert_eq!(store.append_batches(), vec![3]);
    }

    #[tokio::test]
    async fn store_failure_mid_batch_flushes_accepted_rows_first() {
        let rubric = RubricConfig::default();
        let schema = ColumnSchema::canonical(&rubric);
        let store = sheet_with(&schema, &["Ana Torres", "Luis Vega"]);
        store.fail_header_reads_after(2);
        let sheet = CachedSheet::new(store.clone(), Duration::from_secs(60));
        let rows = vec![
            csv_row("Ana Torres"),
            csv_row("Luis Vega"),
            csv_row("Ana Torres"),
        ];

        let err = evaluate_batch(&sheet, &schema, &rubric, rows, policy(), 8)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line 4"));
        assert_eq!(store.append_batches(), vec![2]);
        assert_eq!(store.data_rows().len(), 4);
    }

    #[tokio::test]
    async fn aborted_batch_reports_lost_rows_with_the_cause() {
        let rubric = RubricConfig::default();
        let schema = ColumnSchema::canonical(&rubric);
        let store = sheet_with(&schema, &["Ana Torres"]);
        store.fail_header_reads_after(1);
        store.fail_appends(true);
        let sheet = CachedSheet::new(store.clone(), Duration::from_secs(60));
        let rows = vec![csv_row("Ana Torres"), csv_row("Ana Torres")];

        let err = evaluate_batch(&sheet, &schema, &rubric, rows, policy(), 8)
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("1 of 1 queued rows were lost"));
        assert!(message.contains("line 3"));
        assert_eq!(store.append_batches(), vec![1]);
    }
}
