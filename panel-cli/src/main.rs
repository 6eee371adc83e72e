use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use panel_core::{
    completion_matrix, export_file_name, export_workbook, hash_password, FeedbackMapping,
    FeedbackStore, PanelConfig, SqliteSheet, Table, FEEDBACK_WORKSHEET,
};

/// panel: operator tooling for the interview panel feedback store
#[derive(Parser, Debug)]
#[command(name = "panel")]
#[command(about = "Operator tooling for the interview panel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hash a password for the credentials section of the panel file
    HashPassword(HashPasswordArgs),
    /// Print who has submitted feedback for whom
    Matrix(StoreArgs),
    /// Write the feedback workbook
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct HashPasswordArgs {
    /// Password to hash (read from stdin if omitted)
    #[arg(long)]
    password: Option<String>,
}

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Panel file (roster, rubric, accounts)
    #[arg(long, env = "PANEL_CONFIG", default_value = "panel.toml")]
    config: PathBuf,

    /// SQLite feedback store written by the server
    #[arg(long, default_value = "feedback.db")]
    db: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Output path (defaults to a timestamped file in the current directory)
    #[arg(long)]
    out: Option<PathBuf>,
}

async fn load_feedback(args: &StoreArgs) -> Result<(PanelConfig, FeedbackMapping)> {
    let panel = PanelConfig::load(&args.config)
        .with_context(|| format!("Failed to load panel file {}", args.config.display()))?;
    if !args.db.exists() {
        anyhow::bail!("Feedback store {} does not exist", args.db.display());
    }
    let sheet = SqliteSheet::open(&args.db, FEEDBACK_WORKSHEET)
        .with_context(|| format!("Failed to open feedback store {}", args.db.display()))?;
    let store = FeedbackStore::new(Arc::new(sheet), panel.criterion_names());
    let mapping = store.load().await.context("Failed to read feedback")?;
    Ok((panel, mapping))
}

fn read_password_from_stdin() -> Result<String> {
    eprintln!("Password:");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Render a table as aligned plain-text columns.
fn format_table(table: &Table) -> String {
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();
    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(&table.columns);
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

async fn run_matrix(args: StoreArgs) -> Result<()> {
    let (panel, mapping) = load_feedback(&args).await?;
    print!("{}", format_table(&completion_matrix(&panel, &mapping)));
    Ok(())
}

async fn run_export(args: ExportArgs) -> Result<()> {
    let (panel, mapping) = load_feedback(&args.store).await?;
    let bytes = export_workbook(&panel, &mapping).context("Failed to build workbook")?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(export_file_name(chrono::Local::now().naive_local())));
    std::fs::write(&out, bytes).with_context(|| format!("Failed to write {}", out.display()))?;
    info!("Wrote {}", out.display());
    println!("{}", out.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::HashPassword(args) => {
            let password = match args.password {
                Some(p) => p,
                None => read_password_from_stdin()?,
            };
            println!("{}", hash_password(&password)?);
            Ok(())
        }
        Commands::Matrix(args) => run_matrix(args).await,
        Commands::Export(args) => run_export(args).await,
    }
}
