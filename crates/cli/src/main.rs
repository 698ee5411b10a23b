//! # citerec: Citation Reconciliation CLI
//!
//! This is the main entry point for the `citerec` command-line interface:
//! match a sheet of citations against a folder of PDFs, run one bulk
//! extraction job over the matches, and write a per-row CSV report.

use anyhow::{anyhow, bail, Context, Result};
use citerec::citation::parse_citation;
use citerec::documents;
use citerec::index::FileIndex;
use citerec::matcher::match_citations;
use citerec::prompts::DEFAULT_ANALYSIS_PROMPT;
use citerec::report::write_csv_report;
use citerec::{
    resume_reconciliation, run_reconciliation, Citation, GeminiBatchProvider, JobConfig,
    MatchResult, MatcherConfig, ReportRow, RowStatus, RunOptions, SourceRow,
};
use citerec_sheets::RowSelection;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Match citations to PDFs and run the bulk extraction job
    Run(RunArgs),
    /// Resume an interrupted run from its state file
    Resume(ResumeArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// URL of the Google Sheet holding the citations
    #[arg(long, conflicts_with = "csv")]
    sheet_url: Option<String>,
    /// Read citations from a local CSV file instead of a sheet
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Worksheet gid within the sheet
    #[arg(long)]
    gid: Option<String>,
    /// Header of the column holding the citations
    #[arg(long, default_value = "Citation")]
    column: String,
    /// Folder containing the PDF collection
    #[arg(long)]
    folder: PathBuf,
    /// Where to write the CSV report
    #[arg(long, default_value = "batch_report.csv")]
    out: PathBuf,
    /// Only process these sheet rows, e.g. `5,8,12`
    #[arg(long, conflicts_with = "row_range")]
    rows: Option<String>,
    /// Only process this inclusive sheet row range, e.g. `5-10`
    #[arg(long)]
    row_range: Option<String>,
    /// Gemini model to run the extraction with
    #[arg(long, default_value = "gemini-flash-latest")]
    model: String,
    /// File holding a custom analysis prompt
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    /// Maximum year difference before a file is ruled out
    #[arg(long, default_value_t = 1)]
    year_tolerance: i32,
    /// Minimum similarity score for a usable match
    #[arg(long, default_value_t = 0.5)]
    score_threshold: f64,
    /// Top-two score gap at or below which a match is ambiguous
    #[arg(long, default_value_t = 0.05)]
    ambiguity_margin: f64,
    /// Delay before the second status poll, in seconds
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,
    /// Backoff ceiling between polls, in seconds
    #[arg(long, default_value_t = 120)]
    poll_max_interval_secs: u64,
    /// Wall-clock ceiling for the whole job, in seconds
    #[arg(long, default_value_t = 3600)]
    poll_timeout_secs: u64,
    /// Where to snapshot the run for `citerec resume`
    #[arg(long, default_value = ".citerec_state.json")]
    state_file: PathBuf,
    /// Match only: print the outcomes and write a match report, submit nothing
    #[arg(long)]
    dry_run: bool,
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Parser, Debug)]
struct ResumeArgs {
    /// State file written by a previous run
    #[arg(long, default_value = ".citerec_state.json")]
    state_file: PathBuf,
    /// Where to write the CSV report
    #[arg(long, default_value = "batch_report.csv")]
    out: PathBuf,
    /// Gemini model, used only if the run never reached submission
    #[arg(long, default_value = "gemini-flash-latest")]
    model: String,
    /// Delay before the second status poll, in seconds
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,
    /// Backoff ceiling between polls, in seconds
    #[arg(long, default_value_t = 120)]
    poll_max_interval_secs: u64,
    /// Wall-clock ceiling for the whole job, in seconds
    #[arg(long, default_value_t = 3600)]
    poll_timeout_secs: u64,
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Setup logging to a file, keeping stdout for the report summary.
    let log_file = File::create("citerec.log")?;
    let subscriber = fmt::Subscriber::builder()
        .with_writer(log_file)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Resume(args) => handle_resume(args).await,
    }
}

// --- Command Handlers ---

async fn handle_run(args: &RunArgs) -> Result<()> {
    // 1. Load the citation rows
    let selection = build_selection(args)?;
    let rows = load_rows(args, &selection).await?;
    println!("📋 Loaded {} citation rows.", rows.len());

    // 2. List the document collection
    let doc_files = documents::list_pdf_files(&args.folder)
        .with_context(|| format!("Failed to list PDFs in '{}'", args.folder.display()))?;
    println!(
        "📚 Found {} PDF files in '{}'.",
        doc_files.len(),
        args.folder.display()
    );

    let matcher = MatcherConfig {
        year_tolerance: args.year_tolerance,
        score_threshold: args.score_threshold,
        ambiguity_margin: args.ambiguity_margin,
    };

    // 3. Dry run stops after matching
    if args.dry_run {
        return handle_dry_run(args, &rows, &doc_files, &matcher);
    }

    // 4. Full pipeline against the Gemini batch API
    let provider = build_provider(args.api_key.as_deref(), &args.model)?;
    let options = RunOptions {
        matcher,
        job: JobConfig {
            poll_initial_interval: Duration::from_secs(args.poll_interval_secs),
            poll_max_interval: Duration::from_secs(args.poll_max_interval_secs),
            poll_timeout: Duration::from_secs(args.poll_timeout_secs),
            state_path: Some(args.state_file.clone()),
        },
        prompt: load_prompt(args.prompt_file.as_deref())?,
    };
    let report = run_reconciliation(&rows, &doc_files, &provider, &options).await?;

    // 5. Write the report
    write_csv_report(&args.out, &report)?;
    print_summary(&report);
    println!("✅ Report written to '{}'.", args.out.display());
    Ok(())
}

async fn handle_resume(args: &ResumeArgs) -> Result<()> {
    info!("Resuming from state file '{}'.", args.state_file.display());
    let provider = build_provider(args.api_key.as_deref(), &args.model)?;
    let config = JobConfig {
        poll_initial_interval: Duration::from_secs(args.poll_interval_secs),
        poll_max_interval: Duration::from_secs(args.poll_max_interval_secs),
        poll_timeout: Duration::from_secs(args.poll_timeout_secs),
        state_path: Some(args.state_file.clone()),
    };
    let report = resume_reconciliation(&args.state_file, &provider, config).await?;

    write_csv_report(&args.out, &report)?;
    print_summary(&report);
    println!("✅ Report written to '{}'.", args.out.display());
    Ok(())
}

/// Matches only: prints every outcome and writes a match report instead of
/// the extraction report.
fn handle_dry_run(
    args: &RunArgs,
    rows: &[SourceRow],
    doc_files: &[citerec::DocumentFile],
    matcher: &MatcherConfig,
) -> Result<()> {
    let citations: Vec<Citation> = rows.iter().map(parse_citation).collect();
    let index = FileIndex::build(doc_files);
    let matches = match_citations(&citations, &index, matcher);

    for result in &matches {
        let target = match &result.matched_path {
            Some(path) => path.display().to_string(),
            None if result.contenders.is_empty() => "-".to_string(),
            None => result
                .contenders
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" | "),
        };
        println!(
            "row {:>5}  {:<18} {:.3}  {}",
            result.row_id,
            result.status.as_str(),
            result.confidence,
            target
        );
    }

    write_match_csv(&args.out, rows, &matches)?;
    println!(
        "✅ Match report written to '{}'. No extraction job was submitted.",
        args.out.display()
    );
    Ok(())
}

// --- Helpers ---

fn build_selection(args: &RunArgs) -> Result<RowSelection> {
    match (&args.rows, &args.row_range) {
        (Some(list), None) => Ok(RowSelection::parse_rows(list)?),
        (None, Some(range)) => Ok(RowSelection::parse_range(range)?),
        (None, None) => Ok(RowSelection::All),
        _ => bail!("--rows and --row-range are mutually exclusive."),
    }
}

async fn load_rows(args: &RunArgs, selection: &RowSelection) -> Result<Vec<SourceRow>> {
    match (&args.sheet_url, &args.csv) {
        (Some(url), None) => Ok(citerec_sheets::fetch_citation_rows(
            url,
            args.gid.as_deref(),
            &args.column,
            selection,
        )
        .await?),
        (None, Some(path)) => {
            Ok(citerec_sheets::read_csv_file(path, &args.column, selection)?)
        }
        _ => bail!("Provide exactly one of --sheet-url or --csv."),
    }
}

fn build_provider(api_key: Option<&str>, model: &str) -> Result<GeminiBatchProvider> {
    let api_key = api_key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("GEMINI_API_KEY is not set. Export it or pass --api-key."))?;
    let base_url =
        std::env::var("GEMINI_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    Ok(GeminiBatchProvider::new(
        base_url,
        api_key.to_string(),
        model.to_string(),
    )?)
}

fn load_prompt(prompt_file: Option<&Path>) -> Result<String> {
    match prompt_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file '{}'", path.display())),
        None => Ok(DEFAULT_ANALYSIS_PROMPT.to_string()),
    }
}

fn write_match_csv(path: &Path, rows: &[SourceRow], matches: &[MatchResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "row",
        "citation",
        "status",
        "matched_file",
        "confidence",
        "contenders",
    ])?;
    for (row, result) in rows.iter().zip(matches) {
        let matched_file = result
            .matched_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let contenders = result
            .contenders
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        let confidence = format!("{:.3}", result.confidence);
        writer.write_record([
            row.row_id.as_str(),
            row.raw_text.as_str(),
            result.status.as_str(),
            matched_file.as_str(),
            confidence.as_str(),
            contenders.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(report: &[ReportRow]) {
    let mut extracted = 0;
    let mut failed = 0;
    let mut ambiguous = 0;
    let mut unmatched = 0;
    for row in report {
        match row.status {
            RowStatus::Extracted => extracted += 1,
            RowStatus::ExtractionFailed => failed += 1,
            RowStatus::Ambiguous => ambiguous += 1,
            RowStatus::Unmatched => unmatched += 1,
        }
    }
    println!(
        "📊 {} rows: {extracted} extracted, {failed} extraction failed, {ambiguous} ambiguous, {unmatched} unmatched.",
        report.len()
    );
    if failed > 0 {
        println!("⚠️  Some rows failed extraction; see the report's detail column.");
    }
}
