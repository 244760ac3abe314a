use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::config::{QueryMode, Settings};
use crate::error::{IndexerError, Result};
use crate::index::{OccurrenceIndex, OpenOutcome, RelationFilter};
use crate::indexer::FileWatcher;
use crate::query::ResultRow;
use crate::session::{BuildScope, Session, Trigger};

#[derive(Parser)]
#[command(name = "toks-index")]
#[command(about = "Persistent identifier index for C and C++ source trees")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Build the index for the current directory
    toks-index index

    # Keep the index up to date while editing
    toks-index index --watch

    # Find where a symbol is defined
    toks-index query parse_header --def

    # All references to functions starting with get_, as JSON
    toks-index query 'get_*' --ref --format json

    # Index only files mentioning the symbol, then query
    toks-index query parse_header --search

    # Project spanning two folders
    toks-index -p ./lib -p ./app stats
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project folder; repeat for multi-folder projects
    #[arg(short, long = "project", global = true, default_value = ".")]
    pub projects: Vec<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or refresh the whole index
    Index {
        /// Watch for file changes and update the index
        #[arg(long)]
        watch: bool,
    },

    /// Re-index specific files
    Reindex {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Look up an identifier (`*` and `?` wildcards allowed)
    Query {
        symbol: Option<String>,

        /// Only definitions
        #[arg(long, conflicts_with_all = ["decl", "refs"])]
        def: bool,

        /// Only declarations
        #[arg(long, conflicts_with = "refs")]
        decl: bool,

        /// Only references
        #[arg(long = "ref")]
        refs: bool,

        /// Shortlist files with the search tool and index only those
        #[arg(long)]
        search: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List files whose text may contain an identifier
    Candidates { pattern: String },

    /// Show index statistics
    Stats {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Clear the index
    Clear,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Index { watch } => index_project(&cli.projects, watch).await,
        Commands::Reindex { files } => reindex_files(&cli.projects, files).await,
        Commands::Query {
            symbol,
            def,
            decl,
            refs,
            search,
            format,
        } => {
            let filter = if def {
                RelationFilter::Definition
            } else if decl {
                RelationFilter::Declaration
            } else if refs {
                RelationFilter::Reference
            } else {
                RelationFilter::Any
            };
            query_symbol(&cli.projects, symbol, filter, search, format).await
        }
        Commands::Candidates { pattern } => list_candidates(&cli.projects, &pattern),
        Commands::Stats { format } => show_stats(&cli.projects, format),
        Commands::Clear => clear_index(&cli.projects),
    }
}

fn open_session(projects: &[PathBuf], mode: Option<QueryMode>) -> Result<Session> {
    let mut settings = Settings::discover(projects)?;
    if let Some(mode) = mode {
        settings.search_mode = mode;
    }
    let session = Session::open_configured(projects, settings)?;
    if session.open_outcome() == OpenOutcome::Recreated {
        eprintln!(
            "Index at {} was incompatible and has been recreated",
            session.index().path().display()
        );
    }
    Ok(session)
}

/// Waits for a session job while drawing its progress. `None` means the job
/// failed and the failure has already been shown.
async fn run_job<T>(session: &Session, job: JoinHandle<Result<T>>) -> Result<Option<T>> {
    let bar = if io::stderr().is_terminal() {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("█▓▒░  "));
        }
        Some(pb)
    } else {
        None
    };

    while !job.is_finished() {
        if let Some(pb) = &bar {
            let status = session.status();
            pb.set_length(status.files_total as u64);
            pb.set_position(status.files_processed as u64);
            pb.set_message(status.phase);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }

    let result = job
        .await
        .map_err(|e| IndexerError::Index(format!("background job failed: {}", e)))?;
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::debug!("Job failed: {:?}", e);
            for message in session.take_notifications() {
                eprintln!("Error: {}", message);
            }
            Ok(None)
        }
    }
}

fn busy() -> IndexerError {
    IndexerError::Index("another job is already running".into())
}

pub async fn index_project(projects: &[PathBuf], watch: bool) -> Result<ExitCode> {
    let session = open_session(projects, None)?;
    let job = session
        .spawn_build(Trigger::Explicit, BuildScope::Full)
        .ok_or_else(busy)?;
    let Some(report) = run_job(&session, job).await? else {
        return Ok(ExitCode::FAILURE);
    };

    println!(
        "Indexed {} files ({} occurrences), {} removed",
        report.files_indexed, report.occurrences, report.files_removed
    );
    if report.rebuilt_after_mismatch {
        println!("The index format had changed; it was rebuilt from scratch");
    }
    if !report.is_clean() {
        eprintln!("{} batches failed, see the log for details", report.failed_batches.len());
    }

    if watch {
        watch_project(&session).await?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn watch_project(session: &Session) -> Result<()> {
    let watcher = FileWatcher::new(session.roots())?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Some(paths) = watcher.recv() {
            if tx.send(paths).is_err() {
                break;
            }
        }
    });

    println!("Watching for changes...");
    while let Some(paths) = rx.recv().await {
        let Some(job) = session.spawn_build(Trigger::Incidental, BuildScope::Files(paths)) else {
            continue;
        };
        match job.await {
            Ok(Ok(report)) if report.files_indexed + report.files_removed > 0 => println!(
                "Updated {} files, removed {}",
                report.files_indexed, report.files_removed
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("Watch update panicked: {}", e),
        }
    }
    Ok(())
}

pub async fn reindex_files(projects: &[PathBuf], files: Vec<PathBuf>) -> Result<ExitCode> {
    // Arguments are typed relative to the shell, not to the project
    let cwd = std::env::current_dir()?;
    let files: Vec<PathBuf> = files.into_iter().map(|f| cwd.join(f)).collect();
    let session = open_session(projects, None)?;
    let job = session
        .spawn_build(Trigger::Explicit, BuildScope::Files(files))
        .ok_or_else(busy)?;
    let Some(report) = run_job(&session, job).await? else {
        return Ok(ExitCode::FAILURE);
    };
    println!(
        "Re-indexed {} files ({} unchanged, {} removed)",
        report.files_indexed, report.files_skipped, report.files_removed
    );
    Ok(ExitCode::SUCCESS)
}

pub async fn query_symbol(
    projects: &[PathBuf],
    symbol: Option<String>,
    filter: RelationFilter,
    search: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    let session = open_session(projects, search.then_some(QueryMode::SearchThenIndex))?;

    let symbol = if (symbol.is_none() || session.settings().prompt_before_searching)
        && io::stdin().is_terminal()
    {
        prompt_symbol(symbol.as_deref())?
    } else {
        symbol
    };
    let symbol = match symbol {
        Some(symbol) if !symbol.trim().is_empty() => symbol.trim().to_string(),
        _ => return Err(IndexerError::Config("no symbol to search for".into())),
    };

    let job = session.spawn_query(&symbol, filter).ok_or_else(busy)?;
    let Some(rows) = run_job(&session, job).await? else {
        return Ok(ExitCode::FAILURE);
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text if rows.is_empty() => {
            eprintln!("No {} results for {}", filter.as_str(), symbol)
        }
        OutputFormat::Text => print_rows(&rows),
    }
    Ok(ExitCode::SUCCESS)
}

fn prompt_symbol(default: Option<&str>) -> Result<Option<String>> {
    match default {
        Some(default) => eprint!("Symbol to search [{}]: ", default),
        None => eprint!("Symbol to search: "),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let line = line.trim();
    Ok(if line.is_empty() {
        default.map(str::to_string)
    } else {
        Some(line.to_string())
    })
}

fn print_rows(rows: &[ResultRow]) {
    let location_width = rows.iter().map(|r| r.location.len()).max().unwrap_or(0);
    let identifier_width = rows.iter().map(|r| r.identifier.len()).max().unwrap_or(0);
    for row in rows {
        println!(
            "{:lw$}  {:iw$}  {}",
            row.location,
            row.identifier,
            row.label,
            lw = location_width,
            iw = identifier_width
        );
    }
}

pub fn list_candidates(projects: &[PathBuf], pattern: &str) -> Result<ExitCode> {
    let session = open_session(projects, None)?;
    for file in session.engine().candidate_files(pattern)? {
        println!("{}", file.display());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn show_stats(projects: &[PathBuf], format: OutputFormat) -> Result<ExitCode> {
    let session = open_session(projects, None)?;
    let stats = session.index().stats()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Index Statistics:");
    println!("  Index file: {}", session.index().path().display());
    println!("  Format version: {}", stats.format_version);
    if let Some(root) = &stats.root {
        println!("  Root: {}", root);
    }
    println!("  Total files: {}", stats.total_files);
    println!("  Total identifiers: {}", stats.total_identifiers);
    println!("  Total occurrences: {}", stats.total_occurrences);

    if !stats.occurrences_by_relation.is_empty() {
        println!("\n  Occurrences by relation:");
        for (relation, count) in &stats.occurrences_by_relation {
            println!("    {}: {}", relation, count);
        }
    }

    if !stats.files_by_dialect.is_empty() {
        println!("\n  Files by dialect:");
        for (dialect, count) in &stats.files_by_dialect {
            println!("    {}: {}", dialect, count);
        }
    }

    Ok(ExitCode::SUCCESS)
}

pub fn clear_index(projects: &[PathBuf]) -> Result<ExitCode> {
    let session = open_session(projects, None)?;
    session.clear()?;
    println!("Index cleared");
    Ok(ExitCode::SUCCESS)
}
