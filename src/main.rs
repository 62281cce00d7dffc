//! lmis-harvest main entry point
//!
//! Command-line interface for harvesting, converting and auditing LMIS Form 2
//! stock data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lmis_harvest::config::{load_config_or_default, load_config_with_hash, validate, Config, SinkKind};
use lmis_harvest::harvest::{Harvester, RunPlan};
use lmis_harvest::ledger::{open_ledger, run_id_for};
use lmis_harvest::output::{audit_tree, convert_tree, load_status, print_status, write_audit_report};
use lmis_harvest::storage::open_sink;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// lmis-harvest: resumable harvester for the LMIS Form 2 stock report
///
/// Walks every warehouse, upazila and union for each requested month and
/// stores the per-item stock tables, picking up where an interrupted run
/// left off.
#[derive(Parser, Debug)]
#[command(name = "lmis-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Resumable harvester for the LMIS Form 2 stock report", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest stock data from the portal
    Fetch(FetchArgs),

    /// Convert the JSON file tree to CSV
    Convert {
        /// Root of the JSON file tree (defaults to the configured output root)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory for the CSV files
        #[arg(long, default_value = "csv_output")]
        output: PathBuf,

        /// JSON files per CSV batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Report missing months and items in the JSON file tree
    Audit {
        /// Root of the JSON file tree (defaults to the configured output root)
        #[arg(long)]
        root: Option<PathBuf>,

        /// First year to check (defaults to the configured start)
        #[arg(long)]
        start_year: Option<u32>,

        /// Last year to check (defaults to the configured end)
        #[arg(long)]
        end_year: Option<u32>,

        /// Directory for the report files
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// Show ledger statistics and the resume point
    Status,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    /// First period, YYYY-MM
    #[arg(long)]
    start: Option<String>,

    /// Last period, YYYY-MM (defaults to the current month)
    #[arg(long)]
    end: Option<String>,

    /// Resume point, YYYY-MM or YYYY-MM:WH-ID
    #[arg(long)]
    resume: Option<String>,

    /// Concurrent tasks at the parallel level
    #[arg(long)]
    workers: Option<usize>,

    /// Restrict to warehouses matching this id or name
    #[arg(long)]
    warehouse: Option<String>,

    /// Attempts per request
    #[arg(long)]
    retries: Option<u32>,

    /// Where records go
    #[arg(long, value_enum)]
    sink: Option<SinkArg>,

    /// Root of the JSON file tree
    #[arg(long)]
    output: Option<String>,

    /// SQLite database path
    #[arg(long)]
    database: Option<String>,

    /// Discard previous progress for this destination
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkArg {
    File,
    Sqlite,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::File => SinkKind::File,
            SinkArg::Sqlite => SinkKind::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(cli.config.as_deref())?;

    match cli.command {
        Command::Fetch(args) => handle_fetch(config, args).await,
        Command::Convert {
            input,
            output,
            batch_size,
        } => handle_convert(&config, input, &output, batch_size),
        Command::Audit {
            root,
            start_year,
            end_year,
            output,
        } => handle_audit(&config, root, start_year, end_year, &output),
        Command::Status => handle_status(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lmis_harvest=info,warn"),
            1 => EnvFilter::new("lmis_harvest=debug,info"),
            2 => EnvFilter::new("lmis_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => Ok(load_config_or_default(None).context("invalid default configuration")?),
    }
}

/// Handles `fetch`: applies overrides, opens sink and ledger, runs the harvest
async fn handle_fetch(mut config: Config, args: FetchArgs) -> Result<()> {
    if let Some(start) = args.start {
        config.harvest.start = start;
    }
    if args.end.is_some() {
        config.harvest.end = args.end;
    }
    if args.resume.is_some() {
        config.harvest.resume = args.resume;
    }
    if let Some(workers) = args.workers {
        config.harvest.workers = workers;
    }
    if args.warehouse.is_some() {
        config.harvest.warehouse_filter = args.warehouse;
    }
    if let Some(retries) = args.retries {
        config.remote.max_retries = retries;
    }
    if let Some(sink) = args.sink {
        config.output.sink = sink.into();
    }
    if let Some(root) = args.output {
        config.output.root = root;
    }
    if let Some(database) = args.database {
        config.output.database_path = database;
    }
    validate(&config).context("invalid options")?;

    if args.fresh {
        tracing::info!("Starting fresh harvest (ignoring previous progress)");
    } else {
        tracing::info!("Starting harvest (completed units will be skipped)");
    }

    let sink = open_sink(&config).context("failed to open sink")?;
    let ledger = open_ledger(&config, &sink.destination(), args.fresh)
        .context("failed to open progress ledger")?;
    let plan = RunPlan::from_config(&config, ledger.as_ref())?;
    tracing::info!(
        "Harvesting {} periods with {} workers",
        plan.effective_periods().len(),
        config.harvest.workers
    );

    let harvester = Harvester::new(config, sink, ledger)?;
    let summary = match harvester.run(&plan).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Harvest could not start: {}", e);
            return Err(e.into());
        }
    };

    let totals = &summary.totals;
    println!("=== Harvest Complete ===\n");
    println!("  Run id: {}", summary.run_id);
    println!("  Destination: {}", summary.destination);
    println!("  Periods: {}", totals.periods);
    println!("  Warehouses: {} ({} skipped)", totals.warehouses, totals.warehouses_skipped);
    println!("  Unions: {}", totals.unions);
    println!(
        "  Items: {} with data, {} without data, {} skipped, {} failed",
        totals.items_with_data, totals.items_empty, totals.items_skipped, totals.items_failed
    );
    println!("  Records: {}", totals.records);
    println!("  Errors: {}", totals.errors);
    Ok(())
}

/// Handles `convert`: JSON tree to CSV batches
fn handle_convert(
    config: &Config,
    input: Option<PathBuf>,
    output: &Path,
    batch_size: Option<usize>,
) -> Result<()> {
    let input = input.unwrap_or_else(|| PathBuf::from(&config.output.root));
    let batch_size = batch_size.unwrap_or(config.output.batch_size);

    println!("=== Converting {} ===\n", input.display());
    let summary = convert_tree(&input, output, batch_size)?;

    println!("  Files found: {}", summary.files_found);
    println!("  Files converted: {}", summary.files_converted);
    println!("  Files failed: {}", summary.files_failed);
    println!("  Rows: {}", summary.rows);
    println!("  Batches: {}", summary.batches.len());
    if let Some(merged) = summary.merged {
        println!("✓ Merged output: {}", merged.display());
    }
    Ok(())
}

/// Handles `audit`: completeness report of the JSON tree
fn handle_audit(
    config: &Config,
    root: Option<PathBuf>,
    start_year: Option<u32>,
    end_year: Option<u32>,
    output: &Path,
) -> Result<()> {
    let root = root.unwrap_or_else(|| PathBuf::from(&config.output.root));
    let start_year = match start_year {
        Some(year) => year,
        None => config.harvest.start_period()?.year.parse()?,
    };
    let end_year = match end_year {
        Some(year) => year,
        None => config.harvest.end_period()?.year.parse()?,
    };

    let expected: Vec<String> = config.items.iter().map(|i| i.code.clone()).collect();

    let report = audit_tree(&root, start_year, end_year, &expected)?;
    let (text, json) = write_audit_report(&report, output)?;

    println!("Analysis complete. Reports saved to:");
    println!("- {} (human-readable)", text.display());
    println!("- {} (detailed data)", json.display());
    if report.is_complete() {
        println!("✓ No missing months or items");
    }
    Ok(())
}

/// Handles `status`: ledger statistics and resume point
fn handle_status(config: &Config) -> Result<()> {
    let sink = open_sink(config).context("failed to open sink")?;
    let destination = sink.destination();
    let ledger = open_ledger(config, &destination, false).context("failed to open progress ledger")?;
    let run_id = run_id_for(config.output.run_id.as_deref(), &destination);

    let status = load_status(ledger.as_ref(), &run_id, &destination)?;
    print_status(&status);
    Ok(())
}
