mod replay;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use testomatio_core::source::DryRunRewriter;
use testomatio_core::{
    Config, HttpClient, ImportListener, ImportOptions, MockApi, ReportListener, RetryPolicy,
    RobotFileRewriter, SharedApi, SourceRewriter,
};

#[derive(Parser)]
#[command(name = "testomatio")]
#[command(version, about = "Sync tests and report runs to Testomat.io", long_about = None)]
struct Cli {
    /// Path to a testomatio.toml (defaults to ./testomatio.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the tests of a recorded run into the project
    Import {
        /// Recorded lifecycle events (JSON lines)
        events: PathBuf,

        #[command(flatten)]
        options: ImportFlags,

        /// Use an in-memory project and leave source files untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Report the results of a recorded run
    Report {
        /// Recorded lifecycle events (JSON lines)
        events: PathBuf,

        /// Use an in-memory service
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove test identifiers from suite files
    StripIds {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the default configuration
    Config,
}

#[derive(Args)]
struct ImportFlags {
    /// Remove identifiers from source instead of importing
    #[arg(long)]
    remove_ids: bool,

    /// Keep tests that are missing locally attached
    #[arg(long)]
    no_detach: bool,

    /// Delete empty suites after import
    #[arg(long, conflicts_with = "structure")]
    no_empty: bool,

    /// Create tests with the identifiers found in source
    #[arg(long)]
    create: bool,

    /// Mirror the local suite structure in the project
    #[arg(long)]
    structure: bool,
}

impl From<ImportFlags> for ImportOptions {
    fn from(flags: ImportFlags) -> Self {
        ImportOptions {
            remove_ids: flags.remove_ids,
            no_detach: flags.no_detach,
            no_empty: flags.no_empty,
            create: flags.create,
            structure: flags.structure,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Import {
            events,
            options,
            dry_run,
        } => run_import(cli.config.as_deref(), &events, options.into(), dry_run).await,
        Commands::Report { events, dry_run } => {
            run_report(cli.config.as_deref(), &events, dry_run).await
        }
        Commands::StripIds { files } => strip_ids(&files),
        Commands::Config => {
            print!("{}", Config::default_config_string());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// The service client, or an in-memory project under `--dry-run`.
fn service(config: &Config, dry_run: bool) -> Result<SharedApi, Box<dyn std::error::Error>> {
    if dry_run {
        return Ok(Arc::new(MockApi::new()));
    }
    config.validate()?;
    Ok(Arc::new(HttpClient::from_config(&config.api)?))
}

async fn run_import(
    config_path: Option<&Path>,
    events: &Path,
    options: ImportOptions,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let events = replay::read_events(events)?;
    let api = service(&config, dry_run)?;
    let rewriter: Arc<dyn SourceRewriter> = if dry_run {
        Arc::new(DryRunRewriter)
    } else {
        Arc::new(RobotFileRewriter)
    };

    let mut listener = ImportListener::new(api, rewriter, options, &config)?;
    let Some(outcome) = replay::replay_import(&mut listener, &events).await? else {
        println!("Nothing imported.");
        return Ok(());
    };

    println!("Imported: {}", outcome.summary);
    for warning in &outcome.plan.warnings {
        println!("  warning: {}", warning);
    }
    for rewrite in &outcome.rewrites {
        println!(
            "  {}: {} -> {}",
            rewrite.file.display(),
            rewrite.old_name,
            rewrite.new_name
        );
    }
    Ok(())
}

async fn run_report(
    config_path: Option<&Path>,
    events: &Path,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let events = replay::read_events(events)?;
    let api = service(&config, dry_run)?;

    let mut listener = ReportListener::new(api, &config, RetryPolicy::from_config(&config.delivery));
    let Some(report) = replay::replay_report(&mut listener, &events).await else {
        return Err("Reporting did not complete".into());
    };

    match &report.run_id {
        Some(run_id) => println!("Run: {}", run_id),
        None => println!("No results to report."),
    }
    if let Some(url) = &report.public_url {
        println!("  Public report: {}", url);
    }
    println!(
        "  Delivered: {}  Failed: {}",
        report.delivery.delivered_records(),
        report.delivery.failed_records()
    );

    if !report.delivery.is_complete() {
        return Err(format!(
            "{} results could not be delivered",
            report.delivery.failed_records()
        )
        .into());
    }
    Ok(())
}

fn strip_ids(files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let rewriter = RobotFileRewriter::new();
    for file in files {
        let stripped = rewriter.strip_ids(file)?;
        println!("{}: {} identifiers removed", file.display(), stripped);
    }
    Ok(())
}
