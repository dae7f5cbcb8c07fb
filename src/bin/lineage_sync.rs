use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gisaid_lineage_sync::app::App;
use gisaid_lineage_sync::config::{ConfigLoader, SettingsOverrides};
use gisaid_lineage_sync::error::LineageError;
use gisaid_lineage_sync::output::{JsonOutput, LogOutput, OutputMode, print_summary};
use gisaid_lineage_sync::sink::MongoConnector;

#[derive(Parser)]
#[command(name = "lineage-sync")]
#[command(about = "Set pangolinLineage on stored GISAID records from a metadata TSV")]
#[command(version, author)]
#[command(after_help = "Examples:\n  lineage-sync metadata.tsv\n  lineage-sync --dry-run metadata.tsv.gz")]
struct Cli {
    /// Tab-separated GISAID metadata export (optionally gzip-compressed)
    input: Utf8PathBuf,

    /// JSON config file (defaults to ./lineage-sync.json, then the user config dir)
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[arg(long, env = "LINEAGE_SYNC_URI")]
    uri: Option<String>,

    #[arg(long, env = "LINEAGE_SYNC_DATABASE")]
    database: Option<String>,

    #[arg(long, env = "LINEAGE_SYNC_COLLECTION")]
    collection: Option<String>,

    /// Maximum update statements per bulk request
    #[arg(long, env = "LINEAGE_SYNC_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Print the update batch as JSON without connecting
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LineageError>() {
            return ExitCode::from(error.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let overrides = SettingsOverrides {
        uri: cli.uri,
        database: cli.database,
        collection: cli.collection,
        batch_size: cli.batch_size,
    };
    let settings = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let batch_size = settings.batch_size;
    let app = App::new(MongoConnector::new(settings), batch_size);

    if cli.dry_run {
        let plan = app.plan(&cli.input, &LogOutput)?;
        JsonOutput::print_plan(&plan).into_diagnostic()?;
        return Ok(());
    }

    let result = app.sync(&cli.input, &LogOutput)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_result(&result).into_diagnostic()?,
        OutputMode::Human => print_summary(&result),
    }
    result.into_outcome()?;
    Ok(())
}
